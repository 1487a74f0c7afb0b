//! Splits a string stream into its concatenated contents and a numeric stream of
//! per-element lengths.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::codec::{CodecShape, DecodeCtx, DecoderDesc, EncodeCtx, EncoderDesc, standard};
use crate::error::{Error, Result};
use crate::stream::{Stream, StreamType, TypeMask};

use super::write_values;

fn shape() -> CodecShape {
    CodecShape {
        inputs: vec![TypeMask::STRING],
        last_input_variadic: false,
        singleton_outputs: vec![TypeMask::SERIAL, TypeMask::NUMERIC],
        variable_output: None,
        terminal: false,
    }
}

fn encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let input = inputs[0];
    let content = input.content()?;
    let lens: Vec<u64> = input.string_lens()?.iter().map(|l| u64::from(*l)).collect();

    let out = ctx.create_output(StreamType::Serial, 1, content.len())?;
    out.buf_mut()?[..content.len()].copy_from_slice(content);
    out.commit(content.len())?;

    let out = ctx.create_output(StreamType::Numeric, 4, lens.len())?;
    write_values(out.buf_mut()?, 4, &lens);
    let num_lens = lens.len();
    out.commit(num_lens)?;
    Ok(())
}

fn decode(ctx: &mut DecodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let content = inputs[0].content()?;
    let lens: Vec<u32> = inputs[1]
        .numeric_values()?
        .iter()
        .map(|l| u32::try_from(*l).map_err(|_| Error::corruption("string length out of range")))
        .collect::<Result<_>>()?;

    let total: u64 = lens.iter().map(|l| u64::from(*l)).sum();
    if total != content.len() as u64 {
        return Err(Error::corruption("string lengths do not sum to content size"));
    }

    let num_elts = lens.len();
    let out = ctx.create_output(StreamType::String, 1, content.len())?;
    out.buf_mut()?[..content.len()].copy_from_slice(content);
    out.set_string_lens(lens)?;
    out.commit(num_elts)?;
    Ok(())
}

pub(super) fn encoder() -> EncoderDesc {
    EncoderDesc::new(standard::PREFIX, "prefix", shape(), Box::new(encode))
}

pub(super) fn decoder() -> DecoderDesc {
    DecoderDesc::new(standard::PREFIX, "prefix", shape(), Box::new(decode))
}
