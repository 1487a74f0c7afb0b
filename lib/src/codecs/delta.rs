//! Forward delta over numeric streams. Width-preserving, metadata-preserving.

use alloc::boxed::Box;
use alloc::vec;

use crate::codec::{CodecShape, DecodeCtx, DecoderDesc, EncodeCtx, EncoderDesc, standard};
use crate::error::Result;
use crate::stream::{Stream, StreamType, TypeMask};

use super::write_values;

fn shape() -> CodecShape {
    CodecShape {
        inputs: vec![TypeMask::NUMERIC],
        last_input_variadic: false,
        singleton_outputs: vec![TypeMask::NUMERIC],
        variable_output: None,
        terminal: false,
    }
}

fn encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let input = inputs[0];
    let width = input.elt_width();
    let values = input.numeric_values()?;

    let mut deltas = values.clone();
    for i in (1..deltas.len()).rev() {
        deltas[i] = deltas[i].wrapping_sub(deltas[i - 1]);
    }

    let out = ctx.create_output(StreamType::Numeric, width, deltas.len())?;
    write_values(out.buf_mut()?, width, &deltas);
    out.copy_metadata_from(input);
    out.commit(deltas.len())?;
    Ok(())
}

fn decode(ctx: &mut DecodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let deltas = inputs[0];
    let width = deltas.elt_width();
    let mut values = deltas.numeric_values()?;

    let mask = width_mask(width);
    for i in 1..values.len() {
        values[i] = values[i].wrapping_add(values[i - 1]) & mask;
    }

    let out = ctx.create_output(StreamType::Numeric, width, values.len())?;
    write_values(out.buf_mut()?, width, &values);
    out.commit(values.len())?;
    Ok(())
}

fn width_mask(width: usize) -> u64 {
    if width == 8 {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    }
}

pub(super) fn encoder() -> EncoderDesc {
    EncoderDesc::new(standard::DELTA, "delta", shape(), Box::new(encode))
}

pub(super) fn decoder() -> DecoderDesc {
    DecoderDesc::new(standard::DELTA, "delta", shape(), Box::new(decode))
}
