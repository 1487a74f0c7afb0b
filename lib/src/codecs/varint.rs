//! LEB128 encoding of numeric streams into a serial stream.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::codec::{CodecShape, DecodeCtx, DecoderDesc, EncodeCtx, EncoderDesc, standard};
use crate::error::{Error, Result};
use crate::frame::{Reader, write_varint};
use crate::stream::{Stream, StreamType, TypeMask};

use super::write_values;

fn shape() -> CodecShape {
    CodecShape {
        inputs: vec![TypeMask::NUMERIC],
        last_input_variadic: false,
        singleton_outputs: vec![TypeMask::SERIAL],
        variable_output: None,
        terminal: false,
    }
}

fn encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let input = inputs[0];
    let width = input.elt_width();
    let values = input.numeric_values()?;

    let mut header = Vec::new();
    header.push(width as u8);
    write_varint(&mut header, values.len() as u64);
    ctx.send_header(&header);

    // Worst case are ceil(8 * width / 7) bytes per value
    let mut encoded = Vec::with_capacity(values.len() * (width * 8).div_ceil(7));
    for value in &values {
        write_varint(&mut encoded, *value);
    }

    let len = encoded.len();
    let out = ctx.create_output(StreamType::Serial, 1, len)?;
    out.buf_mut()?[..len].copy_from_slice(&encoded);
    out.commit(len)?;
    Ok(())
}

fn decode(ctx: &mut DecodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let mut reader = Reader::new(ctx.header());
    let width = usize::from(reader.u8()?);
    let num_values = usize::try_from(reader.varint()?)?;
    if reader.remaining() != 0 {
        return Err(Error::corruption("trailing bytes in codec header"));
    }
    if !matches!(width, 1 | 2 | 4 | 8) {
        return Err(Error::corruption("invalid varint header"));
    }

    let mut encoded = Reader::new(inputs[0].content()?);
    let limit = if width == 8 {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    };
    let mut values = Vec::with_capacity(num_values);
    for _ in 0..num_values {
        let value = encoded.varint()?;
        if value > limit {
            return Err(Error::corruption("varint value exceeds element width"));
        }
        values.push(value);
    }
    if encoded.remaining() != 0 {
        return Err(Error::corruption("trailing bytes in varint stream"));
    }

    let out = ctx.create_output(StreamType::Numeric, width, num_values)?;
    write_values(out.buf_mut()?, width, &values);
    out.commit(num_values)?;
    Ok(())
}

pub(super) fn encoder() -> EncoderDesc {
    EncoderDesc::new(standard::VARINT, "varint", shape(), Box::new(encode))
}

pub(super) fn decoder() -> DecoderDesc {
    DecoderDesc::new(standard::VARINT, "varint", shape(), Box::new(decode))
}
