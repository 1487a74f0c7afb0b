//! Splits a fixed-width stream into one serial byte plane per byte of the element
//! width. Plane k holds byte k of every element.

use alloc::boxed::Box;
use alloc::vec;

use crate::codec::{CodecShape, DecodeCtx, DecoderDesc, EncodeCtx, EncoderDesc, standard};
use crate::error::{Error, Result};
use crate::stream::{Stream, StreamType, TypeMask};

fn shape() -> CodecShape {
    CodecShape {
        inputs: vec![TypeMask::NUMERIC | TypeMask::STRUCT],
        last_input_variadic: false,
        singleton_outputs: vec![],
        variable_output: Some(TypeMask::SERIAL),
        terminal: false,
    }
}

fn encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let input = inputs[0];
    let width = input.elt_width();
    let num_elts = input.num_elts()?;
    let content = input.content()?;

    // The decoder learns the plane count from its input arity; only the original
    // type tag needs to travel in the header.
    ctx.send_header(&[input.stream_type().tag()]);

    for k in 0..width {
        let out = ctx.create_output(StreamType::Serial, 1, num_elts)?;
        {
            let buf = out.buf_mut()?;
            for (i, elt) in content.chunks_exact(width).enumerate() {
                buf[i] = elt[k];
            }
        }
        out.commit(num_elts)?;
    }
    Ok(())
}

fn decode(ctx: &mut DecodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let header = ctx.header();
    if header.len() != 1 {
        return Err(Error::corruption("invalid transpose header"));
    }
    let ty = StreamType::from_tag(header[0])?;
    let width = inputs.len();
    if !super::valid_width(ty, width) || ty == StreamType::String || ty == StreamType::Serial {
        return Err(Error::corruption("invalid transpose plane count"));
    }

    let num_elts = inputs[0].num_elts()?;
    for plane in inputs {
        if plane.num_elts()? != num_elts {
            return Err(Error::corruption("transpose planes differ in length"));
        }
    }

    let out = ctx.create_output(ty, width, num_elts)?;
    {
        let buf = out.buf_mut()?;
        for (k, plane) in inputs.iter().enumerate() {
            for (i, byte) in plane.content()?.iter().enumerate() {
                buf[i * width + k] = *byte;
            }
        }
    }
    out.commit(num_elts)?;
    Ok(())
}

pub(super) fn encoder() -> EncoderDesc {
    EncoderDesc::new(
        standard::TRANSPOSE_SPLIT,
        "transpose_split",
        shape(),
        Box::new(encode),
    )
}

pub(super) fn decoder() -> DecoderDesc {
    DecoderDesc::new(
        standard::TRANSPOSE_SPLIT,
        "transpose_split",
        shape(),
        Box::new(decode),
    )
}
