//! Terminal codec for streams whose elements are all identical.
//!
//! The single element and the count travel in the codec header; the frame blob is
//! empty, so a constant input of any size compresses to a few header bytes.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::codec::{CodecShape, DecodeCtx, DecoderDesc, EncodeCtx, EncoderDesc, standard};
use crate::error::{Error, Result};
use crate::frame::{Reader, write_varint};
use crate::stream::{Stream, StreamType, TypeMask};

fn shape() -> CodecShape {
    CodecShape {
        inputs: vec![TypeMask::FIXED_WIDTH],
        last_input_variadic: true,
        singleton_outputs: vec![],
        variable_output: None,
        terminal: true,
    }
}

fn encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    for input in inputs {
        let width = input.elt_width();
        let content = input.content()?;
        let num_elts = input.num_elts()?;

        let mut header = Vec::new();
        header.push(input.stream_type().tag());
        write_varint(&mut header, width as u64);
        write_varint(&mut header, num_elts as u64);

        if num_elts > 0 {
            let first = &content[..width];
            if content.chunks_exact(width).any(|elt| elt != first) {
                return Err(Error::codec_execution("input is not constant"));
            }
            header.extend_from_slice(first);
        }

        ctx.send_header(&header);
        ctx.emit_blob(Vec::new())?;
    }
    Ok(())
}

fn decode(ctx: &mut DecodeCtx<'_, '_>, blobs: &[&Stream<'_>]) -> Result<()> {
    let mut reader = Reader::new(ctx.header());
    for blob in blobs {
        if blob.content_size()? != 0 {
            return Err(Error::corruption("constant blob is not empty"));
        }

        let ty = StreamType::from_tag(reader.u8()?)?;
        let width = usize::try_from(reader.varint()?)?;
        let num_elts = usize::try_from(reader.varint()?)?;
        if ty == StreamType::String || !super::valid_width(ty, width) {
            return Err(Error::corruption("invalid constant header"));
        }
        let elt: Vec<u8> = if num_elts > 0 {
            reader.bytes(width)?.to_vec()
        } else {
            Vec::new()
        };

        let out = ctx.create_output(ty, width, num_elts)?;
        if num_elts > 0 {
            for chunk in out.buf_mut()?[..num_elts * width].chunks_exact_mut(width) {
                chunk.copy_from_slice(&elt);
            }
        }
        out.commit(num_elts)?;
    }
    if reader.remaining() != 0 {
        return Err(Error::corruption("trailing bytes in codec header"));
    }
    Ok(())
}

pub(super) fn encoder() -> EncoderDesc {
    EncoderDesc::new(standard::CONSTANT, "constant", shape(), Box::new(encode))
}

pub(super) fn decoder() -> DecoderDesc {
    DecoderDesc::new(standard::CONSTANT, "constant", shape(), Box::new(decode))
}
