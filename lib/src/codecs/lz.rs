//! Terminal codecs that emit frame blobs: raw store and the zstd-backed kernels.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::codec::{CodecShape, DecodeCtx, DecoderDesc, EncodeCtx, EncoderDesc, standard};
use crate::error::{Error, Result};
use crate::stream::{Stream, StreamType, TypeMask};

use super::{StreamHeader, read_stream_headers};

fn terminal_shape(inputs: TypeMask) -> CodecShape {
    CodecShape {
        inputs: vec![inputs],
        last_input_variadic: true,
        singleton_outputs: vec![],
        variable_output: None,
        terminal: true,
    }
}

// Level 0 selects the backend default
fn backend_level(level: i32) -> i32 {
    if level == 0 { 3 } else { level }
}

fn compress_blob(data: &[u8], level: i32) -> Result<Vec<u8>> {
    let mut dst = vec![0u8; zstd_safe::compress_bound(data.len())];
    let n = zstd_safe::compress(&mut dst[..], data, level)
        .map_err(|_| Error::codec_execution("backend compression failed"))?;
    dst.truncate(n);
    Ok(dst)
}

fn decompress_blob(blob: &[u8], content_size: usize) -> Result<Vec<u8>> {
    let mut dst = vec![0u8; content_size];
    let n = zstd_safe::decompress(&mut dst[..], blob)
        .map_err(|_| Error::corruption("backend decompression failed"))?;
    if n != content_size {
        return Err(Error::corruption("decompressed size mismatch"));
    }
    Ok(dst)
}

// Recreates one stream from its header and contents.
fn write_output<'b>(
    ctx: &mut DecodeCtx<'_, 'b>,
    header: &StreamHeader,
    content: &[u8],
) -> Result<()> {
    let capacity = if header.ty == StreamType::String {
        content.len()
    } else {
        header.num_elts
    };
    let out = ctx.create_output(header.ty, header.elt_width, capacity)?;
    out.buf_mut()?[..content.len()].copy_from_slice(content);
    if let Some(lens) = &header.lens {
        out.set_string_lens(lens.clone())?;
    }
    out.commit(header.num_elts)?;
    Ok(())
}

fn store_encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    for input in inputs {
        let mut header = Vec::new();
        StreamHeader::of_stream(input)?.write(&mut header);
        ctx.send_header(&header);
        ctx.emit_blob(input.content()?.to_vec())?;
    }
    Ok(())
}

fn store_decode(ctx: &mut DecodeCtx<'_, '_>, blobs: &[&Stream<'_>]) -> Result<()> {
    let headers = read_stream_headers(ctx.header(), ctx.num_outputs())?;
    for (header, blob) in headers.iter().zip(blobs) {
        let content = blob.content()?;
        if content.len() != header.content_size() {
            return Err(Error::corruption("stored blob size mismatch"));
        }
        write_output(ctx, header, content)?;
    }
    Ok(())
}

fn lz_encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>], level: i32) -> Result<()> {
    for input in inputs {
        let mut header = Vec::new();
        StreamHeader::of_stream(input)?.write(&mut header);
        ctx.send_header(&header);
        ctx.emit_blob(compress_blob(input.content()?, level)?)?;
    }
    Ok(())
}

fn lz_decode(ctx: &mut DecodeCtx<'_, '_>, blobs: &[&Stream<'_>]) -> Result<()> {
    let headers = read_stream_headers(ctx.header(), ctx.num_outputs())?;
    for (header, blob) in headers.iter().zip(blobs) {
        let content = decompress_blob(blob.content()?, header.content_size())?;
        write_output(ctx, header, &content)?;
    }
    Ok(())
}

fn generic_encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let level = backend_level(ctx.compression_level());
    lz_encode(ctx, inputs, level)
}

fn field_lz_encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let level = backend_level(ctx.compression_level());
    lz_encode(ctx, inputs, level)
}

// The entropy stage always spends maximum effort; inputs reaching it are small.
fn entropy_encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    lz_encode(ctx, inputs, 19)
}

pub(super) fn store_encoder() -> EncoderDesc {
    EncoderDesc::new(
        standard::STORE,
        "store",
        terminal_shape(TypeMask::ANY),
        Box::new(store_encode),
    )
}

pub(super) fn store_decoder() -> DecoderDesc {
    DecoderDesc::new(
        standard::STORE,
        "store",
        terminal_shape(TypeMask::ANY),
        Box::new(store_decode),
    )
}

pub(super) fn generic_encoder() -> EncoderDesc {
    EncoderDesc::new(
        standard::GENERIC,
        "generic",
        terminal_shape(TypeMask::ANY),
        Box::new(generic_encode),
    )
}

pub(super) fn generic_decoder() -> DecoderDesc {
    DecoderDesc::new(
        standard::GENERIC,
        "generic",
        terminal_shape(TypeMask::ANY),
        Box::new(lz_decode),
    )
}

pub(super) fn entropy_encoder() -> EncoderDesc {
    EncoderDesc::new(
        standard::ENTROPY,
        "entropy",
        terminal_shape(TypeMask::FIXED_WIDTH),
        Box::new(entropy_encode),
    )
}

pub(super) fn entropy_decoder() -> DecoderDesc {
    DecoderDesc::new(
        standard::ENTROPY,
        "entropy",
        terminal_shape(TypeMask::FIXED_WIDTH),
        Box::new(lz_decode),
    )
}

pub(super) fn field_lz_encoder() -> EncoderDesc {
    EncoderDesc::new(
        standard::FIELD_LZ,
        "field_lz",
        terminal_shape(TypeMask::FIXED_WIDTH),
        Box::new(field_lz_encode),
    )
}

pub(super) fn field_lz_decoder() -> DecoderDesc {
    DecoderDesc::new(
        standard::FIELD_LZ,
        "field_lz",
        terminal_shape(TypeMask::FIXED_WIDTH),
        Box::new(lz_decode),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_cycle() {
        let data = b"a rather repetitive payload, a rather repetitive payload";
        let blob = compress_blob(data, 3).unwrap();
        let back = decompress_blob(&blob, data.len()).unwrap();
        assert_eq!(&back, data);
    }

    #[test]
    fn empty_blob_cycle() {
        let blob = compress_blob(&[], 3).unwrap();
        let back = decompress_blob(&blob, 0).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn wrong_size_is_corruption() {
        let blob = compress_blob(b"abc", 3).unwrap();
        assert!(decompress_blob(&blob, 2).unwrap_err().is_corruption());
    }
}
