//! The standard codec set.
//!
//! Every codec here is a plain encode/decode pair behind the descriptor interface of
//! [`crate::codec`]; the engine never depends on what a kernel computes. Terminal
//! codecs (`store`, `generic`, `constant`, `entropy`, `field_lz`) emit frame blobs,
//! the remaining transforms produce successor streams.

use alloc::vec::Vec;

use crate::codec::{DecoderDesc, EncoderDesc};
use crate::error::{Error, Result};
use crate::frame::{Reader, write_varint};
use crate::stream::{Stream, StreamType};

mod bitpack;
mod constant;
mod delta;
mod lz;
mod prefix;
mod tokenize;
mod transpose;
mod varint;

pub(crate) fn standard_encoders() -> Vec<EncoderDesc> {
    alloc::vec![
        lz::store_encoder(),
        lz::generic_encoder(),
        lz::entropy_encoder(),
        lz::field_lz_encoder(),
        constant::encoder(),
        delta::encoder(),
        bitpack::encoder(),
        transpose::encoder(),
        tokenize::encoder(),
        prefix::encoder(),
        varint::encoder(),
    ]
}

pub(crate) fn standard_decoders() -> Vec<DecoderDesc> {
    alloc::vec![
        lz::store_decoder(),
        lz::generic_decoder(),
        lz::entropy_decoder(),
        lz::field_lz_decoder(),
        constant::decoder(),
        delta::decoder(),
        bitpack::decoder(),
        transpose::decoder(),
        tokenize::decoder(),
        prefix::decoder(),
        varint::decoder(),
    ]
}

// Type, width, element count and string lengths of one stream, as terminal codecs
// record them in their codec header.
pub(crate) struct StreamHeader {
    pub ty: StreamType,
    pub elt_width: usize,
    pub num_elts: usize,
    pub lens: Option<Vec<u32>>,
}

impl StreamHeader {
    pub(crate) fn of_stream(stream: &Stream<'_>) -> Result<Self> {
        let lens = if stream.stream_type() == StreamType::String {
            Some(stream.string_lens()?.to_vec())
        } else {
            None
        };
        Ok(Self {
            ty: stream.stream_type(),
            elt_width: stream.elt_width(),
            num_elts: stream.num_elts()?,
            lens,
        })
    }

    pub(crate) fn content_size(&self) -> usize {
        match &self.lens {
            Some(lens) => lens.iter().map(|l| *l as usize).sum(),
            None => self.num_elts * self.elt_width,
        }
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.push(self.ty.tag());
        write_varint(out, self.elt_width as u64);
        write_varint(out, self.num_elts as u64);
        if let Some(lens) = &self.lens {
            for len in lens {
                write_varint(out, u64::from(*len));
            }
        }
    }

    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let ty = StreamType::from_tag(reader.u8()?)?;
        let elt_width = usize::try_from(reader.varint()?)?;
        let num_elts = usize::try_from(reader.varint()?)?;
        if !valid_width(ty, elt_width) {
            return Err(Error::corruption("invalid element width in codec header"));
        }
        let lens = if ty == StreamType::String {
            // One length byte minimum per element
            if num_elts > reader.remaining() {
                return Err(Error::corruption("length array exceeds header size"));
            }
            let mut lens = Vec::with_capacity(num_elts);
            for _ in 0..num_elts {
                lens.push(
                    u32::try_from(reader.varint()?)
                        .map_err(|_| Error::corruption("string length out of range"))?,
                );
            }
            Some(lens)
        } else {
            None
        };
        Ok(Self {
            ty,
            elt_width,
            num_elts,
            lens,
        })
    }
}

// Whether `elt_width` is in the domain of `ty`.
pub(crate) fn valid_width(ty: StreamType, elt_width: usize) -> bool {
    match ty {
        StreamType::Serial | StreamType::String => elt_width == 1,
        StreamType::Struct => elt_width > 0,
        StreamType::Numeric => matches!(elt_width, 1 | 2 | 4 | 8),
    }
}

// Reads the headers of a terminal invocation that consumed `count` inputs.
pub(crate) fn read_stream_headers(header: &[u8], count: usize) -> Result<Vec<StreamHeader>> {
    let mut reader = Reader::new(header);
    let mut headers = Vec::with_capacity(count);
    for _ in 0..count {
        headers.push(StreamHeader::read(&mut reader)?);
    }
    if reader.remaining() != 0 {
        return Err(Error::corruption("trailing bytes in codec header"));
    }
    Ok(headers)
}

// Writes `values` as little-endian integers of `width` bytes.
pub(crate) fn write_values(dst: &mut [u8], width: usize, values: &[u64]) {
    for (chunk, value) in dst.chunks_exact_mut(width).zip(values) {
        chunk.copy_from_slice(&value.to_le_bytes()[..width]);
    }
}
