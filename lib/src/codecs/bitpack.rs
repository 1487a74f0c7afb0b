//! Packs numeric streams to the minimal bit width of their largest value.

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

fn packed_size(num_values: usize, nbits: u32) -> usize {
    (num_values * nbits as usize).div_ceil(8)
}

fn pack(values: &[u64], nbits: u32, dst: &mut [u8]) {
    let mut acc: u128 = 0;
    let mut filled: u32 = 0;
    let mut pos = 0;
    for value in values {
        acc |= u128::from(*value) << filled;
        filled += nbits;
        while filled >= 8 {
            dst[pos] = acc as u8;
            acc >>= 8;
            filled -= 8;
            pos += 1;
        }
    }
    if filled > 0 {
        dst[pos] = acc as u8;
    }
}

fn unpack(src: &[u8], nbits: u32, num_values: usize) -> Vec<u64> {
    let mask = if nbits == 64 {
        u64::MAX
    } else {
        (1u64 << nbits) - 1
    };
    let mut values = Vec::with_capacity(num_values);
    let mut acc: u128 = 0;
    let mut filled: u32 = 0;
    let mut pos = 0;
    for _ in 0..num_values {
        while filled < nbits {
            acc |= u128::from(src[pos]) << filled;
            filled += 8;
            pos += 1;
        }
        values.push(acc as u64 & mask);
        acc >>= nbits;
        filled -= nbits;
    }
    values
}

fn encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let input = inputs[0];
    let width = input.elt_width();
    let values = input.numeric_values()?;
    let max = values.iter().copied().max().unwrap_or(0);
    let nbits = 64 - max.leading_zeros();

    let mut header = Vec::new();
    header.push(width as u8);
    header.push(nbits as u8);
    write_varint(&mut header, values.len() as u64);
    ctx.send_header(&header);

    let size = packed_size(values.len(), nbits);
    let out = ctx.create_output(StreamType::Serial, 1, size)?;
    if nbits > 0 {
        pack(&values, nbits, out.buf_mut()?);
    }
    out.commit(size)?;
    Ok(())
}

fn decode(ctx: &mut DecodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let mut reader = Reader::new(ctx.header());
    let width = usize::from(reader.u8()?);
    let nbits = u32::from(reader.u8()?);
    let num_values = usize::try_from(reader.varint()?)?;
    if reader.remaining() != 0 {
        return Err(Error::corruption("trailing bytes in codec header"));
    }
    if !matches!(width, 1 | 2 | 4 | 8) || nbits > width as u32 * 8 {
        return Err(Error::corruption("invalid bitpack header"));
    }

    let packed = inputs[0].content()?;
    if packed.len() != packed_size(num_values, nbits) {
        return Err(Error::corruption("packed size mismatch"));
    }

    let values = if nbits == 0 {
        vec![0u64; num_values]
    } else {
        unpack(packed, nbits, num_values)
    };

    let out = ctx.create_output(StreamType::Numeric, width, num_values)?;
    write_values(out.buf_mut()?, width, &values);
    out.commit(num_values)?;
    Ok(())
}

pub(super) fn encoder() -> EncoderDesc {
    EncoderDesc::new(standard::BITPACK, "bitpack", shape(), Box::new(encode))
}

pub(super) fn decoder() -> DecoderDesc {
    DecoderDesc::new(standard::BITPACK, "bitpack", shape(), Box::new(decode))
}
