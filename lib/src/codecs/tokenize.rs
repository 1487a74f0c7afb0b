//! Splits a fixed-width stream into its alphabet (unique elements in first-appearance
//! order) and a stream of 32 bit indices into that alphabet.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use crate::codec::{CodecShape, DecodeCtx, DecoderDesc, EncodeCtx, EncoderDesc, standard};
use crate::error::{Error, Result};
use crate::stream::{Stream, StreamType, TypeMask};

use super::write_values;

fn shape() -> CodecShape {
    CodecShape {
        inputs: vec![TypeMask::NUMERIC | TypeMask::STRUCT],
        last_input_variadic: false,
        singleton_outputs: vec![TypeMask::NUMERIC | TypeMask::STRUCT, TypeMask::NUMERIC],
        variable_output: None,
        terminal: false,
    }
}

fn encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let input = inputs[0];
    let width = input.elt_width();
    let num_elts = input.num_elts()?;
    let content = input.content()?;

    let mut first_seen: BTreeMap<&[u8], u32> = BTreeMap::new();
    let mut alphabet: Vec<&[u8]> = Vec::new();
    let mut indices: Vec<u64> = Vec::with_capacity(num_elts);
    for elt in content.chunks_exact(width) {
        let next = alphabet.len() as u32;
        let index = *first_seen.entry(elt).or_insert_with(|| {
            alphabet.push(elt);
            next
        });
        indices.push(u64::from(index));
    }

    let out = ctx.create_output(input.stream_type(), width, alphabet.len())?;
    {
        let buf = out.buf_mut()?;
        for (i, elt) in alphabet.iter().enumerate() {
            buf[i * width..(i + 1) * width].copy_from_slice(elt);
        }
    }
    let alphabet_len = alphabet.len();
    out.commit(alphabet_len)?;

    let out = ctx.create_output(StreamType::Numeric, 4, num_elts)?;
    write_values(out.buf_mut()?, 4, &indices);
    out.commit(num_elts)?;
    Ok(())
}

fn decode(ctx: &mut DecodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
    let alphabet = inputs[0];
    let indices = inputs[1];
    let width = alphabet.elt_width();
    let alphabet_bytes = alphabet.content()?;
    let num_tokens = alphabet.num_elts()?;
    let index_values = indices.numeric_values()?;

    let out = ctx.create_output(alphabet.stream_type(), width, index_values.len())?;
    {
        let buf = out.buf_mut()?;
        for (i, index) in index_values.iter().enumerate() {
            let index = usize::try_from(*index)
                .ok()
                .filter(|idx| *idx < num_tokens)
                .ok_or_else(|| Error::corruption("token index out of range"))?;
            buf[i * width..(i + 1) * width]
                .copy_from_slice(&alphabet_bytes[index * width..(index + 1) * width]);
        }
    }
    let num_elts = index_values.len();
    out.commit(num_elts)?;
    Ok(())
}

pub(super) fn encoder() -> EncoderDesc {
    EncoderDesc::new(standard::TOKENIZE, "tokenize", shape(), Box::new(encode))
}

pub(super) fn decoder() -> DecoderDesc {
    DecoderDesc::new(standard::TOKENIZE, "tokenize", shape(), Box::new(decode))
}
