use alloc::vec::Vec;

use crate::codec::{CUSTOM_CODEC_ID_BASE, CodecId, DecodeCtx, DecoderDesc, DecoderRegistry};
use crate::codecs;
use crate::error::{Error, Result};
use crate::frame::{self, FrameParts, parse_frame};
use crate::stream::{Stream, StreamType};

/// A decompression context.
///
/// Holds the decoder registry. The standard decoders are preregistered; custom
/// decoders are added with [`Self::register_decoder`] under the codec id their
/// encoder was registered with.
///
/// A frame is self-describing: decompression replays the graph trace recorded in the
/// frame and needs no access to the compressor that produced it.
///
/// # Examples
///
/// ```
/// use zlgraph::{CCtx, Compressor, DCtx, StandardGraph, Stream};
///
/// let mut compressor = Compressor::new();
/// let store = compressor.standard_graph(StandardGraph::Store);
/// compressor.set_start(store);
/// let frame = CCtx::new().compress(&compressor, &[Stream::ref_serial(b"data")])?;
///
/// // Library-allocated outputs
/// let outputs = DCtx::new().decompress(&frame)?;
/// assert_eq!(outputs[0].content()?, b"data");
///
/// // Caller-allocated outputs
/// let mut buf = [0u8; 4];
/// let outputs = DCtx::new().decompress_into(&frame, vec![&mut buf[..]])?;
/// assert_eq!(outputs[0].num_elts()?, 4);
/// assert_eq!(&buf, b"data");
/// # Ok::<(), zlgraph::Error>(())
/// ```
pub struct DCtx {
    decoders: DecoderRegistry,
    decompression_level: i32,
}

impl Default for DCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl DCtx {
    /// Creates a decompression context with the standard decoders preregistered.
    pub fn new() -> Self {
        let mut decoders = DecoderRegistry::default();
        for desc in codecs::standard_decoders() {
            decoders.register(desc).expect("standard codec ids are unique");
        }
        Self {
            decoders,
            decompression_level: 0,
        }
    }

    /// Registers a custom decoder.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if the id is below [`CUSTOM_CODEC_ID_BASE`] or
    /// collides with a decoder of a different shape.
    pub fn register_decoder(&mut self, desc: DecoderDesc) -> Result<()> {
        if desc.id().0 < CUSTOM_CODEC_ID_BASE {
            return Err(Error::logic("custom codec ids start at CUSTOM_CODEC_ID_BASE"));
        }
        self.decoders.register(desc)
    }

    /// Sets the decompression effort hint forwarded to decoders.
    pub fn set_decompression_level(&mut self, level: i32) {
        self.decompression_level = level;
    }

    /// Decompresses a frame into library-allocated output streams.
    ///
    /// # Errors
    ///
    /// Fails with `corruption` on structural or checksum errors, `unknown_codec` if
    /// the frame references an unregistered codec, and `unsupported_version` for
    /// frames outside the supported version range.
    pub fn decompress(&self, frame: &[u8]) -> Result<Vec<Stream<'static>>> {
        let parts = parse_frame(frame)?;
        let num_roots = parts.inputs.len();
        self.replay(&parts, vec_of_none(num_roots))
    }

    /// Decompresses a frame directly into caller-provided buffers, one per output.
    ///
    /// Buffer `i` receives the contents of output `i` and must be at least its
    /// content size (see [`crate::FrameInfo`]). The returned streams wrap the buffers
    /// and carry element counts and, for string outputs, the length arrays.
    ///
    /// On failure the buffers may have been partially written and must be treated as
    /// invalidated.
    ///
    /// # Errors
    ///
    /// As [`Self::decompress`]; additionally fails with a logic error if the buffer
    /// count does not match the frame, or with an allocation error if a buffer is too
    /// small.
    pub fn decompress_into<'b>(
        &self,
        frame: &[u8],
        dsts: Vec<&'b mut [u8]>,
    ) -> Result<Vec<Stream<'b>>> {
        let parts = parse_frame(frame)?;
        if dsts.len() != parts.inputs.len() {
            return Err(Error::logic("one destination buffer per output is required"));
        }

        let mut roots = Vec::with_capacity(dsts.len());
        for (desc, dst) in parts.inputs.iter().zip(dsts) {
            let width = usize::try_from(desc.elt_width)?;
            let size = usize::try_from(desc.content_size)?;
            if dst.len() < size {
                return Err(Error::allocation());
            }
            roots.push(Some(Stream::ref_write(desc.ty, width, dst)?));
        }

        self.replay(&parts, roots)
    }

    // Replays the trace in reverse recorded order. Terminal invocations materialize
    // their consumed streams from blobs; every other invocation hands its regenerated
    // output streams to the decoder, which rebuilds the streams the encoder consumed.
    fn replay<'b>(
        &self,
        parts: &FrameParts<'_>,
        mut roots: Vec<Option<Stream<'b>>>,
    ) -> Result<Vec<Stream<'b>>> {
        let num_roots = roots.len();
        let num_streams = num_roots + parts.trace.iter().map(|inv| inv.outputs.len()).sum::<usize>();

        // Blob ranges per invocation, in recorded order
        let mut blob_ranges = Vec::with_capacity(parts.trace.len());
        let mut next_blob = 0usize;
        for inv in &parts.trace {
            let desc = self.decoders.get(CodecId(inv.codec))?;
            for id in inv.inputs.iter().chain(&inv.outputs) {
                if *id as usize >= num_streams {
                    return Err(Error::corruption("stream id out of range"));
                }
            }
            if desc.shape().terminal {
                if !inv.outputs.is_empty() {
                    return Err(Error::corruption("terminal invocation with outputs"));
                }
                blob_ranges.push(next_blob..next_blob + inv.inputs.len());
                next_blob += inv.inputs.len();
            } else {
                blob_ranges.push(next_blob..next_blob);
            }
        }
        if next_blob != parts.blobs.len() {
            return Err(Error::corruption("blob count does not match trace"));
        }

        let mut table: Vec<Option<Stream<'b>>> = vec_of_none(num_streams);

        for (idx, inv) in parts.trace.iter().enumerate().rev() {
            let desc = self.decoders.get(CodecId(inv.codec))?;
            let header = parts.headers[idx];

            let input_streams: Vec<Stream<'b>> = if desc.shape().terminal {
                parts.blobs[blob_ranges[idx].clone()]
                    .iter()
                    .map(|blob| {
                        Stream::owned_committed(StreamType::Serial, 1, blob.len(), blob.to_vec())
                    })
                    .collect()
            } else {
                let mut streams = Vec::with_capacity(inv.outputs.len());
                for id in &inv.outputs {
                    streams.push(
                        table[*id as usize]
                            .take()
                            .ok_or_else(|| Error::corruption("trace is not well ordered"))?,
                    );
                }
                streams
            };

            // Root streams may deliver directly into caller buffers
            let mut overrides = Vec::with_capacity(inv.inputs.len());
            for id in &inv.inputs {
                let slot = *id as usize;
                overrides.push(if slot < num_roots { roots[slot].take() } else { None });
            }

            let outputs = {
                let refs: Vec<&Stream<'b>> = input_streams.iter().collect();
                let mut ctx = DecodeCtx::new(
                    header,
                    inv.inputs.len(),
                    self.decompression_level,
                    overrides,
                );
                desc.run(&mut ctx, &refs)?;
                ctx.finish()?
            };

            for (id, output) in inv.inputs.iter().zip(outputs) {
                let slot = *id as usize;
                if table[slot].is_some() {
                    return Err(Error::corruption("stream regenerated twice"));
                }
                table[slot] = Some(output);
            }
        }

        let mut outputs = Vec::with_capacity(num_roots);
        for (slot, desc) in parts.inputs.iter().enumerate() {
            let stream = table[slot]
                .take()
                .ok_or_else(|| Error::corruption("missing root output"))?;
            let matches = stream.stream_type() == desc.ty
                && stream.elt_width() as u64 == desc.elt_width
                && stream.num_elts()? as u64 == desc.num_elts
                && stream.content_size()? as u64 == desc.content_size;
            if !matches {
                return Err(Error::corruption("output does not match frame descriptor"));
            }
            outputs.push(stream);
        }
        if table.iter().any(Option::is_some) {
            return Err(Error::corruption("trace contains unconsumed streams"));
        }

        if let Some(expected) = parts.content_checksum {
            let refs: Vec<&Stream<'b>> = outputs.iter().collect();
            if frame::content_checksum(&refs)? != expected {
                return Err(Error::corruption("content checksum mismatch"));
            }
        }

        Ok(outputs)
    }
}

impl core::fmt::Debug for DCtx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DCtx")
            .field("decompression_level", &self.decompression_level)
            .finish_non_exhaustive()
    }
}

fn vec_of_none<T>(len: usize) -> Vec<Option<T>> {
    let mut v = Vec::with_capacity(len);
    v.resize_with(len, || None);
    v
}
