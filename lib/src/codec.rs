use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::params::{CParams, LocalParams};
use crate::stream::{Stream, StreamType, TypeMask};

/// The stable identifier of one encoder/decoder pair.
///
/// Codec ids are wire-format identity: the compressor records them in the frame and
/// the decompressor resolves them in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CodecId(pub u32);

/// Custom codec ids must be at least this value. Smaller ids are reserved for the
/// standard codec set.
pub const CUSTOM_CODEC_ID_BASE: u32 = 0x8000;

pub(crate) mod standard {
    use super::CodecId;

    pub const STORE: CodecId = CodecId(1);
    pub const GENERIC: CodecId = CodecId(2);
    pub const CONSTANT: CodecId = CodecId(3);
    pub const ENTROPY: CodecId = CodecId(4);
    pub const FIELD_LZ: CodecId = CodecId(5);
    pub const DELTA: CodecId = CodecId(6);
    pub const BITPACK: CodecId = CodecId(7);
    pub const TRANSPOSE_SPLIT: CodecId = CodecId(8);
    pub const TOKENIZE: CodecId = CodecId(9);
    pub const PREFIX: CodecId = CodecId(10);
    pub const VARINT: CodecId = CodecId(11);
}

/// The input/output contract of a codec.
///
/// A codec consumes `inputs.len()` streams (the last input mask matching one or more
/// trailing streams when `last_input_variadic` is set) and produces its singleton
/// outputs in declaration order, followed by any number of variable outputs of the
/// declared variable type. Output masks with more than one member express contracts
/// like "same type as the input". Terminal codecs produce no streams; they emit one
/// frame blob per input instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecShape {
    pub inputs: Vec<TypeMask>,
    pub last_input_variadic: bool,
    pub singleton_outputs: Vec<TypeMask>,
    pub variable_output: Option<TypeMask>,
    pub terminal: bool,
}

impl CodecShape {
    // Whether `count` input streams satisfy the declared arity. A variadic last input
    // matches one or more trailing streams.
    pub(crate) fn accepts_input_count(&self, count: usize) -> bool {
        if self.last_input_variadic {
            count >= self.inputs.len()
        } else {
            count == self.inputs.len()
        }
    }

    // The mask input slot `idx` must satisfy.
    pub(crate) fn input_mask(&self, idx: usize) -> TypeMask {
        let last = self.inputs.len() - 1;
        self.inputs[idx.min(last)]
    }
}

/// The environment passed to an encoder.
///
/// Encoders create their typed outputs here, emit an optional codec header for their
/// decoder, and read node-local and global parameters.
pub struct EncodeCtx<'e, 'a> {
    shape: &'e CodecShape,
    local: LocalParams,
    params: &'e CParams,
    outputs: Vec<Stream<'a>>,
    header: Vec<u8>,
    blobs: Vec<Vec<u8>>,
}

impl<'e, 'a> EncodeCtx<'e, 'a> {
    pub(crate) fn new(shape: &'e CodecShape, local: LocalParams, params: &'e CParams) -> Self {
        Self {
            shape,
            local,
            params,
            outputs: Vec::new(),
            header: Vec::new(),
            blobs: Vec::new(),
        }
    }

    /// Creates the next output stream, reserved with the given capacity.
    ///
    /// Outputs are created in declaration order: all singleton outputs first, then any
    /// variable outputs. The stream must be committed before the encoder returns.
    ///
    /// # Errors
    ///
    /// Fails with a codec execution failure if the codec exceeds its declared output
    /// arity or types, or with an allocation error if memory is exhausted.
    #[allow(clippy::missing_panics_doc)]
    pub fn create_output(
        &mut self,
        ty: StreamType,
        elt_width: usize,
        capacity_elts: usize,
    ) -> Result<&mut Stream<'a>> {
        if self.shape.terminal {
            return Err(Error::codec_execution("terminal codec creates no streams"));
        }

        let slot = self.outputs.len();
        let declared = if slot < self.shape.singleton_outputs.len() {
            self.shape.singleton_outputs[slot]
        } else {
            self.shape
                .variable_output
                .ok_or_else(|| Error::codec_execution("codec exceeded its output arity"))?
        };
        if !declared.contains(ty) {
            return Err(Error::codec_execution("output type violates codec contract"));
        }

        self.outputs.push(Stream::reserve(ty, elt_width, capacity_elts)?);
        Ok(self.outputs.last_mut().expect("output was just pushed"))
    }

    /// Appends bytes to this invocation's codec header.
    ///
    /// The header travels out of band in the frame and is handed back to the decoder.
    pub fn send_header(&mut self, bytes: &[u8]) {
        self.header.extend_from_slice(bytes);
    }

    /// Emits one terminal blob into the frame.
    ///
    /// Terminal codecs emit exactly one blob per input, in input order.
    ///
    /// # Errors
    ///
    /// Fails with a codec execution failure on non-terminal codecs.
    pub fn emit_blob(&mut self, blob: Vec<u8>) -> Result<()> {
        if !self.shape.terminal {
            return Err(Error::codec_execution("only terminal codecs emit blobs"));
        }
        self.blobs.push(blob);
        Ok(())
    }

    /// The node-local parameters of this invocation.
    pub fn local_params(&self) -> &LocalParams {
        &self.local
    }

    /// The global compression level.
    pub fn compression_level(&self) -> i32 {
        self.params.compression_level
    }

    /// The format version this frame is compressed at.
    pub fn format_version(&self) -> u32 {
        self.params.format_version
    }

    pub(crate) fn finish(
        self,
        num_inputs: usize,
    ) -> Result<(Vec<Stream<'a>>, Vec<u8>, Vec<Vec<u8>>)> {
        if self.shape.terminal {
            if self.blobs.len() != num_inputs {
                return Err(Error::codec_execution("terminal codec must emit one blob per input"));
            }
        } else {
            if self.outputs.len() < self.shape.singleton_outputs.len() {
                return Err(Error::codec_execution("codec produced too few outputs"));
            }
            for output in &self.outputs {
                if !output.is_committed() {
                    return Err(Error::codec_execution("codec left an output uncommitted"));
                }
            }
        }
        Ok((self.outputs, self.header, self.blobs))
    }
}

/// The environment passed to a decoder.
///
/// A decoder regenerates the streams its encoder consumed, one output per original
/// input, in input order.
pub struct DecodeCtx<'e, 'b> {
    header: &'e [u8],
    num_regens: usize,
    decompression_level: i32,
    outputs: Vec<Stream<'b>>,
    overrides: Vec<Option<Stream<'b>>>,
}

impl<'e, 'b> DecodeCtx<'e, 'b> {
    pub(crate) fn new(
        header: &'e [u8],
        num_regens: usize,
        decompression_level: i32,
        overrides: Vec<Option<Stream<'b>>>,
    ) -> Self {
        debug_assert_eq!(overrides.len(), num_regens);
        Self {
            header,
            num_regens,
            decompression_level,
            outputs: Vec::new(),
            overrides,
        }
    }

    /// This invocation's codec header, as emitted by the encoder.
    pub fn header(&self) -> &'e [u8] {
        self.header
    }

    /// The number of streams this decoder must regenerate.
    pub fn num_outputs(&self) -> usize {
        self.num_regens
    }

    /// The global decompression effort hint.
    pub fn decompression_level(&self) -> i32 {
        self.decompression_level
    }

    /// Creates the next output stream with the given maximum size.
    ///
    /// When the regenerated stream is a final user output with a caller-provided
    /// buffer, the returned stream delivers directly into that buffer. The stream must
    /// be committed before the decoder returns.
    ///
    /// # Errors
    ///
    /// Fails with a codec execution failure if the decoder exceeds the number of
    /// streams to regenerate, with a corruption error if the requested type does not
    /// match the recorded output layout, or with an allocation error if a caller
    /// buffer is too small.
    #[allow(clippy::missing_panics_doc)]
    pub fn create_output(
        &mut self,
        ty: StreamType,
        elt_width: usize,
        capacity_elts: usize,
    ) -> Result<&mut Stream<'b>> {
        let slot = self.outputs.len();
        if slot >= self.num_regens {
            return Err(Error::codec_execution("decoder exceeded its output count"));
        }

        let stream = match self.overrides[slot].take() {
            Some(dst) => {
                if dst.stream_type() != ty || dst.elt_width() != elt_width {
                    return Err(Error::corruption("decoded type does not match frame layout"));
                }
                if dst.capacity_elts() < capacity_elts {
                    return Err(Error::allocation());
                }
                dst
            }
            None => Stream::reserve(ty, elt_width, capacity_elts)?,
        };

        self.outputs.push(stream);
        Ok(self.outputs.last_mut().expect("output was just pushed"))
    }

    pub(crate) fn finish(self) -> Result<Vec<Stream<'b>>> {
        if self.outputs.len() != self.num_regens {
            return Err(Error::codec_execution("decoder produced the wrong output count"));
        }
        for output in &self.outputs {
            if !output.is_committed() {
                return Err(Error::codec_execution("decoder left an output uncommitted"));
            }
        }
        Ok(self.outputs)
    }
}

/// The encode entry point of a codec.
pub type EncodeFn =
    Box<dyn for<'e, 'a> Fn(&mut EncodeCtx<'e, 'a>, &[&Stream<'a>]) -> Result<()> + Send + Sync>;

/// The decode entry point of a codec.
pub type DecodeFn =
    Box<dyn for<'e, 'b> Fn(&mut DecodeCtx<'e, 'b>, &[&Stream<'b>]) -> Result<()> + Send + Sync>;

/// An encoder registered into a [`crate::Compressor`].
pub struct EncoderDesc {
    id: CodecId,
    name: String,
    shape: CodecShape,
    encode: EncodeFn,
}

impl EncoderDesc {
    /// Creates an encoder descriptor.
    pub fn new(id: CodecId, name: &str, shape: CodecShape, encode: EncodeFn) -> Self {
        Self {
            id,
            name: name.to_string(),
            shape,
            encode,
        }
    }

    /// The codec id.
    pub fn id(&self) -> CodecId {
        self.id
    }

    /// The diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The input/output contract.
    pub fn shape(&self) -> &CodecShape {
        &self.shape
    }

    pub(crate) fn run<'a>(
        &self,
        ctx: &mut EncodeCtx<'_, 'a>,
        inputs: &[&Stream<'a>],
    ) -> Result<()> {
        (self.encode)(ctx, inputs)
    }
}

impl core::fmt::Debug for EncoderDesc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EncoderDesc")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// A decoder registered into a [`crate::DCtx`].
pub struct DecoderDesc {
    id: CodecId,
    name: String,
    shape: CodecShape,
    decode: DecodeFn,
}

impl DecoderDesc {
    /// Creates a decoder descriptor.
    pub fn new(id: CodecId, name: &str, shape: CodecShape, decode: DecodeFn) -> Self {
        Self {
            id,
            name: name.to_string(),
            shape,
            decode,
        }
    }

    /// The codec id.
    pub fn id(&self) -> CodecId {
        self.id
    }

    /// The diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The input/output contract.
    pub fn shape(&self) -> &CodecShape {
        &self.shape
    }

    pub(crate) fn run<'b>(
        &self,
        ctx: &mut DecodeCtx<'_, 'b>,
        inputs: &[&Stream<'b>],
    ) -> Result<()> {
        (self.decode)(ctx, inputs)
    }
}

impl core::fmt::Debug for DecoderDesc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecoderDesc")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

// A collision is only an error when the shapes differ; re-registering an identical
// contract replaces the implementation.
fn check_collision(existing: &CodecShape, new: &CodecShape) -> Result<()> {
    if existing == new {
        Ok(())
    } else {
        Err(Error::logic("codec id already registered with a different shape"))
    }
}

#[derive(Debug, Default)]
pub(crate) struct EncoderRegistry {
    map: BTreeMap<u32, EncoderDesc>,
}

impl EncoderRegistry {
    pub(crate) fn register(&mut self, desc: EncoderDesc) -> Result<()> {
        if let Some(existing) = self.map.get(&desc.id().0) {
            check_collision(existing.shape(), desc.shape())?;
        }
        self.map.insert(desc.id().0, desc);
        Ok(())
    }

    pub(crate) fn get(&self, id: CodecId) -> Result<&EncoderDesc> {
        self.map.get(&id.0).ok_or_else(|| Error::unknown_codec(id.0))
    }

    pub(crate) fn contains(&self, id: CodecId) -> bool {
        self.map.contains_key(&id.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct DecoderRegistry {
    map: BTreeMap<u32, DecoderDesc>,
}

impl DecoderRegistry {
    pub(crate) fn register(&mut self, desc: DecoderDesc) -> Result<()> {
        if let Some(existing) = self.map.get(&desc.id().0) {
            check_collision(existing.shape(), desc.shape())?;
        }
        self.map.insert(desc.id().0, desc);
        Ok(())
    }

    pub(crate) fn get(&self, id: CodecId) -> Result<&DecoderDesc> {
        self.map.get(&id.0).ok_or_else(|| Error::unknown_codec(id.0))
    }
}
