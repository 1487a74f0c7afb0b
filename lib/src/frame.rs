use alloc::vec::Vec;

use xxhash_rust::xxh3::Xxh3;

use crate::error::{Error, Result};
use crate::stream::{Stream, StreamType};

/// The lowest frame format version this build can read and write.
pub const MIN_FORMAT_VERSION: u32 = 1;
/// The highest frame format version this build can read and write.
///
/// Version dialects:
///
/// | version | dialect |
/// |---------|---------|
/// | 1       | baseline layout; no compressed checksum |
/// | 2       | adds the compressed-checksum flag bit and footer field |
pub const MAX_FORMAT_VERSION: u32 = 2;

/// The magic number identifying a frame, serialized little endian.
pub const FRAME_MAGIC: u32 = 0x2E5A_4C31;

const FLAG_CONTENT_CHECKSUM: u8 = 1;
const FLAG_COMPRESSED_CHECKSUM: u8 = 1 << 1;

// Writes a LEB128 varint
pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// A bounds-checked cursor over frame bytes.
pub(crate) struct Reader<'f> {
    buf: &'f [u8],
    pos: usize,
}

impl<'f> Reader<'f> {
    pub(crate) fn new(buf: &'f [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::corruption("truncated frame"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn le32(&mut self) -> Result<u32> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.u8()?;
            if shift == 63 && byte > 1 {
                return Err(Error::corruption("varint overflow"));
            }
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(Error::corruption("varint overflow"));
            }
        }
    }

    pub(crate) fn len(&mut self) -> Result<usize> {
        let value = self.varint()?;
        let len = usize::try_from(value)?;
        // A length can never exceed the bytes that are left
        if len > self.remaining() {
            return Err(Error::corruption("length field exceeds frame size"));
        }
        Ok(len)
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'f [u8]> {
        if len > self.remaining() {
            return Err(Error::corruption("truncated frame"));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }
}

/// Type, width and size of one user input, as recorded in the inputs descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InputDesc {
    pub ty: StreamType,
    pub elt_width: u64,
    pub num_elts: u64,
    pub content_size: u64,
}

impl InputDesc {
    pub(crate) fn of_stream(stream: &Stream<'_>) -> Result<Self> {
        Ok(Self {
            ty: stream.stream_type(),
            elt_width: stream.elt_width() as u64,
            num_elts: stream.num_elts()? as u64,
            content_size: stream.content_size()? as u64,
        })
    }
}

/// One recorded codec invocation of the graph trace.
///
/// Stream ids are dense and assigned in creation order, user inputs first; the id
/// wiring is the entire structure the decompressor needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub codec: u32,
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
}

/// The parsed sections of a frame, borrowing from the frame bytes.
#[derive(Debug)]
pub(crate) struct FrameParts<'f> {
    pub version: u32,
    pub inputs: Vec<InputDesc>,
    pub trace: Vec<Invocation>,
    pub headers: Vec<&'f [u8]>,
    pub blobs: Vec<&'f [u8]>,
    pub content_checksum: Option<u32>,
}

pub(crate) struct FrameWriter {
    pub version: u32,
    pub content_checksum: Option<u32>,
    pub compressed_checksum: bool,
}

impl FrameWriter {
    pub(crate) fn write(
        &self,
        inputs: &[InputDesc],
        trace: &[Invocation],
        headers: &[Vec<u8>],
        blobs: &[Vec<u8>],
    ) -> Vec<u8> {
        debug_assert_eq!(trace.len(), headers.len());

        let mut out = Vec::with_capacity(64 + blobs.iter().map(Vec::len).sum::<usize>());
        out.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
        write_varint(&mut out, u64::from(self.version));

        let mut flags = 0u8;
        if self.content_checksum.is_some() {
            flags |= FLAG_CONTENT_CHECKSUM;
        }
        if self.compressed_checksum {
            flags |= FLAG_COMPRESSED_CHECKSUM;
        }
        out.push(flags);

        write_varint(&mut out, inputs.len() as u64);
        for desc in inputs {
            out.push(desc.ty.tag());
            write_varint(&mut out, desc.elt_width);
            write_varint(&mut out, desc.num_elts);
            write_varint(&mut out, desc.content_size);
        }

        write_varint(&mut out, trace.len() as u64);
        for inv in trace {
            write_varint(&mut out, u64::from(inv.codec));
            write_varint(&mut out, inv.inputs.len() as u64);
            for id in &inv.inputs {
                write_varint(&mut out, u64::from(*id));
            }
            write_varint(&mut out, inv.outputs.len() as u64);
            for id in &inv.outputs {
                write_varint(&mut out, u64::from(*id));
            }
        }

        for header in headers {
            write_varint(&mut out, header.len() as u64);
            out.extend_from_slice(header);
        }

        write_varint(&mut out, blobs.len() as u64);
        for blob in blobs {
            write_varint(&mut out, blob.len() as u64);
            out.extend_from_slice(blob);
        }

        // The footer is excluded from the compressed checksum
        if let Some(checksum) = self.content_checksum {
            out.extend_from_slice(&checksum.to_le_bytes());
        }
        if self.compressed_checksum {
            let body_end = out.len() - if self.content_checksum.is_some() { 4 } else { 0 };
            let checksum = body_checksum(&out[..body_end]);
            out.extend_from_slice(&checksum.to_le_bytes());
        }

        out
    }
}

fn parse_prologue(reader: &mut Reader<'_>) -> Result<(u32, u8, Vec<InputDesc>)> {
    let magic = reader.le32()?;
    if magic != FRAME_MAGIC {
        return Err(Error::corruption("bad magic number"));
    }

    let version = u32::try_from(reader.varint()?)
        .map_err(|_| Error::corruption("format version out of range"))?;
    if !(MIN_FORMAT_VERSION..=MAX_FORMAT_VERSION).contains(&version) {
        return Err(Error::unsupported_version(version));
    }

    let flags = reader.u8()?;
    if flags & !(FLAG_CONTENT_CHECKSUM | FLAG_COMPRESSED_CHECKSUM) != 0 {
        return Err(Error::corruption("reserved flag bits set"));
    }
    if version < 2 && flags & FLAG_COMPRESSED_CHECKSUM != 0 {
        return Err(Error::corruption("compressed checksum flag in version 1 frame"));
    }

    let num_inputs = reader.len()?;
    let mut inputs = Vec::with_capacity(num_inputs);
    for _ in 0..num_inputs {
        let ty = StreamType::from_tag(reader.u8()?)?;
        let elt_width = reader.varint()?;
        let num_elts = reader.varint()?;
        let content_size = reader.varint()?;
        match ty {
            StreamType::Serial | StreamType::String => {
                if elt_width != 1 {
                    return Err(Error::corruption("invalid element width in descriptor"));
                }
            }
            StreamType::Struct => {
                if elt_width == 0 {
                    return Err(Error::corruption("invalid element width in descriptor"));
                }
            }
            StreamType::Numeric => {
                if !matches!(elt_width, 1 | 2 | 4 | 8) {
                    return Err(Error::corruption("invalid element width in descriptor"));
                }
            }
        }
        if ty != StreamType::String && num_elts.checked_mul(elt_width) != Some(content_size) {
            return Err(Error::corruption("inconsistent sizes in descriptor"));
        }
        inputs.push(InputDesc {
            ty,
            elt_width,
            num_elts,
            content_size,
        });
    }

    Ok((version, flags, inputs))
}

pub(crate) fn parse_frame(frame: &[u8]) -> Result<FrameParts<'_>> {
    let mut reader = Reader::new(frame);
    let (version, flags, inputs) = parse_prologue(&mut reader)?;

    let num_invocations = reader.len()?;
    let mut trace = Vec::with_capacity(num_invocations);
    for _ in 0..num_invocations {
        let codec = u32::try_from(reader.varint()?)
            .map_err(|_| Error::corruption("codec id out of range"))?;
        let num_in = reader.len()?;
        let mut in_ids = Vec::with_capacity(num_in);
        for _ in 0..num_in {
            in_ids.push(u32::try_from(reader.varint()?)
                .map_err(|_| Error::corruption("stream id out of range"))?);
        }
        let num_out = reader.len()?;
        let mut out_ids = Vec::with_capacity(num_out);
        for _ in 0..num_out {
            out_ids.push(u32::try_from(reader.varint()?)
                .map_err(|_| Error::corruption("stream id out of range"))?);
        }
        trace.push(Invocation {
            codec,
            inputs: in_ids,
            outputs: out_ids,
        });
    }

    let mut headers = Vec::with_capacity(num_invocations);
    for _ in 0..num_invocations {
        let len = reader.len()?;
        headers.push(reader.bytes(len)?);
    }

    let num_blobs = reader.len()?;
    let mut blobs = Vec::with_capacity(num_blobs);
    for _ in 0..num_blobs {
        let len = reader.len()?;
        blobs.push(reader.bytes(len)?);
    }

    let body_end = reader.pos();
    let mut footer_size = 0;
    if flags & FLAG_CONTENT_CHECKSUM != 0 {
        footer_size += 4;
    }
    if flags & FLAG_COMPRESSED_CHECKSUM != 0 {
        footer_size += 4;
    }
    if reader.remaining() != footer_size {
        return Err(Error::corruption("trailing data after frame"));
    }

    let content_checksum = if flags & FLAG_CONTENT_CHECKSUM != 0 {
        Some(reader.le32()?)
    } else {
        None
    };
    if flags & FLAG_COMPRESSED_CHECKSUM != 0 {
        let expected = reader.le32()?;
        if body_checksum(&frame[..body_end]) != expected {
            return Err(Error::corruption("compressed checksum mismatch"));
        }
    }

    Ok(FrameParts {
        version,
        inputs,
        trace,
        headers,
        blobs,
        content_checksum,
    })
}

/// Type, width and size of one decompressed output, as recorded in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    pub(crate) ty: StreamType,
    pub(crate) elt_width: u64,
    pub(crate) num_elts: u64,
    pub(crate) content_size: u64,
}

impl OutputInfo {
    pub(crate) fn of_desc(desc: &InputDesc) -> Self {
        Self {
            ty: desc.ty,
            elt_width: desc.elt_width,
            num_elts: desc.num_elts,
            content_size: desc.content_size,
        }
    }

    /// The stream type of this output.
    pub fn stream_type(&self) -> StreamType {
        self.ty
    }

    /// The element width in bytes.
    pub fn elt_width(&self) -> u64 {
        self.elt_width
    }

    /// The number of elements.
    pub fn num_elts(&self) -> u64 {
        self.num_elts
    }

    /// The content size in bytes.
    pub fn content_size(&self) -> u64 {
        self.content_size
    }
}

/// Format version and output layout of a frame, read from a frame prefix without
/// decompressing.
///
/// # Examples
///
/// ```
/// use zlgraph::{CCtx, Compressor, FrameInfo, StandardGraph, Stream};
///
/// let mut compressor = Compressor::new();
/// let store = compressor.standard_graph(StandardGraph::Store);
/// compressor.set_start(store);
///
/// let frame = CCtx::new().compress(&compressor, &[Stream::ref_serial(b"hello")])?;
/// let info = FrameInfo::parse(&frame)?;
///
/// assert_eq!(info.num_outputs(), 1);
/// assert_eq!(info.outputs()[0].content_size(), 5);
/// # Ok::<(), zlgraph::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    format_version: u32,
    outputs: Vec<OutputInfo>,
}

impl FrameInfo {
    /// Parses the frame prologue from `prefix`.
    ///
    /// Only the magic number, format version, flags and the inputs descriptor need to
    /// be present.
    ///
    /// # Errors
    ///
    /// Fails with `corruption` if the prologue is malformed, or with
    /// `unsupported_version` if the format version is outside the supported range.
    pub fn parse(prefix: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(prefix);
        let (format_version, _, inputs) = parse_prologue(&mut reader)?;

        Ok(Self {
            format_version,
            outputs: inputs.iter().map(OutputInfo::of_desc).collect(),
        })
    }

    /// The format version of the frame.
    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// The number of outputs decompression will produce.
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Per-output type and size information.
    pub fn outputs(&self) -> &[OutputInfo] {
        &self.outputs
    }
}

/// Hashes the logical, type-aware concatenation of `streams`.
///
/// Covers the type tag, element width, element count, string lengths and contents of
/// every stream, so that the checksum also detects type confusion.
pub(crate) fn content_checksum(streams: &[&Stream<'_>]) -> Result<u32> {
    let mut hasher = Xxh3::new();
    for stream in streams {
        hasher.update(&[stream.stream_type().tag()]);
        hasher.update(&(stream.elt_width() as u64).to_le_bytes());
        hasher.update(&(stream.num_elts()? as u64).to_le_bytes());
        if stream.stream_type() == StreamType::String {
            for len in stream.string_lens()? {
                hasher.update(&len.to_le_bytes());
            }
        }
        hasher.update(stream.content()?);
    }
    Ok(hasher.digest() as u32)
}

pub(crate) fn body_checksum(body: &[u8]) -> u32 {
    xxhash_rust::xxh3::xxh3_64(body) as u32
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn varint_cycle() {
        for value in [0u64, 1, 127, 128, 300, 16383, 16384, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            let mut reader = Reader::new(&buf);
            assert_eq!(reader.varint().unwrap(), value);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn varint_overflow() {
        let mut reader = Reader::new(&[0xFF; 10]);
        assert!(reader.varint().unwrap_err().is_corruption());
    }

    fn sample_parts() -> (Vec<InputDesc>, Vec<Invocation>, Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let inputs = vec![InputDesc {
            ty: StreamType::Numeric,
            elt_width: 4,
            num_elts: 3,
            content_size: 12,
        }];
        let trace = vec![Invocation {
            codec: 1,
            inputs: vec![0],
            outputs: vec![],
        }];
        let headers = vec![vec![2, 4]];
        let blobs = vec![vec![9u8; 12]];
        (inputs, trace, headers, blobs)
    }

    #[test]
    fn frame_cycle() {
        let (inputs, trace, headers, blobs) = sample_parts();
        let frame = FrameWriter {
            version: MAX_FORMAT_VERSION,
            content_checksum: Some(0xDEAD_BEEF),
            compressed_checksum: true,
        }
        .write(&inputs, &trace, &headers, &blobs);

        let parts = parse_frame(&frame).unwrap();
        assert_eq!(parts.version, MAX_FORMAT_VERSION);
        assert_eq!(parts.inputs, inputs);
        assert_eq!(parts.trace, trace);
        assert_eq!(parts.headers, vec![&[2u8, 4][..]]);
        assert_eq!(parts.blobs, vec![&[9u8; 12][..]]);
        assert_eq!(parts.content_checksum, Some(0xDEAD_BEEF));
    }

    #[test]
    fn rejects_unknown_version() {
        let (inputs, trace, headers, blobs) = sample_parts();
        let mut frame = FrameWriter {
            version: MAX_FORMAT_VERSION,
            content_checksum: None,
            compressed_checksum: false,
        }
        .write(&inputs, &trace, &headers, &blobs);

        // The version varint sits directly after the magic number
        frame[4] = (MAX_FORMAT_VERSION + 1) as u8;
        assert!(parse_frame(&frame).unwrap_err().is_unsupported_version());
        assert!(FrameInfo::parse(&frame).unwrap_err().is_unsupported_version());
    }

    #[test]
    fn rejects_bad_magic() {
        let (inputs, trace, headers, blobs) = sample_parts();
        let mut frame = FrameWriter {
            version: 1,
            content_checksum: None,
            compressed_checksum: false,
        }
        .write(&inputs, &trace, &headers, &blobs);

        frame[0] ^= 0xFF;
        assert!(parse_frame(&frame).unwrap_err().is_corruption());
    }

    #[test]
    fn compressed_checksum_detects_body_flips() {
        let (inputs, trace, headers, blobs) = sample_parts();
        let frame = FrameWriter {
            version: 2,
            content_checksum: None,
            compressed_checksum: true,
        }
        .write(&inputs, &trace, &headers, &blobs);

        // Flip one bit in every body byte, skipping magic and version so the failure is
        // always the checksum and not an earlier structural error
        for i in 6..frame.len() - 4 {
            let mut bad = frame.clone();
            bad[i] ^= 1;
            assert!(parse_frame(&bad).is_err(), "byte {i} went undetected");
        }
    }

    #[test]
    fn rejects_compressed_checksum_in_v1() {
        let (inputs, trace, headers, blobs) = sample_parts();
        let mut frame = FrameWriter {
            version: 1,
            content_checksum: None,
            compressed_checksum: false,
        }
        .write(&inputs, &trace, &headers, &blobs);

        // Set the compressed checksum flag bit by hand
        frame[5] |= 0b10;
        assert!(parse_frame(&frame).unwrap_err().is_corruption());
    }

    #[test]
    fn frame_info_reads_prefix_only() {
        let (inputs, trace, headers, blobs) = sample_parts();
        let frame = FrameWriter {
            version: 2,
            content_checksum: None,
            compressed_checksum: false,
        }
        .write(&inputs, &trace, &headers, &blobs);

        // The prologue ends before the trace; 16 bytes are more than enough here
        let info = FrameInfo::parse(&frame[..16]).unwrap();
        assert_eq!(info.format_version(), 2);
        assert_eq!(info.num_outputs(), 1);
        assert_eq!(info.outputs()[0].stream_type(), StreamType::Numeric);
        assert_eq!(info.outputs()[0].num_elts(), 3);
    }
}
