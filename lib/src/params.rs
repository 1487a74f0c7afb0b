use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::frame::{MAX_FORMAT_VERSION, MIN_FORMAT_VERSION};

/// A global compression parameter, set per context with [`crate::CCtx::set_parameter`].
#[derive(Debug, Clone, Copy)]
pub enum CParam {
    /// The frame format version to compress at. Must lie within
    /// [`crate::MIN_FORMAT_VERSION`]..=[`crate::MAX_FORMAT_VERSION`].
    FormatVersion(u32),
    /// The compression level forwarded to the backend kernels. Zero selects the
    /// backend default.
    CompressionLevel(i32),
    /// The decompression effort hint forwarded to decoders.
    DecompressionLevel(i32),
    /// Whether to hash the inputs and emit a content checksum in the frame footer.
    ContentChecksum(bool),
    /// Whether to hash the frame body and emit a compressed checksum in the footer.
    /// Requires format version 2 or newer.
    CompressedChecksum(bool),
    /// Streams smaller than this many bytes are routed to the store graph instead of
    /// their declared destination.
    MinStreamSize(u64),
    /// With permissive compression enabled, codec execution failures, transform
    /// execution failures and invalid node inputs raised by an encoder downgrade to a
    /// store fallback for that codec's inputs. Allocation failures, logic errors and
    /// frame-level errors stay fatal.
    Permissive(bool),
    /// Whether parameters persist across calls on the same context. Non-sticky
    /// contexts reset to defaults after every compression call.
    StickyParameters(bool),
}

/// The resolved global parameter set of one compression call.
#[derive(Debug, Clone)]
pub(crate) struct CParams {
    pub format_version: u32,
    pub compression_level: i32,
    pub decompression_level: i32,
    pub content_checksum: bool,
    pub compressed_checksum: bool,
    pub min_stream_size: u64,
    pub permissive: bool,
    pub sticky: bool,
}

impl Default for CParams {
    fn default() -> Self {
        Self {
            format_version: MAX_FORMAT_VERSION,
            compression_level: 0,
            decompression_level: 0,
            content_checksum: false,
            compressed_checksum: false,
            min_stream_size: 0,
            permissive: false,
            sticky: false,
        }
    }
}

impl CParams {
    pub(crate) fn apply(&mut self, param: CParam) -> Result<()> {
        match param {
            CParam::FormatVersion(v) => {
                if !(MIN_FORMAT_VERSION..=MAX_FORMAT_VERSION).contains(&v) {
                    return Err(Error::unsupported_version(v));
                }
                self.format_version = v;
            }
            CParam::CompressionLevel(level) => self.compression_level = level,
            CParam::DecompressionLevel(level) => self.decompression_level = level,
            CParam::ContentChecksum(flag) => self.content_checksum = flag,
            CParam::CompressedChecksum(flag) => self.compressed_checksum = flag,
            CParam::MinStreamSize(size) => self.min_stream_size = size,
            CParam::Permissive(flag) => self.permissive = flag,
            CParam::StickyParameters(flag) => self.sticky = flag,
        }
        Ok(())
    }

    // The compressed checksum needs a footer field that only exists from version 2 on.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.compressed_checksum && self.format_version < 2 {
            return Err(Error::logic(
                "compressed checksum requires format version 2 or newer",
            ));
        }
        Ok(())
    }
}

/// Sparse, integer-keyed parameters local to one node.
///
/// Values are either small integers or arbitrary byte blobs. Cloned nodes inherit
/// their base's parameters and may override any subset.
///
/// # Examples
///
/// ```
/// use zlgraph::LocalParams;
///
/// let params = LocalParams::new().with_int(0, 12).with_blob(1, b"table".to_vec());
/// assert_eq!(params.get_int(0), Some(12));
/// assert_eq!(params.get_blob(1), Some(&b"table"[..]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalParams {
    ints: BTreeMap<i32, i64>,
    blobs: BTreeMap<i32, Vec<u8>>,
}

impl LocalParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an integer parameter.
    pub fn with_int(mut self, key: i32, value: i64) -> Self {
        self.ints.insert(key, value);
        self
    }

    /// Sets a byte-blob parameter.
    pub fn with_blob(mut self, key: i32, value: Vec<u8>) -> Self {
        self.blobs.insert(key, value);
        self
    }

    /// Looks up an integer parameter.
    pub fn get_int(&self, key: i32) -> Option<i64> {
        self.ints.get(&key).copied()
    }

    /// Looks up a byte-blob parameter.
    pub fn get_blob(&self, key: i32) -> Option<&[u8]> {
        self.blobs.get(&key).map(Vec::as_slice)
    }

    /// Returns true if no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.blobs.is_empty()
    }

    // Overrides entries of `self` with all entries of `other`.
    pub(crate) fn merge_from(&mut self, other: &LocalParams) {
        for (k, v) in &other.ints {
            self.ints.insert(*k, *v);
        }
        for (k, v) in &other.blobs {
            self.blobs.insert(*k, v.clone());
        }
    }

    pub(crate) fn ints(&self) -> impl Iterator<Item = (i32, i64)> + '_ {
        self.ints.iter().map(|(k, v)| (*k, *v))
    }

    pub(crate) fn blobs(&self) -> impl Iterator<Item = (i32, &[u8])> + '_ {
        self.blobs.iter().map(|(k, v)| (*k, v.as_slice()))
    }
}
