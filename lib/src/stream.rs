use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::error::{Error, Result};

/// The type of the data carried by a [`Stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// An opaque byte sequence, element width is always 1.
    Serial,
    /// A sequence of fixed-width records.
    Struct,
    /// A sequence of little-endian unsigned integers of width 1, 2, 4 or 8.
    Numeric,
    /// A sequence of variable-length byte strings, stored as concatenated content
    /// plus an array of per-element lengths.
    String,
}

impl StreamType {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Serial => 0,
            Self::Struct => 1,
            Self::Numeric => 2,
            Self::String => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Serial),
            1 => Ok(Self::Struct),
            2 => Ok(Self::Numeric),
            3 => Ok(Self::String),
            _ => Err(Error::corruption("invalid stream type tag")),
        }
    }

    /// The mask containing only this type.
    pub fn mask(self) -> TypeMask {
        TypeMask(1 << self.tag())
    }
}

/// A set of [`StreamType`]s, used to declare which types a codec or graph accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMask(u8);

impl TypeMask {
    pub const SERIAL: Self = Self(1);
    pub const STRUCT: Self = Self(1 << 1);
    pub const NUMERIC: Self = Self(1 << 2);
    pub const STRING: Self = Self(1 << 3);
    /// All four stream types.
    pub const ANY: Self = Self(0b1111);
    /// All fixed-width types, i.e. everything except [`StreamType::String`].
    pub const FIXED_WIDTH: Self = Self(0b0111);

    /// Returns true if `ty` is a member of this mask.
    pub fn contains(self, ty: StreamType) -> bool {
        self.0 & (1 << ty.tag()) != 0
    }

    pub(crate) fn bits(self) -> u8 {
        self.0
    }

    pub(crate) fn from_bits(bits: u8) -> Result<Self> {
        if bits == 0 || bits > Self::ANY.0 {
            return Err(Error::corruption("invalid type mask"));
        }
        Ok(Self(bits))
    }
}

impl core::ops::BitOr for TypeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<StreamType> for TypeMask {
    fn from(ty: StreamType) -> Self {
        ty.mask()
    }
}

enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
    BorrowedMut(&'a mut [u8]),
    View {
        parent: Rc<Stream<'a>>,
        offset_bytes: usize,
    },
}

/// A typed, optionally-owned buffer of elements flowing between codecs.
///
/// A stream is either *uncommitted* (capacity reserved, size not final) or *committed*
/// (size frozen, contents read-only). Codecs write into uncommitted streams and commit
/// them exactly once; committed streams can be read, sliced and re-referenced but never
/// mutated again.
pub struct Stream<'a> {
    ty: StreamType,
    elt_width: usize,
    capacity_elts: usize,
    num_elts: Option<usize>,
    content_size: usize,
    storage: Storage<'a>,
    lens: Option<Vec<u32>>,
    pending_elts: usize,
    pending_bytes: usize,
    meta: BTreeMap<i32, i64>,
}

fn check_width(ty: StreamType, elt_width: usize) -> Result<()> {
    let ok = match ty {
        StreamType::Serial | StreamType::String => elt_width == 1,
        StreamType::Struct => elt_width > 0,
        StreamType::Numeric => matches!(elt_width, 1 | 2 | 4 | 8),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::logic("invalid element width for stream type"))
    }
}

impl<'a> Stream<'a> {
    fn empty(ty: StreamType, elt_width: usize, capacity_elts: usize, storage: Storage<'a>) -> Self {
        Self {
            ty,
            elt_width,
            capacity_elts,
            num_elts: None,
            content_size: 0,
            storage,
            lens: None,
            pending_elts: 0,
            pending_bytes: 0,
            meta: BTreeMap::new(),
        }
    }

    /// Reserves an owned, uncommitted stream with capacity for `capacity_elts` elements.
    ///
    /// For [`StreamType::String`], `capacity_elts` is the content capacity in bytes and
    /// `elt_width` must be 1; the per-element length array is reserved separately with
    /// [`Self::reserve_string_lens`].
    ///
    /// # Errors
    ///
    /// Fails with an allocation error if memory is exhausted, or with a logic error if
    /// `elt_width` is invalid for `ty`.
    pub fn reserve(ty: StreamType, elt_width: usize, capacity_elts: usize) -> Result<Self> {
        check_width(ty, elt_width)?;
        let size = capacity_elts
            .checked_mul(elt_width)
            .ok_or_else(Error::allocation)?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).map_err(|_| Error::allocation())?;
        buf.resize(size, 0);

        Ok(Self::empty(ty, elt_width, capacity_elts, Storage::Owned(buf)))
    }

    /// Creates a committed, read-only reference stream over external memory.
    ///
    /// Not usable for [`StreamType::String`]; use [`Self::ref_string`] instead, which
    /// also attaches the length array.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if `elt_width` is invalid for `ty`, or if `data` is not
    /// a whole number of elements.
    pub fn ref_read(ty: StreamType, elt_width: usize, data: &'a [u8]) -> Result<Self> {
        if ty == StreamType::String {
            return Err(Error::logic("string references require a length array"));
        }
        check_width(ty, elt_width)?;
        if data.len() % elt_width != 0 {
            return Err(Error::logic("buffer is not a whole number of elements"));
        }
        let num_elts = data.len() / elt_width;

        let mut stream = Self::empty(ty, elt_width, num_elts, Storage::Borrowed(data));
        stream.num_elts = Some(num_elts);
        stream.content_size = data.len();
        Ok(stream)
    }

    /// Creates a committed, read-only serial reference over `data`.
    #[allow(clippy::missing_panics_doc)]
    pub fn ref_serial(data: &'a [u8]) -> Self {
        // Serial references are always well formed
        Self::ref_read(StreamType::Serial, 1, data).expect("serial width is valid")
    }

    /// Creates a committed, read-only struct reference over `data`.
    ///
    /// # Errors
    ///
    /// Fails if `elt_width` is zero or `data` is not a whole number of records.
    pub fn ref_struct(elt_width: usize, data: &'a [u8]) -> Result<Self> {
        Self::ref_read(StreamType::Struct, elt_width, data)
    }

    /// Creates a committed, read-only numeric reference over `data`.
    ///
    /// # Errors
    ///
    /// Fails if `elt_width` is not one of 1, 2, 4, 8, or `data` is not a whole number
    /// of elements.
    pub fn ref_numeric(elt_width: usize, data: &'a [u8]) -> Result<Self> {
        Self::ref_read(StreamType::Numeric, elt_width, data)
    }

    /// Creates a committed, read-only string reference over concatenated `content` and
    /// per-element `lens`.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if the lengths do not sum up to `content.len()`.
    pub fn ref_string(content: &'a [u8], lens: &[u32]) -> Result<Self> {
        let total: u64 = lens.iter().map(|l| u64::from(*l)).sum();
        if total != content.len() as u64 {
            return Err(Error::logic("string lengths do not sum to content size"));
        }

        let mut stream = Self::empty(
            StreamType::String,
            1,
            content.len(),
            Storage::Borrowed(content),
        );
        stream.num_elts = Some(lens.len());
        stream.content_size = content.len();
        stream.lens = Some(lens.to_vec());
        Ok(stream)
    }

    /// Creates an uncommitted, write-only reference stream over a preallocated buffer.
    ///
    /// The stream delivers data directly into `buf`; its capacity is the number of
    /// whole elements that fit.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if `elt_width` is invalid for `ty`.
    pub fn ref_write(ty: StreamType, elt_width: usize, buf: &'a mut [u8]) -> Result<Self> {
        check_width(ty, elt_width)?;
        let capacity_elts = buf.len() / elt_width;
        Ok(Self::empty(ty, elt_width, capacity_elts, Storage::BorrowedMut(buf)))
    }

    /// The stream type.
    pub fn stream_type(&self) -> StreamType {
        self.ty
    }

    /// The element width in bytes. Always 1 for serial and string streams.
    pub fn elt_width(&self) -> usize {
        self.elt_width
    }

    /// The element capacity this stream was reserved with.
    pub fn capacity_elts(&self) -> usize {
        self.capacity_elts
    }

    /// Returns true once the stream size has been frozen with [`Self::commit`].
    pub fn is_committed(&self) -> bool {
        self.num_elts.is_some()
    }

    /// The committed number of elements.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if the stream is not committed.
    pub fn num_elts(&self) -> Result<usize> {
        self.num_elts
            .ok_or_else(|| Error::logic("stream is not committed"))
    }

    /// The committed content size in bytes.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if the stream is not committed.
    pub fn content_size(&self) -> Result<usize> {
        self.num_elts()?;
        Ok(self.content_size)
    }

    /// The committed contents.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if the stream is not committed.
    #[allow(clippy::match_same_arms)]
    pub fn content(&self) -> Result<&[u8]> {
        self.num_elts()?;
        match &self.storage {
            Storage::Owned(buf) => Ok(&buf[..self.content_size]),
            Storage::Borrowed(buf) => Ok(&buf[..self.content_size]),
            Storage::BorrowedMut(buf) => Ok(&buf[..self.content_size]),
            Storage::View {
                parent,
                offset_bytes,
            } => Ok(&parent.content()?[*offset_bytes..*offset_bytes + self.content_size]),
        }
    }

    /// Writable access to the full reserved capacity.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if the stream is already committed or does not own a
    /// writable buffer.
    pub fn buf_mut(&mut self) -> Result<&mut [u8]> {
        if self.is_committed() {
            return Err(Error::logic("stream is already committed"));
        }
        match &mut self.storage {
            Storage::Owned(buf) => Ok(buf.as_mut_slice()),
            Storage::BorrowedMut(buf) => Ok(&mut buf[..]),
            Storage::Borrowed(_) | Storage::View { .. } => {
                Err(Error::logic("stream is not writable"))
            }
        }
    }

    /// Freezes the stream at `num_elts` elements. After this the stream is read-only.
    ///
    /// For string streams, the length array must have exactly `num_elts` entries; the
    /// content size becomes the sum of all lengths.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if called twice, or with an allocation error if
    /// `num_elts` exceeds the reserved capacity.
    pub fn commit(&mut self, num_elts: usize) -> Result<()> {
        if self.is_committed() {
            return Err(Error::logic("stream is already committed"));
        }

        let content_size = if self.ty == StreamType::String {
            let lens = self
                .lens
                .as_ref()
                .ok_or_else(|| Error::logic("string stream committed without lengths"))?;
            if lens.len() != num_elts {
                return Err(Error::logic("string length array does not match element count"));
            }
            let total: u64 = lens.iter().map(|l| u64::from(*l)).sum();
            usize::try_from(total).map_err(|_| Error::allocation())?
        } else {
            if num_elts > self.capacity_elts {
                return Err(Error::allocation());
            }
            num_elts * self.elt_width
        };

        if content_size > self.capacity_elts * self.elt_width {
            return Err(Error::allocation());
        }

        self.num_elts = Some(num_elts);
        self.content_size = content_size;
        Ok(())
    }

    /// Reserves the per-element length array of a string stream.
    ///
    /// # Errors
    ///
    /// Fails with a logic error on non-string streams.
    pub fn reserve_string_lens(&mut self, num: usize) -> Result<()> {
        if self.ty != StreamType::String {
            return Err(Error::logic("length array on non-string stream"));
        }
        let mut lens = Vec::new();
        lens.try_reserve_exact(num).map_err(|_| Error::allocation())?;
        self.lens = Some(lens);
        Ok(())
    }

    /// Appends one entry to the length array of an uncommitted string stream.
    ///
    /// # Errors
    ///
    /// Fails with a logic error on non-string or committed streams.
    pub fn push_string_len(&mut self, len: u32) -> Result<()> {
        if self.ty != StreamType::String {
            return Err(Error::logic("length array on non-string stream"));
        }
        if self.is_committed() {
            return Err(Error::logic("stream is already committed"));
        }
        self.lens.get_or_insert_with(Vec::new).push(len);
        Ok(())
    }

    /// Replaces the length array of an uncommitted string stream.
    ///
    /// # Errors
    ///
    /// Fails with a logic error on non-string or committed streams.
    pub fn set_string_lens(&mut self, lens: Vec<u32>) -> Result<()> {
        if self.ty != StreamType::String {
            return Err(Error::logic("length array on non-string stream"));
        }
        if self.is_committed() {
            return Err(Error::logic("stream is already committed"));
        }
        self.lens = Some(lens);
        Ok(())
    }

    /// The per-element lengths of a committed string stream.
    ///
    /// # Errors
    ///
    /// Fails with a logic error on non-string or uncommitted streams.
    pub fn string_lens(&self) -> Result<&[u32]> {
        if self.ty != StreamType::String {
            return Err(Error::logic("length array on non-string stream"));
        }
        self.num_elts()?;
        Ok(self.lens.as_deref().unwrap_or(&[]))
    }

    /// Looks up sparse integer metadata.
    pub fn int_metadata(&self, key: i32) -> Option<i64> {
        self.meta.get(&key).copied()
    }

    /// Sets sparse integer metadata.
    pub fn set_int_metadata(&mut self, key: i32, value: i64) {
        self.meta.insert(key, value);
    }

    pub(crate) fn metadata(&self) -> &BTreeMap<i32, i64> {
        &self.meta
    }

    pub(crate) fn copy_metadata_from(&mut self, src: &Stream<'_>) {
        self.meta = src.meta.clone();
    }

    /// Creates a read-only view of `count` elements starting at `offset_elts`.
    ///
    /// The view shares the parent's contents without copying; its lifetime is bound to
    /// the shared handle.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if the parent is uncommitted or the range is out of
    /// bounds.
    pub fn slice(parent: &Rc<Stream<'a>>, offset_elts: usize, count: usize) -> Result<Stream<'a>> {
        let num = parent.num_elts()?;
        if offset_elts + count > num {
            return Err(Error::logic("slice range out of bounds"));
        }

        let (offset_bytes, content_size, lens) = if parent.ty == StreamType::String {
            let lens = parent.string_lens()?;
            let offset_bytes: u64 = lens[..offset_elts].iter().map(|l| u64::from(*l)).sum();
            let size: u64 = lens[offset_elts..offset_elts + count]
                .iter()
                .map(|l| u64::from(*l))
                .sum();
            (
                offset_bytes as usize,
                size as usize,
                Some(lens[offset_elts..offset_elts + count].to_vec()),
            )
        } else {
            (
                offset_elts * parent.elt_width,
                count * parent.elt_width,
                None,
            )
        };

        let mut view = Stream::empty(
            parent.ty,
            parent.elt_width,
            count,
            Storage::View {
                parent: Rc::clone(parent),
                offset_bytes,
            },
        );
        view.num_elts = Some(count);
        view.content_size = content_size;
        view.lens = lens;
        Ok(view)
    }

    /// Copy-appends the contents of `src` to this uncommitted, owned stream.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if types or widths differ, or with an allocation error
    /// if the remaining capacity is insufficient.
    pub fn append(&mut self, src: &Stream<'_>) -> Result<()> {
        if src.ty != self.ty || src.elt_width != self.elt_width {
            return Err(Error::logic("append type or width mismatch"));
        }
        let src_bytes = src.content()?;
        let src_elts = src.num_elts()?;
        let pos = self.pending_bytes;
        if pos + src_bytes.len() > self.capacity_elts * self.elt_width {
            return Err(Error::allocation());
        }
        if self.ty == StreamType::String {
            let src_lens = src.string_lens()?.to_vec();
            for len in src_lens {
                self.push_string_len(len)?;
            }
        }
        self.buf_mut()?[pos..pos + src_bytes.len()].copy_from_slice(src_bytes);
        self.pending_bytes = pos + src_bytes.len();
        self.pending_elts += src_elts;
        Ok(())
    }

    /// The number of elements appended so far with [`Self::append`].
    pub fn pending_elts(&self) -> usize {
        self.pending_elts
    }

    /// An owned, committed numeric stream over 16 bit values.
    pub fn from_u16s(values: &[u16]) -> Stream<'static> {
        let mut buf = Vec::with_capacity(values.len() * 2);
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Stream::owned_committed(StreamType::Numeric, 2, values.len(), buf)
    }

    /// An owned, committed numeric stream over 32 bit values.
    pub fn from_u32s(values: &[u32]) -> Stream<'static> {
        let mut buf = Vec::with_capacity(values.len() * 4);
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Stream::owned_committed(StreamType::Numeric, 4, values.len(), buf)
    }

    /// An owned, committed numeric stream over 64 bit values.
    pub fn from_u64s(values: &[u64]) -> Stream<'static> {
        let mut buf = Vec::with_capacity(values.len() * 8);
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Stream::owned_committed(StreamType::Numeric, 8, values.len(), buf)
    }

    // An owned copy with the same type, contents, lengths and metadata. Used for
    // trial compression on scratch state.
    pub(crate) fn duplicate(&self) -> Result<Stream<'static>> {
        let mut copy = Stream::owned_committed(
            self.ty,
            self.elt_width,
            self.num_elts()?,
            self.content()?.to_vec(),
        );
        if self.ty == StreamType::String {
            copy.lens = Some(self.string_lens()?.to_vec());
        }
        copy.meta = self.meta.clone();
        Ok(copy)
    }

    pub(crate) fn owned_committed(
        ty: StreamType,
        elt_width: usize,
        num_elts: usize,
        buf: Vec<u8>,
    ) -> Stream<'a> {
        let capacity_elts = buf.len() / elt_width;
        let content_size = buf.len();
        let mut stream = Stream::empty(ty, elt_width, capacity_elts, Storage::Owned(buf));
        stream.num_elts = Some(num_elts);
        stream.content_size = content_size;
        stream
    }

    /// The committed elements of a numeric stream, widened to `u64`.
    ///
    /// # Errors
    ///
    /// Fails with a logic error on non-numeric or uncommitted streams.
    pub fn numeric_values(&self) -> Result<Vec<u64>> {
        if self.ty != StreamType::Numeric {
            return Err(Error::logic("numeric access on non-numeric stream"));
        }
        let bytes = self.content()?;
        let width = self.elt_width;
        let mut values = Vec::with_capacity(self.num_elts()?);
        for chunk in bytes.chunks_exact(width) {
            let mut le = [0u8; 8];
            le[..width].copy_from_slice(chunk);
            values.push(u64::from_le_bytes(le));
        }
        Ok(values)
    }
}

impl core::fmt::Debug for Stream<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stream")
            .field("type", &self.ty)
            .field("elt_width", &self.elt_width)
            .field("num_elts", &self.num_elts)
            .field("content_size", &self.content_size)
            .finish_non_exhaustive()
    }
}

/// Committed streams compare by logical content: type, width, elements and, for
/// strings, the length array. Uncommitted streams never compare equal.
impl<'b> PartialEq<Stream<'b>> for Stream<'_> {
    fn eq(&self, other: &Stream<'b>) -> bool {
        if !self.is_committed() || !other.is_committed() {
            return false;
        }
        self.ty == other.ty
            && self.elt_width == other.elt_width
            && self.num_elts == other.num_elts
            && self.content().ok() == other.content().ok()
            && self.lens == other.lens
    }
}
