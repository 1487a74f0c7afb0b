use alloc::boxed::Box;

/// A `Result` alias where the `Err` case is `zlgraph::Error`.
pub type Result<T> = core::result::Result<T, Error>;

/// The errors that may occur when working with this crate.
#[derive(Debug)]
pub struct Error {
    kind: Kind,
}

impl Error {
    /// An error raised by a custom encoder or decoder.
    ///
    /// Custom codec implementations use this to surface their own failures. The engine
    /// reports them as transform execution failures.
    pub fn transform<E>(err: E) -> Self
    where
        E: Into<Box<dyn core::error::Error + Send + Sync>>,
    {
        Self {
            kind: Kind::Transform(err.into()),
        }
    }

    /// Returns true if the error origins from a custom encoder or decoder.
    pub fn is_transform_execution_failure(&self) -> bool {
        matches!(self.kind, Kind::Transform(_))
    }

    pub(crate) fn allocation() -> Self {
        Self {
            kind: Kind::Allocation,
        }
    }

    /// Returns true if the error origins from memory exhaustion or an exceeded capacity.
    pub fn is_allocation(&self) -> bool {
        matches!(self.kind, Kind::Allocation)
    }

    pub(crate) fn logic(msg: &'static str) -> Self {
        Self {
            kind: Kind::Logic(msg),
        }
    }

    /// Returns true if the error origins from incorrect API usage.
    pub fn is_logic_error(&self) -> bool {
        matches!(self.kind, Kind::Logic(_))
    }

    pub(crate) fn graph_type_mismatch() -> Self {
        Self {
            kind: Kind::GraphTypeMismatch,
        }
    }

    /// Returns true if incompatible stream types were attached during graph construction.
    pub fn is_graph_type_mismatch(&self) -> bool {
        matches!(self.kind, Kind::GraphTypeMismatch)
    }

    pub(crate) fn node_invalid_input(msg: &'static str) -> Self {
        Self {
            kind: Kind::NodeInvalidInput(msg),
        }
    }

    /// Returns true if a codec received the wrong number or type of inputs at runtime.
    pub fn is_node_invalid_input(&self) -> bool {
        matches!(self.kind, Kind::NodeInvalidInput(_))
    }

    pub(crate) fn codec_execution(msg: &'static str) -> Self {
        Self {
            kind: Kind::CodecExecution(msg),
        }
    }

    /// Returns true if a codec failed internally or violated its declared contract.
    pub fn is_codec_execution_failure(&self) -> bool {
        matches!(self.kind, Kind::CodecExecution(_))
    }

    pub(crate) fn unknown_codec(id: u32) -> Self {
        Self {
            kind: Kind::UnknownCodec(id),
        }
    }

    /// Returns true if a codec ID was not found in the registry.
    pub fn is_unknown_codec(&self) -> bool {
        matches!(self.kind, Kind::UnknownCodec(_))
    }

    pub(crate) fn corruption(msg: &'static str) -> Self {
        Self {
            kind: Kind::Corruption(msg),
        }
    }

    /// Returns true if a frame is structurally invalid or a checksum does not match.
    pub fn is_corruption(&self) -> bool {
        matches!(self.kind, Kind::Corruption(_))
    }

    pub(crate) fn unsupported_version(version: u32) -> Self {
        Self {
            kind: Kind::UnsupportedVersion(version),
        }
    }

    /// Returns true if a frame format version is outside the supported range.
    pub fn is_unsupported_version(&self) -> bool {
        matches!(self.kind, Kind::UnsupportedVersion(_))
    }

    // Downgradable to a store fallback under permissive compression.
    pub(crate) fn is_soft(&self) -> bool {
        matches!(
            self.kind,
            Kind::CodecExecution(_) | Kind::Transform(_) | Kind::NodeInvalidInput(_)
        )
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.kind {
            Kind::Allocation => f.write_str("allocation failed or capacity exceeded"),
            Kind::Logic(msg) => write!(f, "logic error: {msg}"),
            Kind::GraphTypeMismatch => f.write_str("incompatible stream types in graph"),
            Kind::NodeInvalidInput(msg) => write!(f, "invalid node input: {msg}"),
            Kind::CodecExecution(msg) => write!(f, "codec execution failed: {msg}"),
            Kind::UnknownCodec(id) => write!(f, "unknown codec id {id}"),
            Kind::Corruption(msg) => write!(f, "corrupted frame: {msg}"),
            Kind::UnsupportedVersion(v) => write!(f, "unsupported format version {v}"),
            Kind::Transform(err) => write!(f, "transform execution failed: {err}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<core::num::TryFromIntError> for Error {
    fn from(_: core::num::TryFromIntError) -> Self {
        Self {
            kind: Kind::Corruption("integer field out of range"),
        }
    }
}

enum Kind {
    /// Out of memory, or a size exceeded a reserved capacity.
    Allocation,
    /// The caller used the API incorrectly.
    Logic(&'static str),
    /// Incompatible types were attached during graph construction.
    GraphTypeMismatch,
    /// A codec received the wrong number or type of inputs at runtime.
    NodeInvalidInput(&'static str),
    /// A codec failed internally or violated its contract.
    CodecExecution(&'static str),
    /// A codec ID is missing from the registry.
    UnknownCodec(u32),
    /// The frame is structurally invalid or a checksum mismatched.
    Corruption(&'static str),
    /// The frame format version is outside the supported range.
    UnsupportedVersion(u32),
    /// An error from a custom encoder or decoder.
    Transform(Box<dyn core::error::Error + Send + Sync>),
}

impl core::fmt::Debug for Kind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Allocation => write!(f, "Allocation"),
            Self::Logic(msg) => f.debug_tuple("Logic").field(msg).finish(),
            Self::GraphTypeMismatch => write!(f, "GraphTypeMismatch"),
            Self::NodeInvalidInput(msg) => f.debug_tuple("NodeInvalidInput").field(msg).finish(),
            Self::CodecExecution(msg) => f.debug_tuple("CodecExecution").field(msg).finish(),
            Self::UnknownCodec(id) => f.debug_tuple("UnknownCodec").field(id).finish(),
            Self::Corruption(msg) => f.debug_tuple("Corruption").field(msg).finish(),
            Self::UnsupportedVersion(v) => f.debug_tuple("UnsupportedVersion").field(v).finish(),
            Self::Transform(err) => f.debug_tuple("Transform").field(err).finish(),
        }
    }
}
