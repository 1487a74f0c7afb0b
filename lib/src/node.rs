use alloc::string::String;

use crate::codec::CodecId;
use crate::params::LocalParams;

/// A handle to a node registered in a [`crate::Compressor`].
///
/// A node binds one registered codec to local parameters and a diagnostic name.
/// Cloned nodes share the codec id of their base and differ only in parameters and
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug)]
pub(crate) struct NodeEntry {
    pub codec: CodecId,
    pub params: LocalParams,
    pub name: String,
}
