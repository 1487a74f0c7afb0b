use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::cctx::{EdgeId, FnCtx, SelectorCtx};
use crate::error::Result;
use crate::node::NodeId;
use crate::stream::{Stream, TypeMask};

/// A handle to a graph registered in a [`crate::Compressor`].
///
/// A graph composes nodes into a reusable compression strategy that terminates in
/// codecs emitting frame bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GraphId(pub(crate) usize);

/// The chooser of a selector graph.
///
/// Invoked with the runtime input and the candidate list, it returns exactly one
/// candidate. It may measure candidates first with [`SelectorCtx::try_graph`].
pub type SelectorFn = Box<
    dyn for<'s, 'a> Fn(&SelectorCtx<'s>, &Stream<'a>, &[GraphId]) -> Result<GraphId>
        + Send
        + Sync,
>;

/// The callback of a function graph.
///
/// Invoked with one edge per input stream, it imperatively routes every edge: either
/// through nodes with [`FnCtx::run_node`], or to a downstream graph with
/// [`FnCtx::set_destination`].
pub type FunctionFn = Box<
    dyn for<'x, 'c, 'a> Fn(&mut FnCtx<'x, 'c, 'a>, &[EdgeId]) -> Result<()> + Send + Sync,
>;

pub(crate) enum GraphKind {
    Static {
        head: NodeId,
        successors: Vec<GraphId>,
    },
    Selector {
        input_mask: TypeMask,
        chooser: SelectorFn,
        candidates: Vec<GraphId>,
    },
    Function {
        input_masks: Vec<TypeMask>,
        run: FunctionFn,
        allowed_nodes: Vec<NodeId>,
        allowed_graphs: Vec<GraphId>,
    },
}

pub(crate) struct GraphEntry {
    pub name: String,
    pub kind: GraphKind,
}

impl core::fmt::Debug for GraphEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let variant = match self.kind {
            GraphKind::Static { .. } => "Static",
            GraphKind::Selector { .. } => "Selector",
            GraphKind::Function { .. } => "Function",
        };
        f.debug_struct("GraphEntry")
            .field("name", &self.name)
            .field("kind", &variant)
            .finish()
    }
}
