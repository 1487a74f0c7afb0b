use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;

use crate::codec::EncodeCtx;
use crate::compressor::{self, Compressor, StandardGraph, StandardNode};
use crate::error::{Error, Result};
use crate::frame::{self, FrameWriter, InputDesc, Invocation};
use crate::graph::{GraphId, GraphKind};
use crate::node::NodeId;
use crate::params::{CParam, CParams};
use crate::stream::Stream;

/// A compression context.
///
/// Holds the global parameters of compression calls. A context is cheap and reusable;
/// parameters are sticky only when [`CParam::StickyParameters`] is set, otherwise they
/// reset to defaults after every call.
///
/// # Examples
///
/// ```
/// use zlgraph::{CCtx, CParam, Compressor, StandardGraph, Stream};
///
/// let mut compressor = Compressor::new();
/// let generic = compressor.standard_graph(StandardGraph::Generic);
/// compressor.set_start(generic);
///
/// let mut cctx = CCtx::new();
/// cctx.set_parameter(CParam::CompressionLevel(7))?;
/// cctx.set_parameter(CParam::ContentChecksum(true))?;
///
/// let frame = cctx.compress(&compressor, &[Stream::ref_serial(b"hello world")])?;
/// # assert!(!frame.is_empty());
/// # Ok::<(), zlgraph::Error>(())
/// ```
pub struct CCtx {
    params: CParams,
}

impl Default for CCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl CCtx {
    /// Creates a compression context with default parameters.
    pub fn new() -> Self {
        Self {
            params: CParams::default(),
        }
    }

    /// Sets a global parameter.
    ///
    /// # Errors
    ///
    /// Fails with `unsupported_version` if a format version outside the supported
    /// range is requested.
    pub fn set_parameter(&mut self, param: CParam) -> Result<()> {
        self.params.apply(param)
    }

    /// Resets all parameters to their defaults.
    pub fn reset_parameters(&mut self) {
        self.params = CParams::default();
    }

    /// Compresses `inputs` into a single frame by executing the compressor's starting
    /// graph.
    ///
    /// All inputs must be committed. The produced frame is self-describing: a
    /// [`crate::DCtx`] replays it without access to the compressor.
    ///
    /// # Errors
    ///
    /// Fails without side effects if the graph walk or any codec fails; the
    /// originating error kind is preserved.
    pub fn compress(&mut self, compressor: &Compressor, inputs: &[Stream<'_>]) -> Result<Vec<u8>> {
        let result = run_compression(compressor, &self.params, inputs);
        if !self.params.sticky {
            self.params = CParams::default();
        }
        result
    }

    /// Compresses `inputs` into `dst`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// As [`Self::compress`]; additionally fails with an allocation error if `dst` is
    /// too small for the frame.
    pub fn compress_into(
        &mut self,
        dst: &mut [u8],
        compressor: &Compressor,
        inputs: &[Stream<'_>],
    ) -> Result<usize> {
        let frame = self.compress(compressor, inputs)?;
        if frame.len() > dst.len() {
            return Err(Error::allocation());
        }
        dst[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }
}

fn run_compression<'c, 'a>(
    compressor: &'c Compressor,
    params: &'c CParams,
    inputs: &'c [Stream<'a>],
) -> Result<Vec<u8>> {
    params.validate()?;
    let start = compressor
        .start()
        .ok_or_else(|| Error::logic("no starting graph designated"))?;
    run_with_start(compressor, params, inputs, start)
}

fn run_with_start<'c, 'a>(
    compressor: &'c Compressor,
    params: &'c CParams,
    inputs: &'c [Stream<'a>],
    start: GraphId,
) -> Result<Vec<u8>> {
    if inputs.is_empty() {
        return Err(Error::logic("at least one input is required"));
    }

    let mut descs = Vec::with_capacity(inputs.len());
    for input in inputs {
        descs.push(InputDesc::of_stream(input)?);
    }
    let content_checksum = if params.content_checksum {
        let refs: Vec<&Stream<'_>> = inputs.iter().collect();
        Some(frame::content_checksum(&refs)?)
    } else {
        None
    };

    let mut exec = Exec::new(compressor, params);
    exec.run(inputs, start)?;

    Ok(FrameWriter {
        version: params.format_version,
        content_checksum,
        compressed_checksum: params.compressed_checksum,
    }
    .write(&descs, &exec.trace, &exec.headers, &exec.blobs))
}

// A stream handle of the execution: either one of the caller's input streams or an
// intermediate produced by a codec.
enum Handle<'c, 'a> {
    Input(&'c Stream<'a>),
    Owned(Rc<Stream<'a>>),
}

impl<'a> Handle<'_, 'a> {
    fn stream(&self) -> &Stream<'a> {
        match self {
            Handle::Input(stream) => stream,
            Handle::Owned(stream) => stream.as_ref(),
        }
    }
}

struct WorkItem {
    streams: Vec<u32>,
    graph: GraphId,
}

// The per-call execution state: the stream table (all intermediates live here and
// drop with the call), the recorded trace and the emitted headers and blobs.
struct Exec<'c, 'a> {
    compressor: &'c Compressor,
    params: &'c CParams,
    streams: Vec<Handle<'c, 'a>>,
    consumed: Vec<bool>,
    trace: Vec<Invocation>,
    headers: Vec<Vec<u8>>,
    blobs: Vec<Vec<u8>>,
    work: Vec<WorkItem>,
}

impl<'c, 'a> Exec<'c, 'a> {
    fn new(compressor: &'c Compressor, params: &'c CParams) -> Self {
        Self {
            compressor,
            params,
            streams: Vec::new(),
            consumed: Vec::new(),
            trace: Vec::new(),
            headers: Vec::new(),
            blobs: Vec::new(),
            work: Vec::new(),
        }
    }

    fn run(&mut self, inputs: &'c [Stream<'a>], start: GraphId) -> Result<()> {
        for input in inputs {
            input.num_elts()?;
            self.streams.push(Handle::Input(input));
            self.consumed.push(false);
        }
        self.work.push(WorkItem {
            streams: (0..inputs.len() as u32).collect(),
            graph: start,
        });

        while let Some(item) = self.work.pop() {
            self.dispatch(item)?;
        }

        if self.consumed.iter().any(|consumed| !consumed) {
            return Err(Error::logic("a stream was not routed to a terminal codec"));
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn dispatch(&mut self, mut item: WorkItem) -> Result<()> {
        let compressor = self.compressor;
        let store = compressor.standard_graph(StandardGraph::Store);

        // Tiny streams are not worth a transform chain
        if self.params.min_stream_size > 0 && item.graph != store {
            let all_small = item.streams.iter().try_fold(true, |all, id| {
                let size = self.streams[*id as usize].stream().content_size()?;
                Ok::<_, Error>(all && (size as u64) < self.params.min_stream_size)
            })?;
            if all_small {
                item.graph = store;
            }
        }

        match &compressor.graph_entry(item.graph)?.kind {
            GraphKind::Static { head, successors } => {
                let shape = compressor.encoder(compressor.node_entry(*head)?.codec)?.shape();
                if item.streams.len() > 1 && !shape.accepts_input_count(item.streams.len()) {
                    // A single-stream head applied to a multi-stream item maps over
                    // the streams, in order
                    if shape.inputs.len() == 1 && !shape.last_input_variadic {
                        for id in item.streams.iter().rev() {
                            self.work.push(WorkItem {
                                streams: vec![*id],
                                graph: item.graph,
                            });
                        }
                        return Ok(());
                    }
                }
                self.run_static(*head, successors, &item.streams)
            }
            GraphKind::Selector {
                input_mask,
                chooser,
                candidates,
            } => {
                if item.streams.len() > 1 {
                    for id in item.streams.iter().rev() {
                        self.work.push(WorkItem {
                            streams: vec![*id],
                            graph: item.graph,
                        });
                    }
                    return Ok(());
                }

                let id = item.streams[0];
                let choice = {
                    let stream = self.streams[id as usize].stream();
                    if !input_mask.contains(stream.stream_type()) {
                        return Err(Error::node_invalid_input("type not accepted by selector"));
                    }
                    let ctx = SelectorCtx {
                        compressor,
                        params: self.params,
                    };
                    chooser(&ctx, stream, candidates.as_slice())?
                };
                if !candidates.contains(&choice) {
                    return Err(Error::logic("selector chose a graph outside its candidates"));
                }
                self.work.push(WorkItem {
                    streams: vec![id],
                    graph: choice,
                });
                Ok(())
            }
            GraphKind::Function {
                input_masks,
                run,
                allowed_nodes,
                allowed_graphs,
            } => {
                if item.streams.len() != input_masks.len() {
                    return Err(Error::node_invalid_input("input count of function graph"));
                }
                for (slot, id) in item.streams.iter().enumerate() {
                    let ty = self.streams[*id as usize].stream().stream_type();
                    if !input_masks[slot].contains(ty) {
                        return Err(Error::node_invalid_input("type not accepted by function graph"));
                    }
                }

                let edges: Vec<EdgeId> = item.streams.iter().map(|id| EdgeId(*id)).collect();
                let mut ctx = FnCtx {
                    exec: &mut *self,
                    allowed_nodes,
                    allowed_graphs,
                    pending: Vec::new(),
                    touched: item.streams.clone(),
                };
                run(&mut ctx, edges.as_slice())?;
                let FnCtx {
                    pending, touched, ..
                } = ctx;

                for id in &touched {
                    if !self.consumed[*id as usize] && !pending.iter().any(|(p, _)| p == id) {
                        return Err(Error::logic("function graph left an edge unrouted"));
                    }
                }
                for (id, graph) in pending.into_iter().rev() {
                    self.work.push(WorkItem {
                        streams: vec![id],
                        graph,
                    });
                }
                Ok(())
            }
        }
    }

    fn run_static(
        &mut self,
        head: NodeId,
        successors: &[GraphId],
        stream_ids: &[u32],
    ) -> Result<()> {
        let store_node = self.compressor.standard_node(StandardNode::Store);
        let out_ids = match self.run_node(head, stream_ids) {
            Ok(out_ids) => out_ids,
            // Soft encoder failures downgrade to a store fallback in permissive mode
            Err(err) if self.params.permissive && err.is_soft() && head != store_node => {
                self.run_node(store_node, stream_ids)?;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let shape = self
            .compressor
            .encoder(self.compressor.node_entry(head)?.codec)?
            .shape();
        let singletons = shape.singleton_outputs.len();
        for (idx, id) in out_ids.iter().enumerate().rev() {
            let successor = if idx < singletons {
                successors[idx]
            } else {
                *successors.last().expect("variable outputs imply a successor")
            };
            self.work.push(WorkItem {
                streams: vec![*id],
                graph: successor,
            });
        }
        Ok(())
    }

    // Executes one codec eagerly: type-checks the inputs, runs the encoder, records
    // the invocation and returns the ids of the produced streams.
    fn run_node(&mut self, node: NodeId, stream_ids: &[u32]) -> Result<Vec<u32>> {
        let compressor = self.compressor;
        let entry = compressor.node_entry(node)?;
        let desc = compressor.encoder(entry.codec)?;
        let shape = desc.shape();

        if !shape.accepts_input_count(stream_ids.len()) {
            return Err(Error::node_invalid_input("wrong number of inputs"));
        }

        let (outputs, header, blobs) = {
            let mut refs: Vec<&Stream<'a>> = Vec::with_capacity(stream_ids.len());
            for (slot, id) in stream_ids.iter().enumerate() {
                if self.consumed[*id as usize] {
                    return Err(Error::logic("stream consumed twice"));
                }
                let stream = self.streams[*id as usize].stream();
                if !shape.input_mask(slot).contains(stream.stream_type()) {
                    return Err(Error::node_invalid_input("type not accepted by codec"));
                }
                refs.push(stream);
            }

            let mut ctx = EncodeCtx::new(shape, entry.params.clone(), self.params);
            desc.run(&mut ctx, &refs)?;
            ctx.finish(refs.len())?
        };

        for id in stream_ids {
            self.consumed[*id as usize] = true;
        }

        let mut out_ids = Vec::with_capacity(outputs.len());
        for output in outputs {
            out_ids.push(self.streams.len() as u32);
            self.streams.push(Handle::Owned(Rc::new(output)));
            self.consumed.push(false);
        }

        self.trace.push(Invocation {
            codec: entry.codec.0,
            inputs: stream_ids.to_vec(),
            outputs: out_ids.clone(),
        });
        self.headers.push(header);
        self.blobs.extend(blobs);

        Ok(out_ids)
    }
}

/// The environment available to a selector's chooser.
pub struct SelectorCtx<'s> {
    compressor: &'s Compressor,
    params: &'s CParams,
}

impl SelectorCtx<'_> {
    /// Trial-compresses `input` through `graph` and returns the produced frame size.
    ///
    /// The trial runs to completion on scratch state; it has no effect on the
    /// surrounding compression. A failing candidate returns its error as a signal and
    /// never aborts the parent call.
    ///
    /// # Errors
    ///
    /// Propagates whatever the trial compression fails with.
    pub fn try_graph(&self, input: &Stream<'_>, graph: GraphId) -> Result<usize> {
        let copy = input.duplicate()?;
        let inputs = [copy];
        let frame = run_with_start(self.compressor, self.params, &inputs, graph)?;
        Ok(frame.len())
    }

    /// The global compression level.
    pub fn compression_level(&self) -> i32 {
        self.params.compression_level
    }

    /// The format version this frame is compressed at.
    pub fn format_version(&self) -> u32 {
        self.params.format_version
    }
}

/// A handle to one stream flowing through a function graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeId(u32);

/// The environment available to a function graph's callback.
///
/// The callback receives one [`EdgeId`] per input stream and must route every edge:
/// either through a node with [`Self::run_node`], which yields the node's output
/// edges, or to a downstream graph with [`Self::set_destination`]. Routed work is
/// enqueued and executed by the engine after the callback returns.
pub struct FnCtx<'x, 'c, 'a> {
    exec: &'x mut Exec<'c, 'a>,
    allowed_nodes: &'x [NodeId],
    allowed_graphs: &'x [GraphId],
    pending: Vec<(u32, GraphId)>,
    touched: Vec<u32>,
}

impl<'a> FnCtx<'_, '_, 'a> {
    /// The preregistered node for a standard codec.
    pub fn standard_node(&self, node: StandardNode) -> NodeId {
        self.exec.compressor.standard_node(node)
    }

    /// The preregistered single-node graph for a standard terminal codec.
    pub fn standard_graph(&self, graph: StandardGraph) -> GraphId {
        self.exec.compressor.standard_graph(graph)
    }

    /// The stream behind an edge, for inspection.
    ///
    /// # Errors
    ///
    /// Fails with a logic error on an unknown edge.
    pub fn stream(&self, edge: EdgeId) -> Result<&Stream<'a>> {
        self.exec
            .streams
            .get(edge.0 as usize)
            .map(Handle::stream)
            .ok_or_else(|| Error::logic("unknown edge"))
    }

    /// Runs `node` on `edges` immediately and returns its output edges.
    ///
    /// Standard nodes are always available; others must be listed in the graph's
    /// allowed nodes.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if the node is not allowed or an edge was already
    /// consumed; codec failures propagate.
    pub fn run_node(&mut self, node: NodeId, edges: &[EdgeId]) -> Result<Vec<EdgeId>> {
        if !compressor::is_standard_node(node) && !self.allowed_nodes.contains(&node) {
            return Err(Error::logic("node not allowed in this function graph"));
        }
        let ids: Vec<u32> = edges.iter().map(|edge| edge.0).collect();
        let out_ids = self.exec.run_node(node, &ids)?;
        self.touched.extend(&out_ids);
        Ok(out_ids.into_iter().map(EdgeId).collect())
    }

    /// Routes an edge to a downstream graph, executed after the callback returns.
    ///
    /// Standard graphs are always available; others must be listed in the graph's
    /// allowed graphs.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if the graph is not allowed or the edge was already
    /// routed.
    pub fn set_destination(&mut self, edge: EdgeId, graph: GraphId) -> Result<()> {
        if !compressor::is_standard_graph(graph) && !self.allowed_graphs.contains(&graph) {
            return Err(Error::logic("graph not allowed in this function graph"));
        }
        if edge.0 as usize >= self.exec.streams.len() {
            return Err(Error::logic("unknown edge"));
        }
        if self.exec.consumed[edge.0 as usize] || self.pending.iter().any(|(id, _)| *id == edge.0)
        {
            return Err(Error::logic("edge already routed"));
        }
        self.pending.push((edge.0, graph));
        Ok(())
    }
}
