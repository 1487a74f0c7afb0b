use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::cctx::SelectorCtx;
use crate::codec::{CUSTOM_CODEC_ID_BASE, CodecId, EncoderDesc, EncoderRegistry};
use crate::codecs;
use crate::error::{Error, Result};
use crate::frame::{Reader, write_varint};
use crate::graph::{FunctionFn, GraphEntry, GraphId, GraphKind, SelectorFn};
use crate::node::{NodeEntry, NodeId};
use crate::params::LocalParams;
use crate::stream::{Stream, TypeMask};

/// The standard nodes preregistered in every [`Compressor`], one per standard codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardNode {
    Store,
    Generic,
    Entropy,
    FieldLz,
    Constant,
    Delta,
    Bitpack,
    TransposeSplit,
    Tokenize,
    Prefix,
    Varint,
}

/// The standard single-node graphs preregistered in every [`Compressor`], one per
/// terminal codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardGraph {
    Store,
    Generic,
    Entropy,
    FieldLz,
    Constant,
}

const NUM_STANDARD_NODES: usize = 11;
const NUM_STANDARD_GRAPHS: usize = 5;

const DESCRIPTION_MAGIC: &[u8; 4] = b"ZLCD";
const DESCRIPTION_VERSION: u64 = 1;

/// The registry holding all nodes, all graphs and the designated starting graph.
///
/// A compressor is built once and may then be shared read-only between any number of
/// compression contexts; registration and compression must not race on the same
/// instance.
///
/// # Examples
///
/// ```
/// use zlgraph::{CCtx, Compressor, DCtx, StandardGraph, Stream};
///
/// let mut compressor = Compressor::new();
/// let generic = compressor.standard_graph(StandardGraph::Generic);
/// compressor.set_start(generic);
///
/// let input = Stream::ref_serial(b"hello world hello world");
/// let frame = CCtx::new().compress(&compressor, &[input])?;
///
/// let outputs = DCtx::new().decompress(&frame)?;
/// assert_eq!(outputs[0].content()?, b"hello world hello world");
/// # Ok::<(), zlgraph::Error>(())
/// ```
pub struct Compressor {
    encoders: EncoderRegistry,
    nodes: Vec<NodeEntry>,
    graphs: Vec<GraphEntry>,
    node_names: BTreeSet<String>,
    graph_names: BTreeSet<String>,
    start: Option<GraphId>,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor {
    /// Creates a compressor with the standard codec set preregistered.
    #[allow(clippy::missing_panics_doc)]
    pub fn new() -> Self {
        let mut compressor = Self {
            encoders: EncoderRegistry::default(),
            nodes: Vec::new(),
            graphs: Vec::new(),
            node_names: BTreeSet::new(),
            graph_names: BTreeSet::new(),
            start: None,
        };

        for desc in codecs::standard_encoders() {
            let id = desc.id();
            let name = desc.name().to_string();
            compressor
                .encoders
                .register(desc)
                .expect("standard codec ids are unique");
            compressor
                .insert_node_raw(&name, id, LocalParams::new())
                .expect("standard node names are unique");
        }
        debug_assert_eq!(compressor.nodes.len(), NUM_STANDARD_NODES);

        for node in [
            StandardNode::Store,
            StandardNode::Generic,
            StandardNode::Entropy,
            StandardNode::FieldLz,
            StandardNode::Constant,
        ] {
            let head = compressor.standard_node(node);
            let name = compressor.nodes[head.0].name.clone();
            compressor
                .insert_graph_raw(
                    &name,
                    GraphKind::Static {
                        head,
                        successors: Vec::new(),
                    },
                )
                .expect("standard graph names are unique");
        }
        debug_assert_eq!(compressor.graphs.len(), NUM_STANDARD_GRAPHS);

        compressor
    }

    /// The preregistered node for a standard codec.
    pub fn standard_node(&self, node: StandardNode) -> NodeId {
        debug_assert!(self.nodes.len() >= NUM_STANDARD_NODES);
        NodeId(node as usize)
    }

    /// The preregistered single-node graph for a standard terminal codec.
    pub fn standard_graph(&self, graph: StandardGraph) -> GraphId {
        debug_assert!(self.graphs.len() >= NUM_STANDARD_GRAPHS);
        GraphId(graph as usize)
    }

    /// Designates the graph every compression call starts at.
    pub fn set_start(&mut self, graph: GraphId) {
        self.start = Some(graph);
    }

    /// The designated starting graph.
    pub fn start(&self) -> Option<GraphId> {
        self.start
    }

    /// Registers a custom encoder and returns the node bound to it.
    ///
    /// The codec id becomes wire-format identity: the matching decoder must be
    /// registered under the same id in every decompression context that reads the
    /// produced frames.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if the id is below [`CUSTOM_CODEC_ID_BASE`] or
    /// collides with a codec of a different shape.
    pub fn register_custom_encoder(&mut self, desc: EncoderDesc) -> Result<NodeId> {
        if desc.id().0 < CUSTOM_CODEC_ID_BASE {
            return Err(Error::logic("custom codec ids start at CUSTOM_CODEC_ID_BASE"));
        }
        let id = desc.id();
        let name = desc.name().to_string();
        self.encoders.register(desc)?;
        self.register_node(&name, id, LocalParams::new())
    }

    /// Clones `base` with new local parameters. The clone shares the codec id of its
    /// base and gets a disambiguated name.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if `base` is unknown.
    pub fn clone_node(&mut self, base: NodeId, params: LocalParams) -> Result<NodeId> {
        let name = self.node_entry(base)?.name.clone();
        self.clone_node_named(base, &name, params)
    }

    /// Clones `base` with new local parameters and the given name.
    ///
    /// The clone inherits the base's parameters; `params` overrides any subset.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if `base` is unknown or an anchor name is taken.
    pub fn clone_node_named(
        &mut self,
        base: NodeId,
        name: &str,
        params: LocalParams,
    ) -> Result<NodeId> {
        let entry = self.node_entry(base)?;
        let codec = entry.codec;
        let mut merged = entry.params.clone();
        merged.merge_from(&params);
        self.register_node(name, codec, merged)
    }

    fn register_node(&mut self, name: &str, codec: CodecId, params: LocalParams) -> Result<NodeId> {
        let name = intern_name(&mut self.node_names, name)?;
        self.nodes.push(NodeEntry {
            codec,
            params,
            name,
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    // Inserts with the exact name, used for the standard set and deserialization.
    fn insert_node_raw(&mut self, name: &str, codec: CodecId, params: LocalParams) -> Result<NodeId> {
        if !self.node_names.insert(name.to_string()) {
            return Err(Error::logic("node name already taken"));
        }
        self.nodes.push(NodeEntry {
            codec,
            params,
            name: name.to_string(),
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    /// Registers a static graph: `head` runs first and its outputs feed `successors`.
    ///
    /// There is one successor per singleton output, plus one final successor applied
    /// to every variable output if the head declares a variable output class.
    ///
    /// # Errors
    ///
    /// Fails with `graph_type_mismatch` if the successor count does not match the
    /// head's output count, or an output type is not accepted by its successor.
    pub fn register_static_graph(
        &mut self,
        name: &str,
        head: NodeId,
        successors: &[GraphId],
    ) -> Result<GraphId> {
        self.validate_static(head, successors)?;
        let name = intern_name(&mut self.graph_names, name)?;
        self.graphs.push(GraphEntry {
            name,
            kind: GraphKind::Static {
                head,
                successors: successors.to_vec(),
            },
        });
        Ok(GraphId(self.graphs.len() - 1))
    }

    /// Registers a selector graph that picks one of `candidates` at runtime.
    ///
    /// # Errors
    ///
    /// Fails with `graph_type_mismatch` if a candidate does not accept every type of
    /// `input_mask`, or with a logic error if `candidates` is empty.
    pub fn register_selector_graph(
        &mut self,
        name: &str,
        input_mask: TypeMask,
        chooser: SelectorFn,
        candidates: &[GraphId],
    ) -> Result<GraphId> {
        if candidates.is_empty() {
            return Err(Error::logic("selector graph needs at least one candidate"));
        }
        for candidate in candidates {
            self.check_successor(input_mask, *candidate)?;
        }
        let name = intern_name(&mut self.graph_names, name)?;
        self.graphs.push(GraphEntry {
            name,
            kind: GraphKind::Selector {
                input_mask,
                chooser,
                candidates: candidates.to_vec(),
            },
        });
        Ok(GraphId(self.graphs.len() - 1))
    }

    /// Registers a selector graph that trial-compresses every candidate and picks the
    /// one producing the smallest frame. Failing candidates are skipped.
    ///
    /// # Errors
    ///
    /// As [`Self::register_selector_graph`].
    pub fn register_brute_force(
        &mut self,
        name: &str,
        input_mask: TypeMask,
        candidates: &[GraphId],
    ) -> Result<GraphId> {
        self.register_selector_graph(name, input_mask, Box::new(brute_force_choose), candidates)
    }

    /// Registers a function graph whose callback routes each input edge imperatively.
    ///
    /// The callback may run the standard nodes and route to the standard graphs, plus
    /// anything listed in `allowed_nodes` and `allowed_graphs`.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if an allowed id is unknown or `input_masks` is empty.
    pub fn register_function_graph(
        &mut self,
        name: &str,
        input_masks: &[TypeMask],
        run: FunctionFn,
        allowed_nodes: &[NodeId],
        allowed_graphs: &[GraphId],
    ) -> Result<GraphId> {
        if input_masks.is_empty() {
            return Err(Error::logic("function graph needs at least one input"));
        }
        for node in allowed_nodes {
            self.node_entry(*node)?;
        }
        for graph in allowed_graphs {
            self.graph_entry(*graph)?;
        }
        let name = intern_name(&mut self.graph_names, name)?;
        self.graphs.push(GraphEntry {
            name,
            kind: GraphKind::Function {
                input_masks: input_masks.to_vec(),
                run,
                allowed_nodes: allowed_nodes.to_vec(),
                allowed_graphs: allowed_graphs.to_vec(),
            },
        });
        Ok(GraphId(self.graphs.len() - 1))
    }

    fn insert_graph_raw(&mut self, name: &str, kind: GraphKind) -> Result<GraphId> {
        if !self.graph_names.insert(name.to_string()) {
            return Err(Error::logic("graph name already taken"));
        }
        self.graphs.push(GraphEntry {
            name: name.to_string(),
            kind,
        });
        Ok(GraphId(self.graphs.len() - 1))
    }

    fn validate_static(&self, head: NodeId, successors: &[GraphId]) -> Result<()> {
        let entry = self.node_entry(head)?;
        let shape = self.encoders.get(entry.codec)?.shape();

        let expected = if shape.terminal {
            0
        } else {
            shape.singleton_outputs.len() + usize::from(shape.variable_output.is_some())
        };
        if successors.len() != expected {
            return Err(Error::graph_type_mismatch());
        }

        for (idx, out_mask) in shape.singleton_outputs.iter().enumerate() {
            self.check_successor(*out_mask, successors[idx])?;
        }
        if let Some(out_mask) = shape.variable_output {
            let last = *successors.last().expect("arity checked above");
            self.check_successor(out_mask, last)?;
        }
        Ok(())
    }

    // Every type the producer can emit must be accepted by the successor.
    fn check_successor(&self, out_mask: TypeMask, successor: GraphId) -> Result<()> {
        let accepted = self.graph_input_mask(successor, 0)?;
        if out_mask.bits() & accepted.bits() == out_mask.bits() {
            Ok(())
        } else {
            Err(Error::graph_type_mismatch())
        }
    }

    pub(crate) fn graph_input_mask(&self, graph: GraphId, slot: usize) -> Result<TypeMask> {
        match &self.graph_entry(graph)?.kind {
            GraphKind::Static { head, .. } => {
                let entry = self.node_entry(*head)?;
                Ok(self.encoders.get(entry.codec)?.shape().input_mask(slot))
            }
            GraphKind::Selector { input_mask, .. } => Ok(*input_mask),
            GraphKind::Function { input_masks, .. } => Ok(input_masks[slot.min(input_masks.len() - 1)]),
        }
    }

    /// Looks up a node by name.
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    /// Looks up a graph by name.
    pub fn graph_by_name(&self, name: &str) -> Option<GraphId> {
        self.graphs.iter().position(|g| g.name == name).map(GraphId)
    }

    /// The diagnostic name of a node.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if `node` is unknown.
    pub fn node_name(&self, node: NodeId) -> Result<&str> {
        Ok(&self.node_entry(node)?.name)
    }

    /// The diagnostic name of a graph.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if `graph` is unknown.
    pub fn graph_name(&self, graph: GraphId) -> Result<&str> {
        Ok(&self.graph_entry(graph)?.name)
    }

    /// The codec id a node is bound to.
    ///
    /// # Errors
    ///
    /// Fails with a logic error if `node` is unknown.
    pub fn node_codec(&self, node: NodeId) -> Result<CodecId> {
        Ok(self.node_entry(node)?.codec)
    }

    /// Enumerates all registered nodes.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Enumerates all registered graphs.
    pub fn graphs(&self) -> impl Iterator<Item = GraphId> + '_ {
        (0..self.graphs.len()).map(GraphId)
    }

    pub(crate) fn node_entry(&self, node: NodeId) -> Result<&NodeEntry> {
        self.nodes
            .get(node.0)
            .ok_or_else(|| Error::logic("unknown node id"))
    }

    pub(crate) fn graph_entry(&self, graph: GraphId) -> Result<&GraphEntry> {
        self.graphs
            .get(graph.0)
            .ok_or_else(|| Error::logic("unknown graph id"))
    }

    pub(crate) fn encoder(&self, id: CodecId) -> Result<&EncoderDesc> {
        self.encoders.get(id)
    }

    /// Serializes this compressor into a portable binary description.
    ///
    /// Selector and function graphs are recorded by name; custom codecs by id. The
    /// consumer resolves both from the [`Extensions`] passed to
    /// [`Self::deserialize`].
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(DESCRIPTION_MAGIC);
        write_varint(&mut out, DESCRIPTION_VERSION);
        write_varint(&mut out, NUM_STANDARD_NODES as u64);
        write_varint(&mut out, NUM_STANDARD_GRAPHS as u64);

        let custom_ids: BTreeSet<u32> = self
            .nodes
            .iter()
            .filter(|n| n.codec.0 >= CUSTOM_CODEC_ID_BASE)
            .map(|n| n.codec.0)
            .collect();
        write_varint(&mut out, custom_ids.len() as u64);
        for id in &custom_ids {
            write_varint(&mut out, u64::from(*id));
        }

        write_varint(&mut out, (self.nodes.len() - NUM_STANDARD_NODES) as u64);
        for node in &self.nodes[NUM_STANDARD_NODES..] {
            write_varint(&mut out, u64::from(node.codec.0));
            write_string(&mut out, &node.name);
            write_local_params(&mut out, &node.params);
        }

        write_varint(&mut out, (self.graphs.len() - NUM_STANDARD_GRAPHS) as u64);
        for graph in &self.graphs[NUM_STANDARD_GRAPHS..] {
            write_string(&mut out, &graph.name);
            match &graph.kind {
                GraphKind::Static { head, successors } => {
                    out.push(0);
                    write_varint(&mut out, head.0 as u64);
                    write_varint(&mut out, successors.len() as u64);
                    for succ in successors {
                        write_varint(&mut out, succ.0 as u64);
                    }
                }
                GraphKind::Selector {
                    input_mask,
                    candidates,
                    ..
                } => {
                    out.push(1);
                    out.push(input_mask.bits());
                    write_varint(&mut out, candidates.len() as u64);
                    for candidate in candidates {
                        write_varint(&mut out, candidate.0 as u64);
                    }
                }
                GraphKind::Function {
                    input_masks,
                    allowed_nodes,
                    allowed_graphs,
                    ..
                } => {
                    out.push(2);
                    write_varint(&mut out, input_masks.len() as u64);
                    for mask in input_masks {
                        out.push(mask.bits());
                    }
                    write_varint(&mut out, allowed_nodes.len() as u64);
                    for node in allowed_nodes {
                        write_varint(&mut out, node.0 as u64);
                    }
                    write_varint(&mut out, allowed_graphs.len() as u64);
                    for graph in allowed_graphs {
                        write_varint(&mut out, graph.0 as u64);
                    }
                }
            }
        }

        write_varint(&mut out, self.start.map_or(0, |g| g.0 as u64 + 1));
        out
    }

    /// Deserializes a compressor description.
    ///
    /// `extensions` supplies everything the description declares but cannot carry:
    /// custom encoders by codec id, and selector/function callbacks by graph name.
    ///
    /// # Errors
    ///
    /// Fails with `unknown_codec` if a declared custom codec is missing from
    /// `extensions`, with a logic error if a callback is missing, or with `corruption`
    /// if the description is malformed.
    #[allow(clippy::too_many_lines)]
    pub fn deserialize(bytes: &[u8], extensions: Extensions) -> Result<Self> {
        let mut ext = extensions;
        let mut reader = Reader::new(bytes);
        if reader.bytes(4)? != DESCRIPTION_MAGIC {
            return Err(Error::corruption("bad description magic"));
        }
        if reader.varint()? != DESCRIPTION_VERSION {
            return Err(Error::corruption("unknown description version"));
        }
        if reader.varint()? != NUM_STANDARD_NODES as u64
            || reader.varint()? != NUM_STANDARD_GRAPHS as u64
        {
            return Err(Error::corruption("standard set mismatch"));
        }

        let mut compressor = Self::new();

        let num_custom = reader.len()?;
        for _ in 0..num_custom {
            let id = u32::try_from(reader.varint()?)
                .map_err(|_| Error::corruption("codec id out of range"))?;
            let desc = ext
                .encoders
                .remove(&id)
                .ok_or_else(|| Error::unknown_codec(id))?;
            compressor.encoders.register(desc)?;
        }

        let num_nodes = reader.len()?;
        for _ in 0..num_nodes {
            let codec = CodecId(
                u32::try_from(reader.varint()?)
                    .map_err(|_| Error::corruption("codec id out of range"))?,
            );
            let name = read_string(&mut reader)?;
            let params = read_local_params(&mut reader)?;
            if !compressor.encoders.contains(codec) {
                return Err(Error::unknown_codec(codec.0));
            }
            compressor.insert_node_raw(&name, codec, params)?;
        }

        let num_graphs = reader.len()?;
        for _ in 0..num_graphs {
            let name = read_string(&mut reader)?;
            let kind = match reader.u8()? {
                0 => {
                    let head = NodeId(usize::try_from(reader.varint()?)?);
                    let num_succ = reader.len()?;
                    let mut successors = Vec::with_capacity(num_succ);
                    for _ in 0..num_succ {
                        successors.push(GraphId(usize::try_from(reader.varint()?)?));
                    }
                    compressor.validate_static(head, &successors)?;
                    GraphKind::Static { head, successors }
                }
                1 => {
                    let input_mask = TypeMask::from_bits(reader.u8()?)?;
                    let num_candidates = reader.len()?;
                    let mut candidates = Vec::with_capacity(num_candidates);
                    for _ in 0..num_candidates {
                        candidates.push(GraphId(usize::try_from(reader.varint()?)?));
                    }
                    for candidate in &candidates {
                        compressor.check_successor(input_mask, *candidate)?;
                    }
                    let chooser = ext
                        .selectors
                        .remove(&name)
                        .ok_or_else(|| Error::logic("missing selector extension"))?;
                    GraphKind::Selector {
                        input_mask,
                        chooser,
                        candidates,
                    }
                }
                2 => {
                    let num_masks = reader.len()?;
                    let mut input_masks = Vec::with_capacity(num_masks);
                    for _ in 0..num_masks {
                        input_masks.push(TypeMask::from_bits(reader.u8()?)?);
                    }
                    let num_allowed_nodes = reader.len()?;
                    let mut allowed_nodes = Vec::with_capacity(num_allowed_nodes);
                    for _ in 0..num_allowed_nodes {
                        let node = NodeId(usize::try_from(reader.varint()?)?);
                        compressor.node_entry(node)?;
                        allowed_nodes.push(node);
                    }
                    let num_allowed_graphs = reader.len()?;
                    let mut allowed_graphs = Vec::with_capacity(num_allowed_graphs);
                    for _ in 0..num_allowed_graphs {
                        let graph = GraphId(usize::try_from(reader.varint()?)?);
                        compressor.graph_entry(graph)?;
                        allowed_graphs.push(graph);
                    }
                    let run = ext
                        .functions
                        .remove(&name)
                        .ok_or_else(|| Error::logic("missing function extension"))?;
                    GraphKind::Function {
                        input_masks,
                        run,
                        allowed_nodes,
                        allowed_graphs,
                    }
                }
                _ => return Err(Error::corruption("unknown graph variant")),
            };
            compressor.insert_graph_raw(&name, kind)?;
        }

        let start = reader.varint()?;
        if start > 0 {
            let graph = GraphId(usize::try_from(start - 1)?);
            compressor.graph_entry(graph)?;
            compressor.start = Some(graph);
        }
        if reader.remaining() != 0 {
            return Err(Error::corruption("trailing bytes in description"));
        }

        Ok(compressor)
    }
}

impl core::fmt::Debug for Compressor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Compressor")
            .field("nodes", &self.nodes.len())
            .field("graphs", &self.graphs.len())
            .field("start", &self.start)
            .finish()
    }
}

/// Callbacks and custom codecs a serialized compressor description depends on.
#[derive(Default)]
pub struct Extensions {
    selectors: BTreeMap<String, SelectorFn>,
    functions: BTreeMap<String, FunctionFn>,
    encoders: BTreeMap<u32, EncoderDesc>,
}

impl Extensions {
    /// Creates an empty extension set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provides the chooser of the selector graph named `name`.
    pub fn with_selector(mut self, name: &str, chooser: SelectorFn) -> Self {
        self.selectors.insert(name.to_string(), chooser);
        self
    }

    /// Provides the callback of the function graph named `name`.
    pub fn with_function(mut self, name: &str, run: FunctionFn) -> Self {
        self.functions.insert(name.to_string(), run);
        self
    }

    /// Provides a custom encoder the description depends on.
    pub fn with_encoder(mut self, desc: EncoderDesc) -> Self {
        self.encoders.insert(desc.id().0, desc);
        self
    }
}

pub(crate) fn is_standard_node(node: NodeId) -> bool {
    node.0 < NUM_STANDARD_NODES
}

pub(crate) fn is_standard_graph(graph: GraphId) -> bool {
    graph.0 < NUM_STANDARD_GRAPHS
}

// Anchor names (prefixed with '!') must be unique; other collisions get a numeric
// disambiguation suffix.
fn intern_name(names: &mut BTreeSet<String>, name: &str) -> Result<String> {
    if let Some(anchor) = name.strip_prefix('!') {
        if names.insert(anchor.to_string()) {
            Ok(anchor.to_string())
        } else {
            Err(Error::logic("anchor name already taken"))
        }
    } else if names.insert(name.to_string()) {
        Ok(name.to_string())
    } else {
        let mut suffix = 2usize;
        loop {
            let candidate = format!("{name}#{suffix}");
            if names.insert(candidate.clone()) {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }
}

fn brute_force_choose(
    ctx: &SelectorCtx<'_>,
    input: &Stream<'_>,
    candidates: &[GraphId],
) -> Result<GraphId> {
    let mut best: Option<(usize, GraphId)> = None;
    for candidate in candidates {
        // A failing candidate is a signal, not an error
        if let Ok(size) = ctx.try_graph(input, *candidate) {
            if best.is_none_or(|(best_size, _)| size < best_size) {
                best = Some((size, *candidate));
            }
        }
    }
    best.map(|(_, graph)| graph)
        .ok_or_else(|| Error::codec_execution("every brute force candidate failed"))
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_varint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn read_string(reader: &mut Reader<'_>) -> Result<String> {
    let len = reader.len()?;
    let bytes = reader.bytes(len)?;
    core::str::from_utf8(bytes)
        .map(ToString::to_string)
        .map_err(|_| Error::corruption("invalid name encoding"))
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

fn write_local_params(out: &mut Vec<u8>, params: &LocalParams) {
    let ints: Vec<(i32, i64)> = params.ints().collect();
    write_varint(out, ints.len() as u64);
    for (key, value) in ints {
        write_varint(out, zigzag(i64::from(key)));
        write_varint(out, zigzag(value));
    }

    let blobs: Vec<(i32, &[u8])> = params.blobs().collect();
    write_varint(out, blobs.len() as u64);
    for (key, value) in blobs {
        write_varint(out, zigzag(i64::from(key)));
        write_varint(out, value.len() as u64);
        out.extend_from_slice(value);
    }
}

fn read_local_params(reader: &mut Reader<'_>) -> Result<LocalParams> {
    let mut params = LocalParams::new();
    let num_ints = reader.len()?;
    for _ in 0..num_ints {
        let key = i32::try_from(unzigzag(reader.varint()?))
            .map_err(|_| Error::corruption("parameter key out of range"))?;
        let value = unzigzag(reader.varint()?);
        params = params.with_int(key, value);
    }
    let num_blobs = reader.len()?;
    for _ in 0..num_blobs {
        let key = i32::try_from(unzigzag(reader.varint()?))
            .map_err(|_| Error::corruption("parameter key out of range"))?;
        let len = reader.len()?;
        params = params.with_blob(key, reader.bytes(len)?.to_vec());
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use crate::codec::standard;

    use super::*;

    #[test]
    fn standard_set_is_preregistered() {
        let compressor = Compressor::new();
        assert_eq!(compressor.node_by_name("store"), Some(NodeId(0)));
        assert_eq!(compressor.graph_by_name("generic"), Some(GraphId(1)));
        assert_eq!(
            compressor.standard_node(StandardNode::Tokenize),
            compressor.node_by_name("tokenize").unwrap()
        );
        assert_eq!(
            compressor.node_codec(compressor.standard_node(StandardNode::Delta)).unwrap(),
            standard::DELTA
        );
        assert_eq!(compressor.nodes().count(), NUM_STANDARD_NODES);
        assert_eq!(compressor.graphs().count(), NUM_STANDARD_GRAPHS);
    }

    #[test]
    fn static_graph_type_check() {
        let mut compressor = Compressor::new();
        let delta = compressor.standard_node(StandardNode::Delta);
        let generic = compressor.standard_graph(StandardGraph::Generic);

        // delta -> generic is well typed
        compressor
            .register_static_graph("delta_generic", delta, &[generic])
            .unwrap();

        // Arity mismatch
        assert!(compressor
            .register_static_graph("bad_arity", delta, &[generic, generic])
            .unwrap_err()
            .is_graph_type_mismatch());

        // prefix emits serial content and numeric lengths; a graph that only accepts
        // strings cannot take the content slot
        let prefix = compressor.standard_node(StandardNode::Prefix);
        let entropy = compressor.standard_graph(StandardGraph::Entropy);
        compressor
            .register_static_graph("prefix_split", prefix, &[entropy, entropy])
            .unwrap();
        let prefix_only = compressor
            .register_static_graph("strings_only", prefix, &[entropy, entropy])
            .unwrap();
        assert!(compressor
            .register_static_graph("bad_types", prefix, &[prefix_only, entropy])
            .unwrap_err()
            .is_graph_type_mismatch());
    }

    #[test]
    fn anchor_names_must_be_unique() {
        let mut compressor = Compressor::new();
        let delta = compressor.standard_node(StandardNode::Delta);
        let generic = compressor.standard_graph(StandardGraph::Generic);

        let a = compressor
            .register_static_graph("!mine", delta, &[generic])
            .unwrap();
        assert_eq!(compressor.graph_name(a).unwrap(), "mine");
        assert!(compressor
            .register_static_graph("!mine", delta, &[generic])
            .unwrap_err()
            .is_logic_error());

        // Non-anchor collisions disambiguate
        let b = compressor
            .register_static_graph("mine", delta, &[generic])
            .unwrap();
        assert_eq!(compressor.graph_name(b).unwrap(), "mine#2");
    }

    #[test]
    fn clone_inherits_and_overrides_params() {
        let mut compressor = Compressor::new();
        let base = compressor
            .clone_node_named(
                compressor.standard_node(StandardNode::Generic),
                "tuned",
                LocalParams::new().with_int(0, 5).with_int(1, 6),
            )
            .unwrap();
        let clone = compressor
            .clone_node(base, LocalParams::new().with_int(1, 9))
            .unwrap();

        let entry = compressor.node_entry(clone).unwrap();
        assert_eq!(entry.codec, standard::GENERIC);
        assert_eq!(entry.params.get_int(0), Some(5));
        assert_eq!(entry.params.get_int(1), Some(9));
        assert_eq!(compressor.node_name(clone).unwrap(), "tuned#2");
    }

    #[test]
    fn serde_cycle_with_static_graphs() {
        let mut compressor = Compressor::new();
        let delta = compressor.standard_node(StandardNode::Delta);
        let tuned = compressor
            .clone_node_named(delta, "tuned_delta", LocalParams::new().with_int(3, -7))
            .unwrap();
        let generic = compressor.standard_graph(StandardGraph::Generic);
        let graph = compressor
            .register_static_graph("delta_generic", tuned, &[generic])
            .unwrap();
        compressor.set_start(graph);

        let description = compressor.serialize();
        let restored = Compressor::deserialize(&description, Extensions::new()).unwrap();

        assert_eq!(restored.start(), Some(graph));
        let restored_node = restored.node_by_name("tuned_delta").unwrap();
        assert_eq!(restored_node, tuned);
        assert_eq!(
            restored.node_entry(restored_node).unwrap().params.get_int(3),
            Some(-7)
        );
        assert!(restored.graph_by_name("delta_generic").is_some());
    }

    #[test]
    fn deserialize_missing_selector_extension() {
        let mut compressor = Compressor::new();
        let store = compressor.standard_graph(StandardGraph::Store);
        let generic = compressor.standard_graph(StandardGraph::Generic);
        compressor
            .register_brute_force("pick", TypeMask::ANY, &[store, generic])
            .unwrap();

        let description = compressor.serialize();
        assert!(Compressor::deserialize(&description, Extensions::new())
            .unwrap_err()
            .is_logic_error());

        let restored = Compressor::deserialize(
            &description,
            Extensions::new().with_selector("pick", Box::new(super::brute_force_choose)),
        )
        .unwrap();
        assert!(restored.graph_by_name("pick").is_some());
    }

    #[test]
    fn zigzag_cycle() {
        for v in [0i64, 1, -1, 63, -64, i64::MAX, i64::MIN] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
    }

    #[test]
    fn local_params_serde() {
        let params = LocalParams::new()
            .with_int(-3, i64::MIN)
            .with_int(7, 42)
            .with_blob(0, vec![1, 2, 3]);
        let mut buf = Vec::new();
        write_local_params(&mut buf, &params);
        let restored = read_local_params(&mut Reader::new(&buf)).unwrap();
        assert_eq!(restored, params);
    }
}
