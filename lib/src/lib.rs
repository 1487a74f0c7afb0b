//! This crate provides a graph-structured compression engine: instead of treating
//! input as an opaque byte stream, compression is modeled as a directed acyclic graph
//! of typed transforms terminating in entropy/LZ backends.
//!
//! A [`Compressor`] holds the declared graph. At compression time the engine walks the
//! graph, executes every codec it passes, and records the taken path into a
//! self-describing frame. Decompression replays the recorded path; it never needs the
//! original graph.
//!
//! # Getting Started
//!
//! - The [`Compressor`] registers nodes and graphs and designates a starting graph.
//! - The [`CCtx`] compresses typed input [`Stream`]s into a frame.
//! - The [`DCtx`] decompresses a frame back into the original streams.
//! - [`FrameInfo`] inspects a frame's version and output layout without decompressing.
//!
//! Generic compression of one byte stream:
//!
//! ```
//! use zlgraph::{CCtx, Compressor, DCtx, StandardGraph, Stream};
//!
//! let mut compressor = Compressor::new();
//! let generic = compressor.standard_graph(StandardGraph::Generic);
//! compressor.set_start(generic);
//!
//! let input = Stream::ref_serial(b"an example payload, an example payload");
//! let frame = CCtx::new().compress(&compressor, &[input])?;
//!
//! let outputs = DCtx::new().decompress(&frame)?;
//! assert_eq!(outputs[0].content()?, b"an example payload, an example payload");
//! # Ok::<(), zlgraph::Error>(())
//! ```

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod cctx;
mod codec;
mod codecs;
mod compressor;
mod dctx;
mod error;
mod frame;
mod graph;
mod node;
mod params;
mod stream;

pub use cctx::{CCtx, EdgeId, FnCtx, SelectorCtx};
pub use codec::{
    CUSTOM_CODEC_ID_BASE, CodecId, CodecShape, DecodeCtx, DecodeFn, DecoderDesc, EncodeCtx,
    EncodeFn, EncoderDesc,
};
pub use compressor::{Compressor, Extensions, StandardGraph, StandardNode};
pub use dctx::DCtx;
pub use error::{Error, Result};
pub use frame::{FRAME_MAGIC, FrameInfo, MAX_FORMAT_VERSION, MIN_FORMAT_VERSION, OutputInfo};
pub use graph::{FunctionFn, GraphId, SelectorFn};
pub use node::NodeId;
pub use params::{CParam, LocalParams};
pub use stream::{Stream, StreamType, TypeMask};

#[doc = include_str!("../../README.md")]
#[cfg(doctest)]
#[cfg(feature = "std")]
pub struct ReadmeDoctests;

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::vec;
    use alloc::vec::Vec;

    use proptest::prelude::*;

    use super::*;

    // xorshift64*, deterministic across platforms
    struct Rng(u64);

    impl Rng {
        fn new(seed: u64) -> Self {
            Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
        }

        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0.wrapping_mul(0x2545_F491_4F6C_DD1D)
        }
    }

    fn compress(compressor: &Compressor, inputs: &[Stream<'_>]) -> Vec<u8> {
        CCtx::new().compress(compressor, inputs).unwrap()
    }

    fn roundtrip(compressor: &Compressor, inputs: &[Stream<'_>]) -> Vec<u8> {
        let frame = compress(compressor, inputs);
        let outputs = DCtx::new().decompress(&frame).unwrap();
        assert_eq!(outputs.len(), inputs.len());
        for (input, output) in inputs.iter().zip(&outputs) {
            assert_eq!(input, output);
        }
        frame
    }

    fn with_start(graph: StandardGraph) -> Compressor {
        let mut compressor = Compressor::new();
        let start = compressor.standard_graph(graph);
        compressor.set_start(start);
        compressor
    }

    #[test]
    fn constant_stream() {
        let mut compressor = Compressor::new();
        let constant = compressor.standard_graph(StandardGraph::Constant);
        compressor.set_start(constant);

        let data = vec![b'a'; 100_000];
        let frame = roundtrip(&compressor, &[Stream::ref_serial(&data)]);
        assert!(frame.len() <= 32, "constant frame is {} bytes", frame.len());
    }

    #[test]
    fn constant_rejects_varying_input() {
        let mut compressor = Compressor::new();
        let constant = compressor.standard_graph(StandardGraph::Constant);
        compressor.set_start(constant);

        let err = CCtx::new()
            .compress(&compressor, &[Stream::ref_serial(b"ab")])
            .unwrap_err();
        assert!(err.is_codec_execution_failure());
    }

    #[test]
    fn transpose_split_roundtrip() {
        let mut compressor = Compressor::new();
        let transpose = compressor.standard_node(StandardNode::TransposeSplit);
        let generic = compressor.standard_graph(StandardGraph::Generic);
        let split = compressor
            .register_static_graph("split_planes", transpose, &[generic])
            .unwrap();
        compressor.set_start(split);

        let values: Vec<u32> = (0..1024u32).map(|i| i.wrapping_mul(0x0102_0304)).collect();
        roundtrip(&compressor, &[Stream::from_u32s(&values)]);
    }

    #[test]
    fn tokenize_field_lz_roundtrip() {
        let mut compressor = Compressor::new();
        let tokenize = compressor.standard_node(StandardNode::Tokenize);
        let field_lz = compressor.standard_graph(StandardGraph::FieldLz);
        let generic = compressor.standard_graph(StandardGraph::Generic);
        let graph = compressor
            .register_static_graph("tokenize_lz", tokenize, &[field_lz, generic])
            .unwrap();
        compressor.set_start(graph);

        let mut rng = Rng::new(10);
        let alphabet: Vec<u16> = (0..100).map(|_| rng.next() as u16).collect();
        let values: Vec<u16> = (0..10240)
            .map(|_| alphabet[(rng.next() % 100) as usize])
            .collect();

        let input = Stream::from_u16s(&values);
        let raw_size = input.content_size().unwrap();
        let frame = roundtrip(&compressor, &[input]);
        assert!(frame.len() < raw_size);
    }

    #[test]
    fn brute_force_selector_picks_smallest() {
        let mut compressor = Compressor::new();
        let store = compressor.standard_graph(StandardGraph::Store);
        let entropy = compressor.standard_graph(StandardGraph::Entropy);
        let bitpack = compressor.standard_node(StandardNode::Bitpack);
        let tokenize = compressor.standard_node(StandardNode::Tokenize);

        let bitpack_store = compressor
            .register_static_graph("bitpack_store", bitpack, &[store])
            .unwrap();
        let tokenize_fse = compressor
            .register_static_graph("tokenize_fse", tokenize, &[entropy, entropy])
            .unwrap();
        let pick = compressor
            .register_brute_force("pick", TypeMask::NUMERIC, &[store, bitpack_store, tokenize_fse])
            .unwrap();

        let values: Vec<u64> = (0..10_000).map(|i| i % 2).collect();
        let inputs = [Stream::from_u64s(&values)];

        let mut sizes = Vec::new();
        for candidate in [store, bitpack_store, tokenize_fse] {
            compressor.set_start(candidate);
            sizes.push(compress(&compressor, &inputs).len());
        }

        compressor.set_start(pick);
        let frame = roundtrip(&compressor, &inputs);
        assert_eq!(frame.len(), sizes.into_iter().min().unwrap());
    }

    #[test]
    fn string_prefix_field_lz_roundtrip() {
        let mut compressor = Compressor::new();
        let prefix = compressor.standard_node(StandardNode::Prefix);
        let field_lz = compressor.standard_graph(StandardGraph::FieldLz);
        let graph = compressor
            .register_static_graph("prefix_lz", prefix, &[field_lz, field_lz])
            .unwrap();
        compressor.set_start(graph);

        let mut rng = Rng::new(10);
        let alphabet = b"abcd";
        let content: Vec<u8> = (0..1024)
            .map(|_| alphabet[(rng.next() % 4) as usize])
            .collect();
        let mut lens = Vec::new();
        let mut total = 0usize;
        while total < content.len() {
            let len = (5 + rng.next() % 11).min((content.len() - total) as u64) as u32;
            lens.push(len);
            total += len as usize;
        }

        roundtrip(&compressor, &[Stream::ref_string(&content, &lens).unwrap()]);
    }

    #[test]
    fn multi_input_roundtrip() {
        let compressor = with_start(StandardGraph::Generic);
        let inputs = [
            Stream::ref_serial(b"hello world"),
            Stream::ref_serial(b"hello world hello hello"),
        ];
        roundtrip(&compressor, &inputs);
    }

    #[test]
    fn decompress_into_caller_buffers() {
        let compressor = with_start(StandardGraph::Generic);
        let inputs = [
            Stream::ref_serial(b"hello world"),
            Stream::ref_serial(b"hello world hello hello"),
        ];
        let frame = compress(&compressor, &inputs);

        let info = FrameInfo::parse(&frame).unwrap();
        assert_eq!(info.num_outputs(), 2);
        let mut first = vec![0u8; info.outputs()[0].content_size() as usize];
        let mut second = vec![0u8; info.outputs()[1].content_size() as usize];

        let outputs = DCtx::new()
            .decompress_into(&frame, vec![&mut first[..], &mut second[..]])
            .unwrap();
        assert_eq!(outputs[0].num_elts().unwrap(), 11);
        assert_eq!(&first, b"hello world");
        assert_eq!(&second, b"hello world hello hello");

        // A short buffer is an allocation error
        let mut short = vec![0u8; 3];
        let mut other = vec![0u8; 23];
        assert!(DCtx::new()
            .decompress_into(&frame, vec![&mut short[..], &mut other[..]])
            .unwrap_err()
            .is_allocation());
    }

    #[test]
    fn delta_varint_chain_roundtrip() {
        let mut compressor = Compressor::new();
        let delta = compressor.standard_node(StandardNode::Delta);
        let varint = compressor.standard_node(StandardNode::Varint);
        let generic = compressor.standard_graph(StandardGraph::Generic);
        let varint_generic = compressor
            .register_static_graph("varint_generic", varint, &[generic])
            .unwrap();
        let graph = compressor
            .register_static_graph("delta_varint", delta, &[varint_generic])
            .unwrap();
        compressor.set_start(graph);

        let values: Vec<u64> = (0..5000u64).map(|i| 1_000_000 + i * 7).collect();
        roundtrip(&compressor, &[Stream::from_u64s(&values)]);
    }

    #[test]
    fn function_graph_routes_by_type() {
        fn route(ctx: &mut FnCtx<'_, '_, '_>, edges: &[EdgeId]) -> Result<()> {
            for edge in edges {
                if ctx.stream(*edge)?.stream_type() == StreamType::Numeric {
                    let delta = ctx.standard_node(StandardNode::Delta);
                    let out = ctx.run_node(delta, &[*edge])?;
                    ctx.set_destination(out[0], ctx.standard_graph(StandardGraph::Generic))?;
                } else {
                    ctx.set_destination(*edge, ctx.standard_graph(StandardGraph::Store))?;
                }
            }
            Ok(())
        }

        let mut compressor = Compressor::new();
        let graph = compressor
            .register_function_graph(
                "route_by_type",
                &[TypeMask::ANY, TypeMask::ANY],
                Box::new(route),
                &[],
                &[],
            )
            .unwrap();
        compressor.set_start(graph);

        let values: Vec<u32> = (0..512u32).map(|i| i * 3).collect();
        let inputs = [Stream::ref_serial(b"plain bytes"), Stream::from_u32s(&values)];
        roundtrip(&compressor, &inputs);
    }

    #[test]
    fn function_graph_must_route_every_edge() {
        fn drop_edge(_: &mut FnCtx<'_, '_, '_>, _: &[EdgeId]) -> Result<()> {
            Ok(())
        }

        let mut compressor = Compressor::new();
        let graph = compressor
            .register_function_graph("noop", &[TypeMask::ANY], Box::new(drop_edge), &[], &[])
            .unwrap();
        compressor.set_start(graph);

        let err = CCtx::new()
            .compress(&compressor, &[Stream::ref_serial(b"x")])
            .unwrap_err();
        assert!(err.is_logic_error());
    }

    #[test]
    fn selector_trials_have_no_observable_effect() {
        fn plain(_: &SelectorCtx<'_>, _: &Stream<'_>, candidates: &[GraphId]) -> Result<GraphId> {
            Ok(candidates[0])
        }

        fn trialing(
            ctx: &SelectorCtx<'_>,
            input: &Stream<'_>,
            candidates: &[GraphId],
        ) -> Result<GraphId> {
            // Measure everything, then pick the first candidate anyway
            for candidate in candidates {
                let _ = ctx.try_graph(input, *candidate);
                let _ = ctx.try_graph(input, *candidate);
            }
            Ok(candidates[0])
        }

        let data = b"selector idempotence payload, repeated a few times over";
        let choosers: Vec<SelectorFn> = vec![Box::new(plain), Box::new(trialing)];

        let mut frames = Vec::new();
        for chooser in choosers {
            let mut compressor = Compressor::new();
            let generic = compressor.standard_graph(StandardGraph::Generic);
            let store = compressor.standard_graph(StandardGraph::Store);
            let graph = compressor
                .register_selector_graph("choose", TypeMask::ANY, chooser, &[generic, store])
                .unwrap();
            compressor.set_start(graph);
            frames.push(compress(&compressor, &[Stream::ref_serial(data)]));
        }

        assert_eq!(frames[0], frames[1]);
    }

    #[test]
    fn brute_force_skips_failing_candidates() {
        let mut compressor = Compressor::new();
        let constant = compressor.standard_graph(StandardGraph::Constant);
        let store = compressor.standard_graph(StandardGraph::Store);
        let pick = compressor
            .register_brute_force("pick", TypeMask::FIXED_WIDTH, &[constant, store])
            .unwrap();
        compressor.set_start(pick);

        // Not constant, so the constant candidate fails its trial and store wins
        roundtrip(&compressor, &[Stream::ref_serial(b"not constant data")]);
    }

    #[test]
    fn permissive_mode_falls_back_to_store() {
        let mut compressor = Compressor::new();
        let constant = compressor.standard_graph(StandardGraph::Constant);
        compressor.set_start(constant);
        let input = b"certainly not constant";

        let err = CCtx::new()
            .compress(&compressor, &[Stream::ref_serial(input)])
            .unwrap_err();
        assert!(err.is_codec_execution_failure());

        let mut cctx = CCtx::new();
        cctx.set_parameter(CParam::Permissive(true)).unwrap();
        let frame = cctx.compress(&compressor, &[Stream::ref_serial(input)]).unwrap();
        let outputs = DCtx::new().decompress(&frame).unwrap();
        assert_eq!(outputs[0].content().unwrap(), input);
    }

    #[test]
    fn min_stream_size_forces_store() {
        let generic = with_start(StandardGraph::Generic);
        let store = with_start(StandardGraph::Store);

        let mut cctx = CCtx::new();
        cctx.set_parameter(CParam::StickyParameters(true)).unwrap();
        cctx.set_parameter(CParam::MinStreamSize(1024)).unwrap();

        let frame = cctx.compress(&generic, &[Stream::ref_serial(b"tiny")]).unwrap();
        let direct = CCtx::new().compress(&store, &[Stream::ref_serial(b"tiny")]).unwrap();
        assert_eq!(frame, direct);

        // Large inputs take their declared path
        let data = vec![7u8; 4096];
        let frame = cctx.compress(&generic, &[Stream::ref_serial(&data)]).unwrap();
        let direct = CCtx::new().compress(&store, &[Stream::ref_serial(&data)]).unwrap();
        assert_ne!(frame, direct);
    }

    #[test]
    fn deterministic_output() {
        let compressor = with_start(StandardGraph::Generic);
        let data: Vec<u8> = (0..2048u32).map(|i| (i * 31 % 251) as u8).collect();
        let a = compress(&compressor, &[Stream::ref_serial(&data)]);
        let b = compress(&compressor, &[Stream::ref_serial(&data)]);
        assert_eq!(a, b);
    }

    #[test]
    fn version_range() {
        let compressor = with_start(StandardGraph::Generic);
        for version in MIN_FORMAT_VERSION..=MAX_FORMAT_VERSION {
            let mut cctx = CCtx::new();
            cctx.set_parameter(CParam::FormatVersion(version)).unwrap();
            let frame = cctx.compress(&compressor, &[Stream::ref_serial(b"versioned")]).unwrap();

            assert_eq!(FrameInfo::parse(&frame).unwrap().format_version(), version);
            let outputs = DCtx::new().decompress(&frame).unwrap();
            assert_eq!(outputs[0].content().unwrap(), b"versioned");
        }

        let mut cctx = CCtx::new();
        assert!(cctx
            .set_parameter(CParam::FormatVersion(MAX_FORMAT_VERSION + 1))
            .unwrap_err()
            .is_unsupported_version());
        assert!(cctx
            .set_parameter(CParam::FormatVersion(MIN_FORMAT_VERSION - 1))
            .unwrap_err()
            .is_unsupported_version());
    }

    #[test]
    fn sticky_parameters() {
        let compressor = with_start(StandardGraph::Store);

        let mut cctx = CCtx::new();
        cctx.set_parameter(CParam::StickyParameters(true)).unwrap();
        cctx.set_parameter(CParam::FormatVersion(1)).unwrap();
        for _ in 0..2 {
            let frame = cctx.compress(&compressor, &[Stream::ref_serial(b"x")]).unwrap();
            assert_eq!(FrameInfo::parse(&frame).unwrap().format_version(), 1);
        }

        let mut cctx = CCtx::new();
        cctx.set_parameter(CParam::FormatVersion(1)).unwrap();
        let frame = cctx.compress(&compressor, &[Stream::ref_serial(b"x")]).unwrap();
        assert_eq!(FrameInfo::parse(&frame).unwrap().format_version(), 1);
        // Parameters were not sticky, the second call is back at the default
        let frame = cctx.compress(&compressor, &[Stream::ref_serial(b"x")]).unwrap();
        assert_eq!(
            FrameInfo::parse(&frame).unwrap().format_version(),
            MAX_FORMAT_VERSION
        );
    }

    #[test]
    fn compressed_checksum_detects_any_body_flip() {
        let compressor = with_start(StandardGraph::Store);
        let mut cctx = CCtx::new();
        cctx.set_parameter(CParam::StickyParameters(true)).unwrap();
        cctx.set_parameter(CParam::CompressedChecksum(true)).unwrap();
        let frame = cctx
            .compress(&compressor, &[Stream::ref_serial(b"checksummed payload")])
            .unwrap();

        let dctx = DCtx::new();
        dctx.decompress(&frame).unwrap();
        // Skip magic and version, whose flips fail structurally either way
        for i in 6..frame.len() - 4 {
            let mut bad = frame.clone();
            bad[i] ^= 1;
            assert!(dctx.decompress(&bad).is_err(), "flip at {i} went undetected");
        }
    }

    // A custom terminal codec whose decoder corrupts the first byte. Structurally the
    // frame stays valid, so only the content checksum can catch it.
    fn lying_encode(ctx: &mut EncodeCtx<'_, '_>, inputs: &[&Stream<'_>]) -> Result<()> {
        for input in inputs {
            ctx.emit_blob(input.content()?.to_vec())?;
        }
        Ok(())
    }

    fn lying_decode(ctx: &mut DecodeCtx<'_, '_>, blobs: &[&Stream<'_>]) -> Result<()> {
        for blob in blobs {
            let mut content = blob.content()?.to_vec();
            content[0] ^= 0x01;
            let len = content.len();
            let out = ctx.create_output(StreamType::Serial, 1, len)?;
            out.buf_mut()?[..len].copy_from_slice(&content);
            out.commit(len)?;
        }
        Ok(())
    }

    fn lying_shape() -> CodecShape {
        CodecShape {
            inputs: vec![TypeMask::SERIAL],
            last_input_variadic: true,
            singleton_outputs: vec![],
            variable_output: None,
            terminal: true,
        }
    }

    #[test]
    fn content_checksum_catches_bad_decoder() {
        let id = CodecId(CUSTOM_CODEC_ID_BASE + 7);

        let mut compressor = Compressor::new();
        let node = compressor
            .register_custom_encoder(EncoderDesc::new(id, "lying", lying_shape(), Box::new(lying_encode)))
            .unwrap();
        let graph = compressor.register_static_graph("lying", node, &[]).unwrap();
        compressor.set_start(graph);

        let mut cctx = CCtx::new();
        cctx.set_parameter(CParam::StickyParameters(true)).unwrap();
        cctx.set_parameter(CParam::ContentChecksum(true)).unwrap();
        let frame = cctx.compress(&compressor, &[Stream::ref_serial(b"guarded")]).unwrap();

        let mut dctx = DCtx::new();
        dctx.register_decoder(DecoderDesc::new(id, "lying", lying_shape(), Box::new(lying_decode)))
            .unwrap();
        assert!(dctx.decompress(&frame).unwrap_err().is_corruption());

        // Without the checksum the lie goes through
        cctx.set_parameter(CParam::ContentChecksum(false)).unwrap();
        let frame = cctx.compress(&compressor, &[Stream::ref_serial(b"guarded")]).unwrap();
        let outputs = dctx.decompress(&frame).unwrap();
        assert_eq!(outputs[0].content().unwrap(), b"fuarded");
    }

    #[test]
    fn unknown_codec_is_reported() {
        let id = CodecId(CUSTOM_CODEC_ID_BASE + 9);

        let mut compressor = Compressor::new();
        let node = compressor
            .register_custom_encoder(EncoderDesc::new(id, "custom", lying_shape(), Box::new(lying_encode)))
            .unwrap();
        let graph = compressor.register_static_graph("custom", node, &[]).unwrap();
        compressor.set_start(graph);

        let frame = compress(&compressor, &[Stream::ref_serial(b"opaque")]);
        assert!(DCtx::new().decompress(&frame).unwrap_err().is_unknown_codec());
    }

    #[test]
    fn type_and_width_are_preserved() {
        let compressor = with_start(StandardGraph::Generic);
        let values: Vec<u16> = (0..100u16).collect();
        let frame = compress(&compressor, &[Stream::from_u16s(&values)]);

        let outputs = DCtx::new().decompress(&frame).unwrap();
        assert_eq!(outputs[0].stream_type(), StreamType::Numeric);
        assert_eq!(outputs[0].elt_width(), 2);
        assert_eq!(outputs[0].num_elts().unwrap(), 100);
        assert_eq!(outputs[0].numeric_values().unwrap().len(), 100);
    }

    #[test]
    fn truncated_frames_are_corrupt() {
        let compressor = with_start(StandardGraph::Generic);
        let frame = compress(&compressor, &[Stream::ref_serial(b"will be truncated")]);

        let dctx = DCtx::new();
        for len in 0..frame.len() {
            let err = dctx.decompress(&frame[..len]).unwrap_err();
            assert!(err.is_corruption(), "truncation at {len} not detected as corruption");
        }
    }

    proptest! {
        #[test]
        fn generic_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let compressor = with_start(StandardGraph::Generic);
            roundtrip(&compressor, &[Stream::ref_serial(&data)]);
        }

        #[test]
        fn delta_roundtrip(values in proptest::collection::vec(any::<u32>(), 1..2000)) {
            let mut compressor = Compressor::new();
            let delta = compressor.standard_node(StandardNode::Delta);
            let generic = compressor.standard_graph(StandardGraph::Generic);
            let graph = compressor.register_static_graph("delta_generic", delta, &[generic]).unwrap();
            compressor.set_start(graph);

            roundtrip(&compressor, &[Stream::from_u32s(&values)]);
        }

        #[test]
        fn bitpack_roundtrip(values in proptest::collection::vec(0u64..1 << 20, 1..2000)) {
            let mut compressor = Compressor::new();
            let bitpack = compressor.standard_node(StandardNode::Bitpack);
            let store = compressor.standard_graph(StandardGraph::Store);
            let graph = compressor.register_static_graph("bitpack_store", bitpack, &[store]).unwrap();
            compressor.set_start(graph);

            roundtrip(&compressor, &[Stream::from_u64s(&values)]);
        }

        #[test]
        fn string_roundtrip(segments in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..24), 0..128)) {
            let mut compressor = Compressor::new();
            let prefix = compressor.standard_node(StandardNode::Prefix);
            let generic = compressor.standard_graph(StandardGraph::Generic);
            let graph = compressor.register_static_graph("prefix_generic", prefix, &[generic, generic]).unwrap();
            compressor.set_start(graph);

            let content: Vec<u8> = segments.iter().flatten().copied().collect();
            let lens: Vec<u32> = segments.iter().map(|s| s.len() as u32).collect();
            roundtrip(&compressor, &[Stream::ref_string(&content, &lens).unwrap()]);
        }

        #[test]
        fn checksummed_roundtrip(data in proptest::collection::vec(any::<u8>(), 1..1024)) {
            let compressor = with_start(StandardGraph::Generic);
            let mut cctx = CCtx::new();
            cctx.set_parameter(CParam::StickyParameters(true)).unwrap();
            cctx.set_parameter(CParam::ContentChecksum(true)).unwrap();
            cctx.set_parameter(CParam::CompressedChecksum(true)).unwrap();

            let frame = cctx.compress(&compressor, &[Stream::ref_serial(&data)]).unwrap();
            let outputs = DCtx::new().decompress(&frame).unwrap();
            prop_assert_eq!(outputs[0].content().unwrap(), &data[..]);
        }
    }
}
