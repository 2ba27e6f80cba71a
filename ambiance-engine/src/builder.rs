//! Audio graph builder: one [`LayerSpec`] → one live [`Layer`].
//!
//! Building is split in two:
//! - [`prepare`] generates the layer's noise buffer and start offset. It does
//!   not touch the graph, so callers can run it without holding the graph lock.
//! - [`PreparedLayer::wire`] creates the nodes and links them:
//!
//! ```text
//! source ──► filter ──► gain ──► destination
//!                        ▲ (param)
//!   sine LFO ──► depth ──┤        depth = gain · lfo.depth
//!   tri  LFO ──► depth ──┘        depth = gain · secondary.depth
//! ```
//!
//! A layer owns every node it creates, listed with its role; teardown stops and
//! removes them all and tolerates handles that are already gone.

use std::sync::Arc;

use ambiance_core::filters::SvfTpt;
use ambiance_core::noise;
use rand::Rng;

use crate::error::GraphError;
use crate::graph::{AudioGraph, NodeId};
use crate::nodes::{LoopSource, NodeKind, NodeRole, Osc};
use crate::recipes::LayerSpec;

/// Noise buffer and start phase for one layer, ready to be wired.
#[derive(Clone, Debug)]
pub struct PreparedLayer {
    spec: LayerSpec,
    buffer: Arc<[f32]>,
    offset: usize,
}

/// Generate a fresh `loop_seconds` buffer for `spec` and pick a random start offset.
pub fn prepare<R: Rng + ?Sized>(spec: &LayerSpec, loop_seconds: f64, sample_rate: u32, rng: &mut R) -> PreparedLayer {
    let buffer: Arc<[f32]> = noise::generate(spec.noise, loop_seconds as f32, sample_rate, rng).into();
    let offset = if buffer.is_empty() { 0 } else { rng.gen_range(0..buffer.len()) };
    PreparedLayer { spec: *spec, buffer, offset }
}

impl PreparedLayer {
    #[inline] pub fn spec(&self) -> &LayerSpec { &self.spec }
    #[inline] pub fn offset(&self) -> usize { self.offset }

    /// Create the layer's nodes in `graph` and route its gain into `dest`.
    /// On failure nothing created here is left behind.
    pub fn wire(self, graph: &mut AudioGraph, dest: NodeId) -> Result<Layer, GraphError> {
        let mut layer = Layer { nodes: Vec::with_capacity(7), gain: dest };
        match self.wire_into(graph, dest, &mut layer) {
            Ok(()) => Ok(layer),
            Err(e) => {
                layer.teardown(graph);
                Err(e)
            }
        }
    }

    fn wire_into(self, graph: &mut AudioGraph, dest: NodeId, layer: &mut Layer) -> Result<(), GraphError> {
        let spec = self.spec;
        let sr = graph.sample_rate();

        let source = layer.own(graph, NodeKind::Source(LoopSource::new(self.buffer, self.offset)));
        let filter = layer.own(graph, NodeKind::Filter(SvfTpt::new(spec.filter, spec.freq_hz, spec.q, sr)));
        let gain = layer.own(graph, NodeKind::gain(spec.gain));
        layer.gain = gain;

        graph.connect(source, filter)?;
        graph.connect(filter, gain)?;

        if let Some(lfo) = spec.lfo {
            let osc = layer.own(graph, NodeKind::Oscillator(Osc::sine(lfo.rate_hz)));
            let depth = layer.own(graph, NodeKind::gain(spec.gain * lfo.depth));
            graph.connect(osc, depth)?;
            graph.connect_param(depth, gain)?;

            if let Some(sec) = lfo.secondary {
                let osc2 = layer.own(graph, NodeKind::Oscillator(Osc::triangle(sec.rate_hz)));
                let depth2 = layer.own(graph, NodeKind::gain(spec.gain * sec.depth));
                graph.connect(osc2, depth2)?;
                graph.connect_param(depth2, gain)?;
            }
        }

        graph.connect(gain, dest)
    }
}

/// Live nodes of one layer.
#[derive(Clone, Debug)]
pub struct Layer {
    nodes: Vec<(NodeRole, NodeId)>,
    gain: NodeId,
}

impl Layer {
    #[inline]
    fn own(&mut self, graph: &mut AudioGraph, kind: NodeKind) -> NodeId {
        let role = kind.role();
        let id = graph.add(kind);
        self.nodes.push((role, id));
        id
    }

    /// Every node the layer owns, in creation order.
    #[inline] pub fn nodes(&self) -> &[(NodeRole, NodeId)] { &self.nodes }

    /// The layer's output gain node.
    #[inline] pub fn gain(&self) -> NodeId { self.gain }

    /// Stop, disconnect and remove every owned node. Safe to call twice.
    pub fn teardown(&self, graph: &mut AudioGraph) {
        for &(role, id) in &self.nodes {
            if matches!(role, NodeRole::Source | NodeRole::Oscillator) {
                graph.stop(id);
            }
            graph.disconnect(id);
        }
        for &(_, id) in &self.nodes {
            graph.remove(id);
        }
    }
}

/// Prepare and wire in one go.
pub fn build_layer<R: Rng + ?Sized>(
    graph: &mut AudioGraph,
    spec: &LayerSpec,
    dest: NodeId,
    loop_seconds: f64,
    rng: &mut R,
) -> Result<Layer, GraphError> {
    let sr = graph.sample_rate().round() as u32;
    prepare(spec, loop_seconds, sr, rng).wire(graph, dest)
}
