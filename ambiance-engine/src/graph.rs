//! Realtime render graph.
//!
//! This module defines the minimal `Generator` trait and `AudioGraph`, an arena
//! of [`NodeKind`]s wired as a strict tree that renders one **mono** sample at a
//! time. Rendering only walks the cached order; it never allocates.
//!
//! Design goals
//! - Nodes addressed by generational [`NodeId`] handles; a handle to a removed
//!   node is stale and every teardown call on it is a no-op
//! - Every node has at most one downstream link (audio or parameter), so the
//!   graph is a forest and a cycle can be rejected at `connect` time
//! - Topological order rebuilt eagerly by each structural change, on the
//!   caller's (control) thread, into reused scratch buffers
//! - SR changes handled through `Generator::reset`, which re-tunes filters and
//!   keeps the clock continuous

use ambiance_core::dsp::AnalysisTap;

use crate::error::GraphError;
use crate::nodes::{NodeKind, NodeRole};
use crate::param::Param;

/// Anything that can generate one sample at a time.
pub trait Generator {
    /// Called when the engine is (re)initialized or when the sample rate changes.
    fn reset(&mut self, sr: f32);

    /// Generate the next mono sample. Implementations should assume the sample
    /// rate has been communicated via `reset`.
    fn next(&mut self) -> f32;
}

/// Generational handle to a graph node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Which input of the destination a link feeds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Port {
    Audio,
    /// The destination's gain parameter (destination must be a gain node).
    Param,
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    output: Option<(usize, Port)>,
    tap: Option<Box<AnalysisTap>>,
    stopped: bool,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-backed node graph with a single designated output node.
#[derive(Debug)]
pub struct AudioGraph {
    sr: f32,
    // clock: `epoch + frames / sr`, re-based on sample-rate changes
    epoch: f64,
    frames: u64,

    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,

    order: Vec<usize>,
    // Kahn scratch, kept to avoid reallocating on every rebuild
    indeg: Vec<usize>,
    ready: Vec<usize>,

    // per-sample input accumulators, indexed like `slots`
    audio_in: Vec<f32>,
    param_in: Vec<f32>,

    output: Option<usize>,
}

impl AudioGraph {
    pub fn new(sr: f32) -> Self {
        Self {
            sr: sr.max(1.0),
            epoch: 0.0,
            frames: 0,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            order: Vec::new(),
            indeg: Vec::new(),
            ready: Vec::new(),
            audio_in: Vec::new(),
            param_in: Vec::new(),
            output: None,
        }
    }

    #[inline] pub fn sample_rate(&self) -> f32 { self.sr }

    /// Audio clock in seconds: the time of the next sample to be rendered.
    #[inline]
    pub fn current_time(&self) -> f64 {
        self.epoch + self.frames as f64 / f64::from(self.sr)
    }

    /// Number of live nodes.
    #[inline] pub fn len(&self) -> usize { self.live }
    #[inline] pub fn is_empty(&self) -> bool { self.live == 0 }

    // ------------------------------ Handles ------------------------------

    #[inline]
    fn resolve(&self, id: NodeId) -> Option<usize> {
        let i = id.index as usize;
        let slot = self.slots.get(i)?;
        (slot.generation == id.generation && slot.node.is_some()).then_some(i)
    }

    #[inline]
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.resolve(id).and_then(|i| self.slots[i].node.as_ref())
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let i = self.resolve(id)?;
        self.slots[i].node.as_mut()
    }

    #[inline] pub fn contains(&self, id: NodeId) -> bool { self.resolve(id).is_some() }

    pub fn role(&self, id: NodeId) -> Option<NodeRole> {
        self.node(id).map(|n| n.kind.role())
    }

    // ------------------------------ Structure ------------------------------

    /// Insert a node; it is silent until something routes it to the output.
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let node = Node { kind, output: None, tap: None, stopped: false };
        let index = match self.free.pop() {
            Some(i) => {
                self.slots[i].node = Some(node);
                i
            }
            None => {
                self.slots.push(Slot { generation: 0, node: Some(node) });
                self.audio_in.push(0.0);
                self.param_in.push(0.0);
                self.slots.len() - 1
            }
        };
        self.live += 1;
        self.rebuild_order();
        NodeId { index: index as u32, generation: self.slots[index].generation }
    }

    /// Route `src`'s output into `dst`'s audio input.
    pub fn connect(&mut self, src: NodeId, dst: NodeId) -> Result<(), GraphError> {
        self.link(src, dst, Port::Audio)
    }

    /// Route `src`'s output into `dst`'s gain parameter.
    pub fn connect_param(&mut self, src: NodeId, dst: NodeId) -> Result<(), GraphError> {
        self.link(src, dst, Port::Param)
    }

    fn link(&mut self, src: NodeId, dst: NodeId, port: Port) -> Result<(), GraphError> {
        let s = self.resolve(src).ok_or(GraphError::StaleNode)?;
        let d = self.resolve(dst).ok_or(GraphError::StaleNode)?;
        if port == Port::Param && self.role(dst) != Some(NodeRole::Gain) {
            return Err(GraphError::NotAParam);
        }
        if self.slots[s].node.as_ref().is_some_and(|n| n.output.is_some()) {
            return Err(GraphError::AlreadyConnected);
        }
        // walk downstream from dst; meeting src means the link closes a loop
        let mut cur = Some(d);
        while let Some(i) = cur {
            if i == s {
                return Err(GraphError::Cycle);
            }
            cur = self.slots[i].node.as_ref().and_then(|n| n.output.map(|(o, _)| o));
        }
        if let Some(n) = self.slots[s].node.as_mut() {
            n.output = Some((d, port));
        }
        self.rebuild_order();
        Ok(())
    }

    /// Remove `id`'s downstream link. Stale handles are ignored.
    pub fn disconnect(&mut self, id: NodeId) {
        if let Some(n) = self.node_mut(id) {
            if n.output.take().is_some() {
                self.rebuild_order();
            }
        }
    }

    /// Silence a source or oscillator for good. Stale handles are ignored.
    pub fn stop(&mut self, id: NodeId) {
        if let Some(n) = self.node_mut(id) {
            n.stopped = true;
        }
    }

    /// Free `id`'s slot, cutting every link into or out of it.
    /// Returns false (and does nothing) for a stale handle.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(i) = self.resolve(id) else { return false };
        self.slots[i].node = None;
        self.slots[i].generation = self.slots[i].generation.wrapping_add(1);
        self.free.push(i);
        self.live -= 1;
        for n in self.slots.iter_mut().filter_map(|s| s.node.as_mut()) {
            if matches!(n.output, Some((o, _)) if o == i) {
                n.output = None;
            }
        }
        if self.output == Some(i) {
            self.output = None;
        }
        self.rebuild_order();
        true
    }

    /// Designate the node whose output [`Generator::next`] returns.
    pub fn set_output(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.output = Some(self.resolve(id).ok_or(GraphError::StaleNode)?);
        Ok(())
    }

    // ------------------------------ Parameters / metering ------------------------------

    /// Gain parameter of a gain node.
    pub fn param(&self, id: NodeId) -> Option<&Param> {
        match self.node(id).map(|n| &n.kind) {
            Some(NodeKind::Gain(p)) => Some(p),
            _ => None,
        }
    }

    pub fn param_mut(&mut self, id: NodeId) -> Option<&mut Param> {
        match self.node_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Gain(p)) => Some(p),
            _ => None,
        }
    }

    /// Start recording `id`'s output into an analysis tap.
    pub fn attach_tap(&mut self, id: NodeId) -> Result<(), GraphError> {
        let n = self.node_mut(id).ok_or(GraphError::StaleNode)?;
        if n.tap.is_none() {
            n.tap = Some(Box::new(AnalysisTap::new()));
        }
        Ok(())
    }

    /// Metering level of `id`'s tap; `None` for stale handles or untapped nodes.
    pub fn level(&self, id: NodeId) -> Option<f32> {
        self.node(id).and_then(|n| n.tap.as_ref()).map(|t| t.level())
    }

    // ------------------------------ Rendering ------------------------------

    /// Kahn's algorithm over the output links. Acyclicity is guaranteed by `link`.
    fn rebuild_order(&mut self) {
        let n = self.slots.len();
        self.indeg.clear();
        self.indeg.resize(n, 0);
        for node in self.slots.iter().filter_map(|s| s.node.as_ref()) {
            if let Some((o, _)) = node.output {
                self.indeg[o] += 1;
            }
        }
        self.order.clear();
        self.ready.clear();
        for i in 0..n {
            if self.slots[i].node.is_some() && self.indeg[i] == 0 {
                self.ready.push(i);
            }
        }
        while let Some(i) = self.ready.pop() {
            self.order.push(i);
            if let Some((o, _)) = self.slots[i].node.as_ref().and_then(|n| n.output) {
                self.indeg[o] -= 1;
                if self.indeg[o] == 0 {
                    self.ready.push(o);
                }
            }
        }
    }

    /// Render one sample of the output node.
    fn tick(&mut self) -> f32 {
        self.audio_in.iter_mut().for_each(|x| *x = 0.0);
        self.param_in.iter_mut().for_each(|x| *x = 0.0);

        let t = self.current_time();
        let sr = self.sr;
        let mut out = 0.0;

        for &i in &self.order {
            let Some(node) = self.slots[i].node.as_mut() else { continue };
            let x = self.audio_in[i];
            let y = match &mut node.kind {
                NodeKind::Source(src) => src.next(),
                NodeKind::Filter(svf) => svf.process(x),
                NodeKind::Gain(p) => x * (p.process(t, sr) + self.param_in[i]),
                NodeKind::Oscillator(osc) => osc.next(sr),
            };
            let y = if node.stopped { 0.0 } else { y };
            if let Some(tap) = node.tap.as_mut() {
                tap.push(y);
            }
            match node.output {
                Some((o, Port::Audio)) => self.audio_in[o] += y,
                Some((o, Port::Param)) => self.param_in[o] += y,
                None => {}
            }
            if self.output == Some(i) {
                out = y;
            }
        }

        self.frames += 1;
        out
    }

    /// Fill `out` with consecutive mono samples.
    pub fn render(&mut self, out: &mut [f32]) {
        for y in out.iter_mut() {
            *y = self.tick();
        }
    }
}

impl Generator for AudioGraph {
    fn reset(&mut self, sr: f32) {
        let sr = sr.max(1.0);
        if sr == self.sr {
            return;
        }
        self.epoch = self.current_time();
        self.frames = 0;
        self.sr = sr;
        for node in self.slots.iter_mut().filter_map(|s| s.node.as_mut()) {
            if let NodeKind::Filter(svf) = &mut node.kind {
                svf.set_sample_rate(sr);
            }
        }
    }

    #[inline]
    fn next(&mut self) -> f32 {
        self.tick()
    }
}
