//! Channel bus manager and master bus.
//!
//! One [`Channel`] per live sound id: a gain node (the per-sound fader) routed
//! into the master gain, an analysis tap on that gain, and the layers built
//! from the sound's recipe. The manager also remembers the last volume set for
//! every id, live or not, so a sound that is stopped and replayed comes back at
//! the level the user chose.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::builder::Layer;
use crate::error::GraphError;
use crate::graph::{AudioGraph, NodeId};
use crate::nodes::NodeKind;

/// Levels at or below this read as silence in activity indicators.
pub const AUDIBLE_THRESHOLD: f32 = 0.008;

/// Whether a metering level counts as "playing" for a UI indicator.
#[inline]
pub fn is_audible(level: f32) -> bool {
    level > AUDIBLE_THRESHOLD
}

/// Ramp a gain parameter towards `target` with time constant `tau`, replacing
/// whatever automation was pending.
fn approach(graph: &mut AudioGraph, gain: NodeId, target: f32, tau: f64) {
    let now = graph.current_time();
    if let Some(p) = graph.param_mut(gain) {
        p.cancel_and_hold(now);
        p.set_target_at_time(target, now, tau);
    }
}

/// Live mixing bus of one sound id.
#[derive(Debug)]
pub struct Channel {
    gain: NodeId,
    layers: Vec<Layer>,
    generation: u64,
    fading_out: bool,
}

impl Channel {
    #[inline] pub fn gain(&self) -> NodeId { self.gain }
    #[inline] pub fn layers(&self) -> &[Layer] { &self.layers }
    /// Distinguishes this instance from earlier channels of the same id.
    #[inline] pub fn generation(&self) -> u64 { self.generation }
    #[inline] pub fn is_fading_out(&self) -> bool { self.fading_out }

    #[inline] pub fn push_layer(&mut self, layer: Layer) { self.layers.push(layer); }
    #[inline] pub(crate) fn set_fading_out(&mut self, fading: bool) { self.fading_out = fading; }

    fn teardown(&self, graph: &mut AudioGraph) {
        for layer in &self.layers {
            layer.teardown(graph);
        }
        graph.disconnect(self.gain);
        graph.remove(self.gain);
    }
}

/// Owner of every live channel plus the remembered-volume map.
#[derive(Debug)]
pub struct ChannelBus {
    channels: BTreeMap<String, Channel>,
    volumes: HashMap<String, f32>,
    default_volume: f32,
    next_generation: u64,
}

impl ChannelBus {
    pub fn new(default_volume: f32) -> Self {
        Self { channels: BTreeMap::new(), volumes: HashMap::new(), default_volume, next_generation: 0 }
    }

    #[inline] pub fn contains(&self, id: &str) -> bool { self.channels.contains_key(id) }
    #[inline] pub fn get(&self, id: &str) -> Option<&Channel> { self.channels.get(id) }
    #[inline] pub fn get_mut(&mut self, id: &str) -> Option<&mut Channel> { self.channels.get_mut(id) }

    /// Live ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.channels.keys().map(String::as_str)
    }

    /// Remembered volume for `id`, or the default.
    pub fn volume(&self, id: &str) -> f32 {
        self.volumes.get(id).copied().unwrap_or(self.default_volume)
    }

    pub fn remember_volume(&mut self, id: &str, vol: f32) {
        self.volumes.insert(id.to_owned(), vol);
    }

    /// Return the live channel for `id`, creating it if needed. A new channel's
    /// gain starts at `initial_volume`, else the remembered volume, else the default.
    pub fn ensure_channel(
        &mut self,
        graph: &mut AudioGraph,
        master: NodeId,
        id: &str,
        initial_volume: Option<f32>,
    ) -> Result<&mut Channel, GraphError> {
        if !self.channels.contains_key(id) {
            let vol = initial_volume.unwrap_or_else(|| self.volume(id));
            let gain = graph.add(NodeKind::gain(vol));
            if let Err(e) = graph.connect(gain, master).and_then(|()| graph.attach_tap(gain)) {
                graph.remove(gain);
                return Err(e);
            }
            let generation = self.next_generation;
            self.next_generation += 1;
            debug!(sound_id = %id, generation, volume = vol, "channel created");
            self.channels.insert(id.to_owned(), Channel { gain, layers: Vec::new(), generation, fading_out: false });
        }
        self.channels.get_mut(id).ok_or(GraphError::StaleNode)
    }

    /// Tear down `id`'s channel and layers. The remembered volume survives.
    /// Returns false if nothing was live.
    pub fn destroy_channel(&mut self, graph: &mut AudioGraph, id: &str) -> bool {
        match self.channels.remove(id) {
            Some(ch) => {
                ch.teardown(graph);
                debug!(sound_id = %id, generation = ch.generation, "channel destroyed");
                true
            }
            None => false,
        }
    }

    /// Remember `vol` for `id` and, if its channel is live and not fading out,
    /// glide its gain there with time constant `tau`.
    pub fn set_channel_volume(&mut self, graph: &mut AudioGraph, id: &str, vol: f32, tau: f64) {
        self.remember_volume(id, vol);
        if let Some(ch) = self.channels.get(id) {
            if !ch.fading_out {
                approach(graph, ch.gain, vol, tau);
            }
        }
    }

    /// Metering level in [0, 1] of `id`'s channel; 0 when not live.
    pub fn channel_level(&self, graph: &AudioGraph, id: &str) -> f32 {
        self.channels.get(id).and_then(|ch| graph.level(ch.gain)).unwrap_or(0.0)
    }

    /// Instantaneous gain of `id`'s channel.
    pub fn channel_gain(&self, graph: &AudioGraph, id: &str) -> Option<f32> {
        self.channels.get(id).and_then(|ch| graph.param(ch.gain)).map(|p| p.value())
    }

    /// Destroy every channel (engine shutdown).
    pub fn clear(&mut self, graph: &mut AudioGraph) {
        for (_, ch) in std::mem::take(&mut self.channels) {
            ch.teardown(graph);
        }
    }
}

/// The single downstream mixing point, with a metering tap.
#[derive(Copy, Clone, Debug)]
pub struct MasterBus {
    gain: NodeId,
}

impl MasterBus {
    /// Create the master gain at `value`, tap it, and make it the graph output.
    pub fn create(graph: &mut AudioGraph, value: f32) -> Result<Self, GraphError> {
        let gain = graph.add(NodeKind::gain(value));
        graph.attach_tap(gain)?;
        graph.set_output(gain)?;
        Ok(Self { gain })
    }

    #[inline] pub fn node(&self) -> NodeId { self.gain }

    pub fn ramp_to(&self, graph: &mut AudioGraph, target: f32, tau: f64) {
        approach(graph, self.gain, target, tau);
    }

    pub fn level(&self, graph: &AudioGraph) -> f32 {
        graph.level(self.gain).unwrap_or(0.0)
    }

    pub fn gain_value(&self, graph: &AudioGraph) -> f32 {
        graph.param(self.gain).map_or(0.0, |p| p.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Generator;
    use approx::assert_abs_diff_eq;

    const SR: f32 = 1000.0;

    fn setup() -> (AudioGraph, MasterBus, ChannelBus) {
        let mut g = AudioGraph::new(SR);
        let m = MasterBus::create(&mut g, 1.0).unwrap();
        (g, m, ChannelBus::new(1.0))
    }

    #[test]
    fn ensure_channel_is_idempotent() {
        let (mut g, m, mut bus) = setup();
        let first = bus.ensure_channel(&mut g, m.node(), "rain", None).unwrap().generation();
        let second = bus.ensure_channel(&mut g, m.node(), "rain", Some(0.0)).unwrap().generation();
        assert_eq!(first, second);
        assert_eq!(bus.ids().count(), 1);
        // existing channel keeps its gain; `initial_volume` only applies on creation
        assert_eq!(bus.channel_gain(&g, "rain"), Some(1.0));
    }

    #[test]
    fn initial_volume_precedence() {
        let (mut g, m, mut bus) = setup();
        bus.ensure_channel(&mut g, m.node(), "a", Some(0.0)).unwrap();
        assert_eq!(bus.channel_gain(&g, "a"), Some(0.0));

        bus.remember_volume("b", 0.3);
        bus.ensure_channel(&mut g, m.node(), "b", None).unwrap();
        assert_eq!(bus.channel_gain(&g, "b"), Some(0.3));

        bus.ensure_channel(&mut g, m.node(), "c", None).unwrap();
        assert_eq!(bus.channel_gain(&g, "c"), Some(1.0));
    }

    #[test]
    fn destroy_keeps_remembered_volume_and_bumps_generation() {
        let (mut g, m, mut bus) = setup();
        let gen0 = bus.ensure_channel(&mut g, m.node(), "x", None).unwrap().generation();
        bus.set_channel_volume(&mut g, "x", 0.3, 0.08);
        assert!(bus.destroy_channel(&mut g, "x"));
        assert!(!bus.destroy_channel(&mut g, "x"));
        assert_eq!(g.len(), 1);

        let ch = bus.ensure_channel(&mut g, m.node(), "x", None).unwrap();
        assert_ne!(ch.generation(), gen0);
        assert_eq!(bus.channel_gain(&g, "x"), Some(0.3));
    }

    #[test]
    fn volume_changes_glide() {
        let (mut g, m, mut bus) = setup();
        bus.ensure_channel(&mut g, m.node(), "x", None).unwrap();
        bus.set_channel_volume(&mut g, "x", 0.2, 0.08);
        // not a jump
        g.next();
        assert!(bus.channel_gain(&g, "x").unwrap() > 0.9);
        let mut buf = vec![0.0; 1000];
        g.render(&mut buf);
        assert_abs_diff_eq!(bus.channel_gain(&g, "x").unwrap(), 0.2, epsilon = 1e-3);
    }

    #[test]
    fn volume_of_a_dead_channel_is_only_remembered() {
        let (mut g, _m, mut bus) = setup();
        bus.set_channel_volume(&mut g, "ghost", 0.4, 0.08);
        assert!(!bus.contains("ghost"));
        assert_eq!(bus.volume("ghost"), 0.4);
        assert_eq!(bus.channel_level(&g, "ghost"), 0.0);
    }

    #[test]
    fn audibility_threshold() {
        assert!(!is_audible(0.0));
        assert!(!is_audible(AUDIBLE_THRESHOLD));
        assert!(is_audible(0.01));
    }
}
