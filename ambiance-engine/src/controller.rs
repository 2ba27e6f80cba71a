//! Playback controller: the engine's public command surface.
//!
//! Policy
//! - **Backgrounds** are exclusive. Playing one crossfades from whatever
//!   background is live: the newcomer ramps linearly from 0 to its volume while
//!   every other live background ramps to 0, all on one shared "now", and each
//!   outgoing channel is torn down `crossfade + margin` later.
//! - **Assets** stack freely and start/stop immediately, without fades.
//! - The audio subsystem is activated lazily by the first play request. A
//!   suspended backend is resumed, never recreated (that would drop every live
//!   channel). If activation fails the request is dropped and retried next time.
//!
//! Failure semantics
//! - Unknown ids, role mismatches, and operations on sounds that are not live
//!   are no-ops (logged at debug level). No command returns an error.
//!
//! Deferred teardowns run from [`PlaybackController::poll`], which every
//! command also calls first.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::backend::{lock, AudioBackend, BackendState, SharedGraph};
use crate::builder::{prepare, PreparedLayer};
use crate::bus::{ChannelBus, MasterBus};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::{AudioGraph, NodeId};
use crate::recipes::{RecipeTable, Role};
use crate::scheduler::TeardownScheduler;

/// Live engine state, present once the backend has been opened.
struct Live {
    graph: SharedGraph,
    master: MasterBus,
}

/// Owner of the graph, the channels and the audio backend.
///
/// One controller per audio device; construct it explicitly and pass it to
/// whatever orchestrates playback.
pub struct PlaybackController<B: AudioBackend> {
    config: EngineConfig,
    recipes: RecipeTable,
    backend: B,
    live: Option<Live>,
    bus: ChannelBus,
    scheduler: TeardownScheduler,
    current_background: Option<String>,
    master_volume: f32,
    muted: bool,
    rng: SmallRng,
}

impl<B: AudioBackend> PlaybackController<B> {
    pub fn new(backend: B, recipes: RecipeTable, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Ok(Self {
            bus: ChannelBus::new(config.default_channel_volume),
            master_volume: config.master_volume,
            config,
            recipes,
            backend,
            live: None,
            scheduler: TeardownScheduler::new(),
            current_background: None,
            muted: false,
            rng,
        })
    }

    // ------------------------------ Activation ------------------------------

    #[inline]
    fn master_target(&self) -> f32 {
        if self.muted { 0.0 } else { self.master_volume }
    }

    /// Make sure the backend is open and running. Returns false if it is not.
    fn activate(&mut self) -> bool {
        if self.live.is_some() {
            if self.backend.state() == BackendState::Suspended {
                if let Err(e) = self.backend.resume() {
                    warn!(error = %e, "audio resume failed; request dropped");
                    return false;
                }
                info!("audio engine resumed");
            }
            return self.backend.state() == BackendState::Running;
        }

        let mut graph = AudioGraph::new(self.backend.sample_rate() as f32);
        let master = match MasterBus::create(&mut graph, self.master_target()) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "master bus creation failed");
                return false;
            }
        };
        let graph = Arc::new(Mutex::new(graph));
        if let Err(e) = self.backend.open(&graph) {
            warn!(error = %e, "audio activation failed; request dropped");
            return false;
        }
        info!(sample_rate = self.backend.sample_rate(), "audio engine activated");
        self.live = Some(Live { graph, master });
        true
    }

    /// Clone of the live graph handle and master node.
    #[inline]
    fn live(&self) -> Option<(SharedGraph, NodeId)> {
        self.live.as_ref().map(|l| (Arc::clone(&l.graph), l.master.node()))
    }

    /// Generate every layer buffer of `id` (no lock held).
    fn prepare_layers(&mut self, id: &str, sample_rate: u32) -> Vec<PreparedLayer> {
        let loop_seconds = self.config.loop_seconds;
        let rng = &mut self.rng;
        self.recipes
            .get(id)
            .map(|r| r.layers.iter().map(|spec| prepare(spec, loop_seconds, sample_rate, rng)).collect())
            .unwrap_or_default()
    }

    /// Create `id`'s channel at `initial_volume` (or its remembered volume) and
    /// wire the prepared layers into it. On failure the channel is torn down.
    fn create_channel(
        &mut self,
        graph: &mut AudioGraph,
        master: NodeId,
        id: &str,
        initial_volume: Option<f32>,
        layers: Vec<PreparedLayer>,
    ) -> bool {
        let channel = match self.bus.ensure_channel(graph, master, id, initial_volume) {
            Ok(ch) => ch,
            Err(e) => {
                warn!(sound_id = %id, error = %e, "channel creation failed");
                return false;
            }
        };
        let dest = channel.gain();
        for prepared in layers {
            match prepared.wire(graph, dest) {
                Ok(layer) => channel.push_layer(layer),
                Err(e) => {
                    warn!(sound_id = %id, error = %e, "layer wiring failed; channel dropped");
                    self.bus.destroy_channel(graph, id);
                    return false;
                }
            }
        }
        true
    }

    /// Resolve `id` against the table, requiring `role`.
    fn check_role(&self, id: &str, role: Role) -> bool {
        match self.recipes.role(id) {
            Some(r) if r == role => true,
            Some(r) => {
                debug!(sound_id = %id, role = ?r, expected = ?role, "role mismatch; ignored");
                false
            }
            None => {
                debug!(sound_id = %id, "unknown sound id; ignored");
                false
            }
        }
    }

    /// Fade `id` to silence starting at `now` and schedule its teardown.
    fn fade_out(&mut self, graph: &mut AudioGraph, id: &str, now: f64) {
        let xf = self.config.crossfade_seconds;
        let due = now + self.config.teardown_delay();
        let Some(ch) = self.bus.get_mut(id) else { return };
        if let Some(p) = graph.param_mut(ch.gain()) {
            p.cancel_and_hold(now);
            p.linear_ramp_to_value_at_time(0.0, now + xf);
        }
        ch.set_fading_out(true);
        self.scheduler.schedule(due, id, ch.generation());
    }

    // ------------------------------ Commands ------------------------------

    /// Crossfade to background `id`. No-op if it already is the current,
    /// non-fading background.
    pub fn play_background(&mut self, id: &str) {
        self.poll();
        if !self.check_role(id, Role::Background) || !self.activate() {
            return;
        }
        let Some((shared, master)) = self.live() else { return };

        let steady = self.current_background.as_deref() == Some(id)
            && self.bus.get(id).is_some_and(|ch| !ch.is_fading_out());
        if steady {
            return;
        }

        let layers = if self.bus.contains(id) {
            Vec::new()
        } else {
            let sr = lock(&shared).sample_rate().round() as u32;
            self.prepare_layers(id, sr)
        };

        let mut g = lock(&shared);
        let now = g.current_time();
        let xf = self.config.crossfade_seconds;

        let outgoing: Vec<String> = self
            .bus
            .ids()
            .filter(|other| *other != id && self.recipes.is_background(other))
            .filter(|other| self.bus.get(other).is_some_and(|ch| !ch.is_fading_out()))
            .map(str::to_owned)
            .collect();
        for old in &outgoing {
            self.fade_out(&mut g, old, now);
        }

        let target = self.bus.volume(id);
        if let Some(ch) = self.bus.get_mut(id) {
            // switching back to a channel that was fading out
            self.scheduler.cancel(id);
            ch.set_fading_out(false);
            if let Some(p) = g.param_mut(ch.gain()) {
                p.cancel_and_hold(now);
                p.linear_ramp_to_value_at_time(target, now + xf);
            }
        } else {
            if !self.create_channel(&mut g, master, id, Some(0.0), layers) {
                return;
            }
            if let Some(p) = self.bus.get(id).and_then(|ch| g.param_mut(ch.gain())) {
                p.set_value_at_time(0.0, now);
                p.linear_ramp_to_value_at_time(target, now + xf);
            }
        }

        info!(
            from = ?outgoing,
            to = %id,
            seconds = xf,
            "background crossfade started"
        );
        self.current_background = Some(id.to_owned());
    }

    /// Fade out the current background and tear it down afterwards.
    pub fn stop_background(&mut self) {
        self.poll();
        let Some(id) = self.current_background.take() else { return };
        let Some((shared, _)) = self.live() else { return };
        let mut g = lock(&shared);
        let now = g.current_time();
        self.fade_out(&mut g, &id, now);
        debug!(sound_id = %id, "background fading out");
    }

    /// Start asset `id` at its remembered volume. No-op if already playing.
    pub fn play_asset(&mut self, id: &str) {
        self.poll();
        if !self.check_role(id, Role::Asset) || !self.activate() {
            return;
        }
        if self.bus.contains(id) {
            return;
        }
        let Some((shared, master)) = self.live() else { return };
        let sr = lock(&shared).sample_rate().round() as u32;
        let layers = self.prepare_layers(id, sr);
        let mut g = lock(&shared);
        if self.create_channel(&mut g, master, id, None, layers) {
            debug!(sound_id = %id, "asset started");
        }
    }

    /// Tear down `id` immediately, whatever its role.
    pub fn stop_asset(&mut self, id: &str) {
        self.poll();
        let Some((shared, _)) = self.live() else { return };
        let mut g = lock(&shared);
        if self.bus.destroy_channel(&mut g, id) {
            self.scheduler.cancel(id);
            if self.current_background.as_deref() == Some(id) {
                self.current_background = None;
            }
        }
    }

    /// Set the master volume; applied immediately unless muted.
    pub fn set_master_volume(&mut self, v: f32) {
        self.poll();
        if !v.is_finite() {
            warn!(volume = v, "non-finite master volume ignored");
            return;
        }
        self.master_volume = v.clamp(0.0, 1.0);
        self.apply_master();
    }

    /// Mute or unmute; the stored master volume is untouched.
    pub fn set_mute(&mut self, muted: bool) {
        self.poll();
        self.muted = muted;
        self.apply_master();
    }

    fn apply_master(&mut self) {
        let target = self.master_target();
        if let Some(live) = &self.live {
            live.master.ramp_to(&mut lock(&live.graph), target, self.config.master_time_constant);
        }
    }

    /// Remember `v` for `id` and glide its live channel there.
    pub fn set_channel_volume(&mut self, id: &str, v: f32) {
        self.poll();
        if !v.is_finite() {
            warn!(sound_id = %id, volume = v, "non-finite channel volume ignored");
            return;
        }
        let v = v.clamp(0.0, 1.0);
        match self.live() {
            Some((shared, _)) => {
                let tau = self.config.channel_time_constant;
                self.bus.set_channel_volume(&mut lock(&shared), id, v, tau);
            }
            None => self.bus.remember_volume(id, v),
        }
    }

    /// Pause the backend. The next play request resumes it.
    pub fn suspend(&mut self) {
        if let Err(e) = self.backend.suspend() {
            warn!(error = %e, "audio suspend failed");
        }
    }

    /// Run deferred teardowns that are due on the audio clock.
    pub fn poll(&mut self) {
        let Some((shared, _)) = self.live() else { return };
        let mut g = lock(&shared);
        for task in self.scheduler.take_due(g.current_time()) {
            let current = self
                .bus
                .get(&task.sound_id)
                .is_some_and(|ch| ch.generation() == task.generation && ch.is_fading_out());
            if current {
                self.bus.destroy_channel(&mut g, &task.sound_id);
                debug!(sound_id = %task.sound_id, "faded channel torn down");
            } else {
                debug!(sound_id = %task.sound_id, generation = task.generation, "stale teardown skipped");
            }
        }
    }

    // ------------------------------ Queries ------------------------------

    /// Metering level in [0, 1] of `id`'s channel; 0 if not live.
    pub fn channel_level(&self, id: &str) -> f32 {
        self.live.as_ref().map_or(0.0, |l| self.bus.channel_level(&lock(&l.graph), id))
    }

    /// Metering level in [0, 1] of the master bus.
    pub fn master_level(&self) -> f32 {
        self.live.as_ref().map_or(0.0, |l| l.master.level(&lock(&l.graph)))
    }

    /// Ids with a live channel (fading-out backgrounds included).
    pub fn active_sound_ids(&self) -> BTreeSet<String> {
        self.bus.ids().map(str::to_owned).collect()
    }

    #[inline] pub fn is_playing(&self, id: &str) -> bool { self.bus.contains(id) }
    #[inline] pub fn current_background(&self) -> Option<&str> { self.current_background.as_deref() }
    #[inline] pub fn master_volume(&self) -> f32 { self.master_volume }
    #[inline] pub fn is_muted(&self) -> bool { self.muted }

    /// Remembered (or default) volume of `id`.
    #[inline] pub fn channel_volume(&self, id: &str) -> f32 { self.bus.volume(id) }

    /// Instantaneous gain of `id`'s channel fader.
    pub fn channel_gain(&self, id: &str) -> Option<f32> {
        self.live.as_ref().and_then(|l| self.bus.channel_gain(&lock(&l.graph), id))
    }

    /// Instantaneous master gain.
    pub fn master_gain(&self) -> Option<f32> {
        self.live.as_ref().map(|l| l.master.gain_value(&lock(&l.graph)))
    }

    /// True once activated and rendering.
    pub fn is_active(&self) -> bool {
        self.live.is_some() && self.backend.state() == BackendState::Running
    }

    /// Seconds on the audio clock (0 before activation).
    pub fn current_time(&self) -> f64 {
        self.live.as_ref().map_or(0.0, |l| lock(&l.graph).current_time())
    }

    /// Deferred teardowns not yet run.
    #[inline] pub fn pending_teardowns(&self) -> usize { self.scheduler.len() }

    #[inline] pub fn recipes(&self) -> &RecipeTable { &self.recipes }
    #[inline] pub fn config(&self) -> &EngineConfig { &self.config }
    #[inline] pub fn backend(&self) -> &B { &self.backend }
    #[inline] pub fn backend_mut(&mut self) -> &mut B { &mut self.backend }
}

impl<B: AudioBackend> Drop for PlaybackController<B> {
    fn drop(&mut self) {
        if let Some(live) = &self.live {
            self.bus.clear(&mut lock(&live.graph));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ManualBackend;

    fn controller() -> PlaybackController<ManualBackend> {
        let cfg = EngineConfig { sample_rate: 4_000, loop_seconds: 1.0, seed: Some(9), ..EngineConfig::default() };
        PlaybackController::new(ManualBackend::new(cfg.sample_rate), RecipeTable::builtin().unwrap(), cfg).unwrap()
    }

    #[test]
    fn nothing_is_live_before_the_first_play() {
        let c = controller();
        assert!(!c.is_active());
        assert_eq!(c.master_level(), 0.0);
        assert_eq!(c.master_gain(), None);
    }

    #[test]
    fn first_play_activates_with_master_volume() {
        let mut c = controller();
        c.play_asset("desk-fan");
        assert!(c.is_active());
        assert_eq!(c.master_gain(), Some(0.6));
        assert!(c.is_playing("desk-fan"));
    }

    #[test]
    fn role_mismatch_is_ignored() {
        let mut c = controller();
        c.play_asset("forest-night");
        c.play_background("desk-fan");
        assert!(c.active_sound_ids().is_empty());
        assert_eq!(c.current_background(), None);
    }

    #[test]
    fn non_finite_volume_is_ignored_and_range_clamped() {
        let mut c = controller();
        c.set_master_volume(f32::NAN);
        assert_eq!(c.master_volume(), 0.6);
        c.set_master_volume(3.0);
        assert_eq!(c.master_volume(), 1.0);
        c.set_channel_volume("desk-fan", -1.0);
        assert_eq!(c.channel_volume("desk-fan"), 0.0);
    }

    #[test]
    fn stale_teardown_spares_a_recreated_channel() {
        let mut c = controller();
        c.play_background("forest-night");
        let generation = c.bus.get("forest-night").unwrap().generation();

        // a task from an earlier instance of the same id
        c.scheduler.schedule(0.0, "forest-night", generation + 100);
        c.poll();
        assert!(c.is_playing("forest-night"));

        // right instance, but the channel is not fading out
        c.scheduler.schedule(0.0, "forest-night", generation);
        c.poll();
        assert!(c.is_playing("forest-night"));
        assert_eq!(c.pending_teardowns(), 0);
    }

    #[test]
    fn stop_asset_cancels_a_pending_fade_teardown() {
        let mut c = controller();
        c.play_background("forest-night");
        c.play_background("winter-wind");
        assert_eq!(c.pending_teardowns(), 1);
        c.stop_asset("forest-night");
        assert_eq!(c.pending_teardowns(), 0);
        assert!(!c.is_playing("forest-night"));
    }

    #[test]
    fn stop_asset_on_a_silent_engine_is_a_no_op() {
        let mut c = controller();
        c.stop_asset("desk-fan");
        c.stop_background();
        c.poll();
        assert!(!c.is_active());
    }
}
