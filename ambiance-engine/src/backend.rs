//! Audio backends: the seam between the engine and whatever pulls samples.
//!
//! The controller owns the graph behind a [`SharedGraph`] and hands it to a
//! backend on activation. Two implementations:
//! - [`ManualBackend`]: the caller pulls audio explicitly (tests, offline
//!   rendering, FFI hosts with their own audio callback)
//! - `CpalBackend` (feature `realtime`): an output stream on a device
//!
//! Notes
//! - A suspended backend renders silence and the audio clock stands still.
//! - Locks recover from poisoning; a panic elsewhere must not silence the engine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::BackendError;
use crate::graph::{AudioGraph, Generator};

/// Graph shared between the controller and the backend's render path.
pub type SharedGraph = Arc<Mutex<AudioGraph>>;

/// Lock the graph, recovering the guard if a previous holder panicked.
#[inline]
pub fn lock(graph: &SharedGraph) -> MutexGuard<'_, AudioGraph> {
    graph.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle of the audio subsystem.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackendState {
    /// Not opened yet (or opening failed).
    Closed,
    Running,
    /// Opened but paused (power saving, or no activation gesture yet).
    Suspended,
}

/// Something that drives an [`AudioGraph`] at a sample rate.
pub trait AudioBackend {
    /// Start rendering `graph`. A backend may re-tune the graph to the rate it
    /// actually obtained.
    fn open(&mut self, graph: &SharedGraph) -> Result<(), BackendError>;

    fn state(&self) -> BackendState;

    fn resume(&mut self) -> Result<(), BackendError>;

    fn suspend(&mut self) -> Result<(), BackendError>;

    /// Rate the backend renders at (the requested rate before `open`).
    fn sample_rate(&self) -> u32;
}

// ------------------------------ Manual backend ------------------------------

/// Pull-driven backend: nothing renders unless the caller asks for samples.
#[derive(Debug)]
pub struct ManualBackend {
    sr: u32,
    state: BackendState,
    graph: Option<SharedGraph>,
    deny_activation: bool,
    scratch: Vec<f32>,
}

impl ManualBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self { sr: sample_rate.max(1), state: BackendState::Closed, graph: None, deny_activation: false, scratch: Vec::new() }
    }

    /// When set, `open` and `resume` fail with [`BackendError::ActivationDenied`],
    /// like a host that has not seen a user gesture yet.
    pub fn set_deny_activation(&mut self, deny: bool) {
        self.deny_activation = deny;
    }

    #[inline] pub fn is_open(&self) -> bool { self.graph.is_some() }

    /// Render mono samples into `out`. Silence (and a frozen clock) unless running.
    pub fn render_mono(&mut self, out: &mut [f32]) {
        match (&self.graph, self.state) {
            (Some(graph), BackendState::Running) => lock(graph).render(out),
            _ => out.fill(0.0),
        }
    }

    /// Render interleaved frames, the mono signal duplicated to every channel.
    /// Returns the number of frames written.
    pub fn render_interleaved(&mut self, out: &mut [f32], channels: usize) -> usize {
        if channels == 0 {
            return 0;
        }
        let (Some(graph), BackendState::Running) = (&self.graph, self.state) else {
            out.fill(0.0);
            return out.len() / channels;
        };
        let mut g = lock(graph);
        let mut frames = 0;
        for frame in out.chunks_exact_mut(channels) {
            let s = g.next();
            frame.fill(s);
            frames += 1;
        }
        frames
    }

    /// Render and discard `seconds` of audio, advancing the clock.
    pub fn advance_seconds(&mut self, seconds: f64) {
        let mut remaining = (seconds.max(0.0) * f64::from(self.sr)).round() as usize;
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(1024, 0.0);
        while remaining > 0 {
            let n = remaining.min(scratch.len());
            self.render_mono(&mut scratch[..n]);
            remaining -= n;
        }
        self.scratch = scratch;
    }
}

impl AudioBackend for ManualBackend {
    fn open(&mut self, graph: &SharedGraph) -> Result<(), BackendError> {
        if self.deny_activation {
            return Err(BackendError::ActivationDenied);
        }
        lock(graph).reset(self.sr as f32);
        self.graph = Some(Arc::clone(graph));
        self.state = BackendState::Running;
        debug!(sample_rate = self.sr, "manual backend opened");
        Ok(())
    }

    #[inline] fn state(&self) -> BackendState { self.state }

    fn resume(&mut self) -> Result<(), BackendError> {
        if self.deny_activation {
            return Err(BackendError::ActivationDenied);
        }
        if self.state == BackendState::Suspended {
            self.state = BackendState::Running;
        }
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), BackendError> {
        if self.state == BackendState::Running {
            self.state = BackendState::Suspended;
        }
        Ok(())
    }

    #[inline] fn sample_rate(&self) -> u32 { self.sr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{LoopSource, NodeKind};

    fn dc_graph(sr: f32) -> SharedGraph {
        let mut g = AudioGraph::new(sr);
        let m = g.add(NodeKind::gain(1.0));
        let s = g.add(NodeKind::Source(LoopSource::new(Arc::from(vec![0.5_f32; 4]), 0)));
        g.connect(s, m).unwrap();
        g.set_output(m).unwrap();
        Arc::new(Mutex::new(g))
    }

    #[test]
    fn closed_backend_renders_silence() {
        let mut b = ManualBackend::new(100);
        let mut out = vec![1.0; 8];
        b.render_mono(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(b.state(), BackendState::Closed);
    }

    #[test]
    fn interleaved_duplicates_mono() {
        let graph = dc_graph(100.0);
        let mut b = ManualBackend::new(100);
        b.open(&graph).unwrap();
        let mut out = vec![0.0; 6];
        assert_eq!(b.render_interleaved(&mut out, 2), 3);
        assert!(out.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn suspended_clock_stands_still() {
        let graph = dc_graph(100.0);
        let mut b = ManualBackend::new(100);
        b.open(&graph).unwrap();
        b.advance_seconds(1.0);
        assert!((lock(&graph).current_time() - 1.0).abs() < 1e-9);

        b.suspend().unwrap();
        b.advance_seconds(1.0);
        let mut out = vec![1.0; 4];
        b.render_mono(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!((lock(&graph).current_time() - 1.0).abs() < 1e-9);

        b.resume().unwrap();
        assert_eq!(b.state(), BackendState::Running);
    }

    #[test]
    fn denied_activation_fails_open_and_resume() {
        let graph = dc_graph(100.0);
        let mut b = ManualBackend::new(100);
        b.set_deny_activation(true);
        assert!(matches!(b.open(&graph), Err(BackendError::ActivationDenied)));
        assert_eq!(b.state(), BackendState::Closed);
        b.set_deny_activation(false);
        b.open(&graph).unwrap();
        b.suspend().unwrap();
        b.set_deny_activation(true);
        assert!(b.resume().is_err());
        assert_eq!(b.state(), BackendState::Suspended);
    }

    #[test]
    fn open_retunes_graph_rate() {
        let graph = dc_graph(48_000.0);
        let mut b = ManualBackend::new(8_000);
        b.open(&graph).unwrap();
        assert_eq!(lock(&graph).sample_rate(), 8_000.0);
    }
}
