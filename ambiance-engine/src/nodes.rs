//! Building blocks (nodes) of the render graph.
//!
//! These are per-sample components designed for realtime use; none of them
//! allocates while rendering.
//!
//! Contents:
//! - `Wave`, `Osc`  : low-frequency oscillators (Sine/Triangle) with stable phase wrap
//! - `LoopSource`   : looping playback of a shared noise buffer from a start offset
//! - `NodeKind`     : the closed set of node variants the graph knows how to render
//! - `NodeRole`     : payload-free tag of a `NodeKind`, used for ownership lists
//!
//! Notes:
//! - Frequency is **Hz**; oscillators expect the current **sample rate** when stepping.
//! - Oscillator output is bipolar in [-1, 1]; scaling happens in a downstream gain node.

use std::sync::Arc;

use ambiance_core::dsp::{fast_sin, TAU};
use ambiance_core::filters::SvfTpt;

use crate::param::Param;

/// Oscillator waveform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wave { Sine, Triangle }

/// Both waves start at 0 and rise, so a freshly started LFO begins at its centre.
#[inline]
fn osc_sample(phase01: f32, wave: Wave) -> f32 {
    match wave {
        Wave::Sine     => fast_sin(TAU * phase01),
        Wave::Triangle => 1.0 - 4.0 * ((phase01 + 0.25).fract() - 0.5).abs(),
    }
}

/// Free-running oscillator for LFO duty.
#[derive(Copy, Clone, Debug)]
pub struct Osc {
    phase: f32,   // [0,1)
    freq:  f32,   // Hz
    wave:  Wave,
}

impl Osc {
    #[inline] pub fn new(freq_hz: f32, wave: Wave) -> Self { Self { phase: 0.0, freq: freq_hz.max(0.0), wave } }
    #[inline] pub fn sine(rate_hz: f32) -> Self { Self::new(rate_hz, Wave::Sine) }
    #[inline] pub fn triangle(rate_hz: f32) -> Self { Self::new(rate_hz, Wave::Triangle) }

    /// Return the current sample and advance the phase by one sample.
    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        let s = osc_sample(self.phase, self.wave);
        self.phase = (self.phase + self.freq / sr) % 1.0;
        s
    }
}

/// Looping reader over an immutable sample buffer.
#[derive(Clone, Debug)]
pub struct LoopSource {
    buf: Arc<[f32]>,
    pos: usize,
}

impl LoopSource {
    /// Start reading at `offset` (wrapped into the buffer).
    pub fn new(buf: Arc<[f32]>, offset: usize) -> Self {
        let pos = if buf.is_empty() { 0 } else { offset % buf.len() };
        Self { buf, pos }
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        let Some(&s) = self.buf.get(self.pos) else { return 0.0 };
        self.pos += 1;
        if self.pos >= self.buf.len() { self.pos = 0; }
        s
    }
}

/// Node role, without the payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole { Source, Filter, Gain, Oscillator }

/// The closed set of node variants.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Looping buffer playback; ignores audio inputs.
    Source(LoopSource),
    /// State-variable filter over the summed audio inputs.
    Filter(SvfTpt),
    /// `out = in * (param + sum of param-connected inputs)`.
    Gain(Param),
    /// LFO; ignores audio inputs.
    Oscillator(Osc),
}

impl NodeKind {
    #[inline]
    pub fn role(&self) -> NodeRole {
        match self {
            NodeKind::Source(_) => NodeRole::Source,
            NodeKind::Filter(_) => NodeRole::Filter,
            NodeKind::Gain(_) => NodeRole::Gain,
            NodeKind::Oscillator(_) => NodeRole::Oscillator,
        }
    }

    /// Gain node with an initial parameter value.
    #[inline] pub fn gain(value: f32) -> Self { NodeKind::Gain(Param::new(value)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sine_starts_at_zero_and_peaks_at_quarter_period() {
        let sr = 1000.0;
        let mut osc = Osc::sine(1.0);
        assert_abs_diff_eq!(osc.next(sr), 0.0, epsilon = 1e-3);
        for _ in 1..250 {
            osc.next(sr);
        }
        assert_abs_diff_eq!(osc.next(sr), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn triangle_shape() {
        let pts = [(0.0, 0.0), (0.25, 1.0), (0.5, 0.0), (0.75, -1.0), (0.125, 0.5)];
        for (p, want) in pts {
            assert_abs_diff_eq!(osc_sample(p, Wave::Triangle), want, epsilon = 1e-6);
        }
    }

    #[test]
    fn loop_source_wraps_and_honours_offset() {
        let buf: Arc<[f32]> = Arc::from(vec![1.0, 2.0, 3.0]);
        let mut src = LoopSource::new(buf, 4);
        let got: Vec<f32> = (0..5).map(|_| src.next()).collect();
        assert_eq!(got, vec![2.0, 3.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn empty_loop_source_is_silent() {
        let mut src = LoopSource::new(Arc::from(Vec::<f32>::new()), 10);
        assert_eq!(src.next(), 0.0);
    }
}
