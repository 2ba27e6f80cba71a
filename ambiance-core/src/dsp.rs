//! Generic DSP utilities and math helpers.
//!
//! Design goals:
//! - `no_std` ready (guarded by the crate feature `no-std`)
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Optional `fast-math` approximations for hot paths
//! - Clean, side-effect free helpers that are easy to test
//!
//! Features used by this file:
//! - `fast-math` : polynomial `fast_sin` (faster, approx.)
//!
//! Conventions:
//! - All functions are `#[inline]` where useful to help the optimizer.
//! - Argument and return domains are documented per function.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // micromath preferred if explicitly requested (works in no_std)
    if #[cfg(feature = "micromath")] {
        use micromath::F32Ext as _;
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] fn m_sqrt(x: f32) -> f32 { x.sqrt() }
        #[inline] fn m_tan(x: f32) -> f32 { x.tan() }
    // libm (C math) in no_std
    } else if #[cfg(feature = "no-std")] {
        #[inline] fn m_sin(x: f32) -> f32 { libm::sinf(x) }
        #[inline] fn m_exp(x: f32) -> f32 { libm::expf(x) }
        #[inline] fn m_sqrt(x: f32) -> f32 { libm::sqrtf(x) }
        #[inline] fn m_tan(x: f32) -> f32 { libm::tanf(x) }
    // std backend
    } else {
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] fn m_sqrt(x: f32) -> f32 { x.sqrt() }
        #[inline] fn m_tan(x: f32) -> f32 { x.tan() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f32 = 1.0e-20;

/// Multiplier applied to a tap's RMS before clamping to 1.0.
///
/// Ambient material sits far below full scale; the factor turns "anything
/// audible" into a usable 0..1 indicator. This is not a calibrated meter.
pub const METER_SENSITIVITY: f32 = 10.0;

/// Number of most recent samples an [`AnalysisTap`] keeps.
pub const TAP_SIZE: usize = 2048;

// --------------------------------- Utilities -------------------------------------

#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x > -EPS_SMALL && x < EPS_SMALL { 0.0 } else { x }
}

// --------------------------------- dB / linear -----------------------------------

/// Resonance or gain in dB to a linear factor, `10^(db/20)`.
/// Anything at or below -120 dB maps to 0.
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    if db <= -120.0 { 0.0 } else { m_exp(0.11512925464970229_f32 * db) } // ln(10)/20
}

// --------------------------------- Fast trig -------------------------------------

/// Sine of `x` (radians).
///
/// With `fast-math` this is a range-reduced 5th-order polynomial (max abs error
/// ~1e-3, plenty for LFO duty); otherwise it is the backend's exact `sin`.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    #[cfg(feature = "fast-math")]
    {
        let mut xr = x;
        let k = (xr / TAU + 0.5).floor();
        xr -= k * TAU;

        // sin(x) ≈ x * (a + b x^2 + c x^4)
        let x2 = xr * xr;
        return xr * (0.999_979_313_3 + x2 * (-0.166_624_432_0 + x2 * 0.008_308_978_98));
    }
    #[cfg(not(feature = "fast-math"))]
    m_sin(x)
}

// --------------------------------- Exponentials / smoothing ----------------------

/// One-pole smoothing coefficient for a time constant `t_ms` (milliseconds).
///
/// The discrete one-pole form: `y[n] = x + (y[n-1] - x) * a`
/// where `a = exp(-1/(tau * sr))` for first-order lag with time constant `tau`.
///
/// `t_ms` is the time to cover ~63% (1 - 1/e) of the distance to the target,
/// which is exactly the "time constant" of an exponential approach.
#[inline]
pub fn one_pole_coeff_ms(t_ms: f32, sr: f32) -> f32 {
    if t_ms <= 0.0 { return 0.0; }
    let tau = t_ms * 0.001;
    m_exp(-1.0 / (tau * sr))
}

/// TPT (Topology-Preserving Transform) `g = tan(π fc / sr)` helper for state-variable filters.
///
/// `fc` is kept just below Nyquist so `tan` never blows up.
#[inline]
pub fn tpt_g(cut_hz: f32, sr: f32) -> f32 {
    let fc = clamp(cut_hz, 0.0, 0.499 * sr);
    m_tan(PI * (fc / sr))
}

// --------------------------------- Analysis tap -----------------------------------

/// Ring of the most recent [`TAP_SIZE`] samples of a signal, for metering.
///
/// A tap has no audio output; it only observes. Samples are stored clamped to
/// [-1, 1], the normalized range the level computation expects.
#[derive(Clone, Debug)]
pub struct AnalysisTap {
    buf: [f32; TAP_SIZE],
    i: usize,
}

impl Default for AnalysisTap {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisTap {
    #[inline]
    pub fn new() -> Self { Self { buf: [0.0; TAP_SIZE], i: 0 } }

    #[inline]
    pub fn push(&mut self, x: f32) {
        self.buf[self.i] = clamp(x, -1.0, 1.0);
        self.i += 1;
        if self.i >= TAP_SIZE { self.i = 0; }
    }

    /// Root mean square of the window.
    pub fn rms(&self) -> f32 {
        let sum: f32 = self.buf.iter().map(|s| s * s).sum();
        m_sqrt(sum / TAP_SIZE as f32)
    }

    /// Perceptual "is anything audible" level in [0, 1]: `min(1, rms * 10)`.
    #[inline]
    pub fn level(&self) -> f32 {
        (self.rms() * METER_SENSITIVITY).min(1.0)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.buf = [0.0; TAP_SIZE];
        self.i = 0;
    }
}

// --------------------------------- Tests (std only) ------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn db_to_lin_matches_power_of_ten() {
        for db in [-20.0_f32, 0.3, 2.0, 6.0] {
            assert_abs_diff_eq!(db_to_lin(db), 10.0_f32.powf(db / 20.0), epsilon = 1e-4);
        }
        assert_eq!(db_to_lin(-150.0), 0.0);
    }

    #[test]
    fn clamp_respects_both_bounds() {
        assert_eq!(clamp(2.0, -1.0, 1.0), 1.0);
        assert_eq!(clamp(-2.0, -1.0, 1.0), -1.0);
        assert_eq!(clamp(0.25, -1.0, 1.0), 0.25);
    }

    #[test]
    fn one_pole_coeff_matches_time_constant() {
        // After tau seconds an exponential approach covers 1 - 1/e of the distance.
        let sr = 1000.0;
        let a = one_pole_coeff_ms(100.0, sr);
        let mut y = 0.0_f32;
        for _ in 0..100 {
            y = 1.0 + (y - 1.0) * a;
        }
        assert_abs_diff_eq!(y, 1.0 - (-1.0_f32).exp(), epsilon = 1e-3);
    }

    #[test]
    fn silent_tap_reads_zero() {
        let tap = AnalysisTap::new();
        assert_eq!(tap.level(), 0.0);
    }

    #[test]
    fn tap_level_scales_rms_and_clamps() {
        let mut tap = AnalysisTap::new();
        for n in 0..TAP_SIZE {
            tap.push(0.05 * (TAU * n as f32 / 64.0).sin());
        }
        // RMS of a sine is amplitude / sqrt(2).
        assert_abs_diff_eq!(tap.level(), 0.05 / 2.0_f32.sqrt() * 10.0, epsilon = 1e-3);

        for _ in 0..TAP_SIZE {
            tap.push(0.9);
        }
        assert_eq!(tap.level(), 1.0);
    }

    #[test]
    fn tap_clamps_out_of_range_samples() {
        let mut tap = AnalysisTap::new();
        for _ in 0..TAP_SIZE {
            tap.push(3.0);
        }
        assert_abs_diff_eq!(tap.rms(), 1.0, epsilon = 1e-6);
    }
}
