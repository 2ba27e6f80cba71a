//! Stochastic noise sources.
//!
//! Four colours, each a per-sample process driven by a uniform random source:
//! - `White`  : i.i.d. uniform in [-1, 1)
//! - `Pink`   : Paul Kellet's refined 7-term IIR approximation (≈ -3 dB/oct)
//! - `Brown`  : leaky integrator of white noise, rescaled to be audible
//! - `Velvet` : sparse random impulses (crackle/grain textures)
//!
//! [`NoiseGen`] carries the filter state between samples and never allocates.
//! With the `std` feature, [`generate`] fills an owned buffer of a given length,
//! which is how the engine prepares its looping layer sources.

use rand::Rng;

/// Gain applied to brown noise after integration. The integrator attenuates
/// heavily; this fixed factor brings it back to a level comparable to the others.
pub const BROWN_MAKEUP: f32 = 3.5;

/// Probability that a velvet sample carries an impulse.
pub const VELVET_DENSITY: f64 = 0.002;

/// Peak magnitude of velvet impulses.
pub const VELVET_PEAK: f32 = 0.8;

/// Pole coefficients of the six pink-noise one-pole stages.
const PINK_POLES: [f32; 6] = [0.99886, 0.99332, 0.96900, 0.86650, 0.55000, -0.7616];
/// Per-stage weights applied to the shared white input.
const PINK_WEIGHTS: [f32; 6] = [0.0555179, 0.0750759, 0.1538520, 0.3104856, 0.5329522, -0.0168980];
const PINK_DIRECT: f32 = 0.5362;
const PINK_CARRY: f32 = 0.115926;
const PINK_SCALE: f32 = 0.11;

/// Noise colour, i.e. which stochastic process fills the buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NoiseColor {
    White,
    Pink,
    Brown,
    Velvet,
}

impl NoiseColor {
    pub const ALL: [NoiseColor; 4] = [Self::White, Self::Pink, Self::Brown, Self::Velvet];

    pub fn name(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Pink => "pink",
            Self::Brown => "brown",
            Self::Velvet => "velvet",
        }
    }
}

/// Stateful noise generator for one colour.
#[derive(Copy, Clone, Debug)]
pub struct NoiseGen {
    color: NoiseColor,
    // brown: previous (unscaled) integrator output
    last: f32,
    // pink: six filter states plus the delayed direct term
    pink: [f32; 6],
    carry: f32,
}

impl NoiseGen {
    #[inline]
    pub fn new(color: NoiseColor) -> Self {
        Self { color, last: 0.0, pink: [0.0; 6], carry: 0.0 }
    }

    #[inline] pub fn color(&self) -> NoiseColor { self.color }

    #[inline]
    fn white<R: Rng + ?Sized>(rng: &mut R) -> f32 {
        rng.gen::<f32>() * 2.0 - 1.0
    }

    /// Produce the next sample.
    #[inline]
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f32 {
        match self.color {
            NoiseColor::White => Self::white(rng),
            NoiseColor::Brown => {
                let w = Self::white(rng);
                self.last = (self.last + 0.02 * w) / 1.02;
                self.last * BROWN_MAKEUP
            }
            NoiseColor::Pink => {
                let w = Self::white(rng);
                let mut sum = 0.0;
                for ((b, pole), weight) in self.pink.iter_mut().zip(PINK_POLES).zip(PINK_WEIGHTS) {
                    *b = pole * *b + w * weight;
                    sum += *b;
                }
                // The carried term joins the sum one sample late.
                let y = (sum + self.carry + w * PINK_DIRECT) * PINK_SCALE;
                self.carry = w * PINK_CARRY;
                y
            }
            NoiseColor::Velvet => {
                if rng.gen_bool(VELVET_DENSITY) {
                    Self::white(rng) * VELVET_PEAK
                } else {
                    0.0
                }
            }
        }
    }

    /// Fill `out` sample by sample, continuing from the current state.
    pub fn fill<R: Rng + ?Sized>(&mut self, out: &mut [f32], rng: &mut R) {
        for y in out.iter_mut() {
            *y = self.next(rng);
        }
    }
}

/// Number of frames in a buffer of `duration_s` seconds at `sample_rate`.
#[inline]
pub fn frames_for(duration_s: f32, sample_rate: u32) -> usize {
    let n = f64::from(duration_s.max(0.0)) * f64::from(sample_rate);
    // rounding keeps e.g. 0.1 s @ 44.1 kHz at exactly 4410 frames
    (n + 0.5) as usize
}

/// Generate a mono buffer of `duration_s * sample_rate` samples of `color` noise.
#[cfg(feature = "std")]
pub fn generate<R: Rng + ?Sized>(
    color: NoiseColor,
    duration_s: f32,
    sample_rate: u32,
    rng: &mut R,
) -> Vec<f32> {
    let mut buf = vec![0.0; frames_for(duration_s, sample_rate)];
    NoiseGen::new(color).fill(&mut buf, rng);
    buf
}

// ------------------------------------ Tests --------------------------------------
