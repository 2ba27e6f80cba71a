#![cfg_attr(not(feature = "std"), no_std)]
//! Ambiance Core: no_std-ready DSP primitives for procedural soundscapes.
//!
//! Features
//! - `std`      : (default) use the Rust standard library; enables [`noise::generate`]
//! - `no-std`   : build with `#![no_std]` and use `libm`/`micromath` math backends
//! - `fast-math`: polynomial sine for oscillators
//! - `serde`    : serde derives on [`noise::NoiseColor`] and [`filters::SvfMode`]
//!
//! Modules
//! - [`dsp`]     : math backend, utils (db/lin, smoothing coefficients, analysis tap)
//! - [`filters`] : TPT state-variable filter (LP/HP/BP)
//! - [`noise`]   : white / pink / brown / velvet noise generators
//!
//! Design
//! - No heap allocations outside `noise::generate`
//! - Sample-by-sample stateful primitives, friendly to real-time callbacks

pub mod dsp;
pub mod filters;
pub mod noise;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::dsp::{
        clamp, db_to_lin, fast_sin, kill_denormals, one_pole_coeff_ms, tpt_g,
        AnalysisTap, METER_SENSITIVITY, TAP_SIZE, TAU,
    };
    pub use crate::filters::{SvfMode, SvfTpt};
    pub use crate::noise::{NoiseColor, NoiseGen};
}
