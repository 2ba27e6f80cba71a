//! Ambiance Engine: procedural ambient soundscapes from a recipe table.
//!
//! Crate layout:
//! - [`param`]      : sample-accurate parameter automation (set / ramp / target)
//! - [`nodes`]      : oscillators, looping sources, the closed node set
//! - [`graph`]      : `Generator` trait and the arena-backed `AudioGraph`
//! - [`recipes`]    : validated layer recipes, built-in table
//! - [`builder`]    : recipe layer → live source/filter/gain(/LFO) chain
//! - [`bus`]        : per-sound channel buses, master bus, metering
//! - [`scheduler`]  : generation-guarded deferred teardowns
//! - [`backend`]    : activation seam + pull-driven backend
//! - [`realtime`]   : CPAL output backend (feature `realtime`)
//! - [`controller`] : the public command surface
//!
//! Noise buffers are generated when a sound starts, outside the graph lock;
//! the render path itself does no heap work per sample. Graph edits (and the
//! order rebuild they trigger) run on the control thread under the graph lock.

pub mod backend;
pub mod builder;
pub mod bus;
pub mod config;
pub mod controller;
pub mod error;
pub mod graph;
pub mod nodes;
pub mod param;
pub mod recipes;
pub mod scheduler;

#[cfg(feature = "realtime")]
pub mod realtime;

// Re-export some commonly used items to make downstream imports ergonomic.
pub use backend::{AudioBackend, BackendState, ManualBackend, SharedGraph};
pub use bus::is_audible;
pub use config::EngineConfig;
pub use controller::PlaybackController;
pub use error::{BackendError, ConfigError, EngineError, GraphError, RecipeError};
pub use graph::{AudioGraph, Generator, NodeId};
pub use recipes::{LayerSpec, LfoSpec, Recipe, RecipeTable, Role};

#[cfg(feature = "realtime")]
pub use realtime::{CpalBackend, DeviceRequest};
