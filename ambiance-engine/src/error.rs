//! Error types for the engine.
//!
//! Command-surface operations on the controller never fail; errors surface only
//! from loaders, constructors, graph wiring and backend activation.

use thiserror::Error;

/// Result alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Invalid recipe data. Fatal at load time.
#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("recipe table is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("recipe with empty id")]
    EmptyId,

    #[error("duplicate recipe id: {id}")]
    DuplicateId { id: String },

    #[error("recipe {id} has no layers")]
    NoLayers { id: String },

    #[error("recipe {id}, layer {layer}: {field} = {value} (must be finite and > 0)")]
    NonPositive { id: String, layer: usize, field: &'static str, value: f32 },

    #[error("recipe {id}, layer {layer}: {field} = {value} (valid range: 0..=1)")]
    OutOfRange { id: String, layer: usize, field: &'static str, value: f32 },
}

/// Invalid engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field} = {value} (must be finite and > 0)")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} = {value} (valid range: 0..=1)")]
    OutOfRange { field: &'static str, value: f32 },
}

/// Structural errors of the node graph.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("node handle is stale or was never allocated")]
    StaleNode,

    #[error("connection would create a cycle")]
    Cycle,

    #[error("node already has a downstream connection")]
    AlreadyConnected,

    #[error("target node has no gain parameter")]
    NotAParam,
}

/// Audio subsystem failures.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("no default output device")]
    NoDevice,

    #[error("requested device not found: {name}")]
    DeviceNotFound { name: String },

    #[error("unsupported device sample format: {format}")]
    UnsupportedFormat { format: String },

    #[error("audio stream error: {details}")]
    Stream { details: String },

    #[error("audio activation denied")]
    ActivationDenied,
}

/// Umbrella error for the engine crate.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
