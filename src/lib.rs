//! Deep Gradient Descent (DGD) for 3D photoacoustic tomography - Rust implementation
//!
//! Evaluates one learned iteration of model-based reconstruction: given the
//! current image estimate and the physics-model gradient (computed elsewhere),
//! a fixed 3D convolutional network produces the updated estimate.
//!
//! # Architecture
//!
//! The network has two convolutional branches that are summed and projected
//! back to a single-channel correction:
//! - **Prior branch**: 1 → 16 → 32 channels over the current estimate
//! - **Gradient branch**: 1 → 16 → 32 channels over the physics gradient
//! - **Down projection**: 32 → 16 → 1, scaled by a learned step length
//!
//! The correction is added to the estimate and clamped to be non-negative.
//!
//! # Example
//!
//! ```ignore
//! use dgd_pat::{DgdConfig, runner::run_iteration};
//!
//! let config = DgdConfig::default();
//! let summary = run_iteration("model.safetensors", "out.h5", "in.h5", &config)?;
//! ```

pub mod config;
pub mod data;
pub mod layers;
pub mod models;
pub mod runner;
pub mod utils;

// Re-export commonly used items
pub use config::DgdConfig;
pub use data::{PairedDataset, VolumeLayout};
pub use models::DgdNetwork;

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum DgdError {
    /// Requested array is absent or has a rank the layout rules cannot read
    #[error("Format error: {0}")]
    Format(String),

    /// Paired arrays disagree (batch count, channel or spatial dims)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Data or checkpoint shapes disagree with the declared architecture
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("Safetensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),
}

pub type Result<T> = std::result::Result<T, DgdError>;
