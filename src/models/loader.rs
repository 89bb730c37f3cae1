/// Weight loading from safetensors checkpoints
use std::path::Path;
use candle_core::Device;
use crate::DgdConfig;
use super::checkpoint::Checkpoint;
use super::DgdNetwork;

/// Load model from a checkpoint file
///
/// # Arguments
/// * `config` - Network configuration
/// * `weights_path` - Path to safetensors file
/// * `device` - Device to load model on
///
/// # Returns
/// Network with every parameter restored verbatim. Missing tensors, shapes
/// that differ from the declared architecture, or a stored configuration with
/// a different architecture are reported as `DgdError::ShapeMismatch`.
pub fn load_model<P: AsRef<Path>>(
    config: DgdConfig,
    weights_path: P,
    device: &Device,
) -> crate::Result<DgdNetwork> {
    let checkpoint = Checkpoint::load(weights_path, device)?;
    checkpoint.validate(&config)?;

    let network = DgdNetwork::from_tensors(config, checkpoint.tensors, device)?;
    log::debug!(
        "Restored {} parameters, step length {}",
        network.num_parameters(),
        network.step_length()?
    );

    Ok(network)
}
