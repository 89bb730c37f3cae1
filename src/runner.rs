/// One DGD iteration end to end: load, restore, run, write
use candle_core::Device;
use std::path::{Path, PathBuf};

use crate::config::DgdConfig;
use crate::data::{read_data_sets_with, write_volume_array};
use crate::models::load_model;

/// What a completed iteration produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Number of volumes updated
    pub num_examples: usize,
    /// Shape of the written array `[N, y, x, z]`
    pub output_shape: Vec<usize>,
    /// Step length restored from the checkpoint
    pub step_length: f32,
    /// Where the result was written
    pub output_path: PathBuf,
}

/// Evaluate one iteration of the learned update
///
/// # Arguments
/// * `checkpoint_path` - safetensors file with the trained parameters
/// * `output_path` - container to create with the updated estimate
/// * `input_path` - container holding the current estimate and gradient
/// * `config` - Network configuration and array names
///
/// The whole batch is evaluated in one forward pass. A failure while writing
/// may leave a partial output file behind.
pub fn run_iteration<P, Q, R>(
    checkpoint_path: P,
    output_path: Q,
    input_path: R,
    config: &DgdConfig,
) -> crate::Result<RunSummary>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    config.validate()?;
    let device = Device::Cpu;

    let dataset = read_data_sets_with(
        input_path.as_ref(),
        &config.image_name,
        &config.grad_name,
        config.layout,
    )?;
    let batch_size = dataset.num_examples();
    log::info!("Batch size: {}", batch_size);

    let network = load_model(config.clone(), checkpoint_path.as_ref(), &device)?;
    log::info!("Model restored.");

    let output = network.update(&dataset)?;

    write_volume_array(output_path.as_ref(), &config.result_name, &output)?;
    log::info!("--------------------> DONE <--------------------");

    Ok(RunSummary {
        num_examples: batch_size,
        output_shape: output.shape().to_vec(),
        step_length: network.step_length()?,
        output_path: output_path.as_ref().to_path_buf(),
    })
}
