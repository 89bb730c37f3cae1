/// Parameter checkpoints in safetensors format
use candle_core::{Device, Tensor};
use safetensors::tensor::SafeTensors;
use std::collections::HashMap;
use std::path::Path;

use super::parameter_shapes;
use crate::config::DgdConfig;
use crate::DgdError;

const STEP_KEY: &str = "step";
const CONFIG_KEY: &str = "config";

/// Checkpoint metadata
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckpointMetadata {
    /// Training step the parameters were taken at
    pub step: usize,
    /// Network configuration (as JSON string)
    pub config: Option<String>,
}

impl CheckpointMetadata {
    fn to_header(&self) -> HashMap<String, String> {
        let mut header = HashMap::new();
        header.insert(STEP_KEY.to_string(), self.step.to_string());
        if let Some(ref config) = self.config {
            header.insert(CONFIG_KEY.to_string(), config.clone());
        }
        header
    }

    fn from_header(header: Option<&HashMap<String, String>>) -> Self {
        let Some(header) = header else {
            return Self::default();
        };

        let step = header
            .get(STEP_KEY)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        Self {
            step,
            config: header.get(CONFIG_KEY).cloned(),
        }
    }

    /// Parsed configuration, if one was stored
    pub fn parsed_config(&self) -> crate::Result<Option<DgdConfig>> {
        match self.config {
            Some(ref json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }
}

/// Model checkpoint
pub struct Checkpoint {
    /// Model parameters
    pub tensors: HashMap<String, Tensor>,
    /// Metadata
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Create new checkpoint
    pub fn new(tensors: HashMap<String, Tensor>, metadata: CheckpointMetadata) -> Self {
        Self { tensors, metadata }
    }

    /// Save checkpoint to file, replacing any existing one
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let header = Some(self.metadata.to_header());
        safetensors::serialize_to_file(self.tensors.iter(), &header, path.as_ref())?;

        log::info!(
            "Saved checkpoint with {} tensors to {:?}",
            self.tensors.len(),
            path.as_ref()
        );
        Ok(())
    }

    /// Load checkpoint from file
    ///
    /// # Arguments
    /// * `path` - Path to checkpoint file
    /// * `device` - Device to load tensors on
    pub fn load<P: AsRef<Path>>(path: P, device: &Device) -> crate::Result<Self> {
        let buffer = std::fs::read(path.as_ref())?;

        let (_, header) = SafeTensors::read_metadata(&buffer)?;
        let metadata = CheckpointMetadata::from_header(header.metadata().as_ref());
        let tensors = candle_core::safetensors::load_buffer(&buffer, device)?;

        log::info!(
            "Loaded checkpoint {:?}: {} tensors, step {}",
            path.as_ref(),
            tensors.len(),
            metadata.step
        );

        Ok(Self { tensors, metadata })
    }

    /// Check the stored configuration, if any, against `config`.
    ///
    /// Tensor names and shapes are checked by [`DgdNetwork::from_tensors`].
    ///
    /// [`DgdNetwork::from_tensors`]: crate::models::DgdNetwork::from_tensors
    pub fn validate(&self, config: &DgdConfig) -> crate::Result<()> {
        if let Some(stored) = self.metadata.parsed_config()? {
            if !stored.same_architecture(config) {
                return Err(DgdError::ShapeMismatch(format!(
                    "checkpoint was saved for kernel {} with channels {}/{}/{}, \
                     network expects kernel {} with channels {}/{}/{}",
                    stored.kernel_size,
                    stored.branch_channels,
                    stored.feature_channels,
                    stored.down_channels,
                    config.kernel_size,
                    config.branch_channels,
                    config.feature_channels,
                    config.down_channels,
                )));
            }
        }
        Ok(())
    }
}

/// Require every declared parameter with exactly its declared shape
pub fn validate_tensors(tensors: &HashMap<String, Tensor>, config: &DgdConfig) -> crate::Result<()> {
    let expected = parameter_shapes(config);

    for (name, shape) in &expected {
        let tensor = tensors.get(name).ok_or_else(|| {
            DgdError::ShapeMismatch(format!("checkpoint is missing tensor '{}'", name))
        })?;
        if tensor.dims() != shape.as_slice() {
            return Err(DgdError::ShapeMismatch(format!(
                "tensor '{}' has shape {:?}, network declares {:?}",
                name,
                tensor.dims(),
                shape
            )));
        }
    }

    for name in tensors.keys() {
        if !expected.iter().any(|(n, _)| n == name) {
            log::warn!("Ignoring unexpected checkpoint tensor '{}'", name);
        }
    }

    Ok(())
}

/// Save network parameters to checkpoint
///
/// # Arguments
/// * `params` - Parameters as (name, tensor) pairs
/// * `config` - Configuration recorded in the metadata
/// * `step` - Training step recorded in the metadata
/// * `path` - Path to save checkpoint
pub fn save_checkpoint<P: AsRef<Path>>(
    params: HashMap<String, Tensor>,
    config: &DgdConfig,
    step: usize,
    path: P,
) -> crate::Result<()> {
    let metadata = CheckpointMetadata {
        step,
        config: Some(serde_json::to_string(config)?),
    };
    Checkpoint::new(params, metadata).save(path)
}
