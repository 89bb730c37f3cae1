/// DGD update network
use candle_core::{Device, DType, Module, Result, Tensor};
use candle_nn::VarBuilder;
use ndarray::Array4;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

use crate::config::DgdConfig;
use crate::data::PairedDataset;
use crate::layers::{Conv3d, ConvBranch};
use crate::utils::{count_parameters, tensor_to_volumes, trunc_normal, volumes_to_tensor};
use crate::DgdError;

pub mod checkpoint;
pub mod loader;

pub use checkpoint::{Checkpoint, CheckpointMetadata};
pub use loader::load_model;

/// Name of the scalar step-length parameter
pub const STEP_LENGTH: &str = "step_length";

const INIT_WEIGHT_STD: f32 = 0.01;
const INIT_BIAS: f32 = 0.01;
const INIT_STEP_LENGTH: f32 = 1.0;

/// Every parameter the network declares, with its exact shape
pub fn parameter_shapes(config: &DgdConfig) -> Vec<(String, Vec<usize>)> {
    let k = config.kernel_size;
    let conv = |prefix: &str, c_in: usize, c_out: usize| {
        [
            (format!("{}.weight", prefix), vec![c_out, c_in, k, k, k]),
            (format!("{}.bias", prefix), vec![c_out]),
        ]
    };

    let mut shapes = Vec::new();
    for branch in ["prior", "gradient"] {
        shapes.extend(conv(&format!("{}.conv1", branch), 1, config.branch_channels));
        shapes.extend(conv(
            &format!("{}.conv2", branch),
            config.branch_channels,
            config.feature_channels,
        ));
    }
    shapes.extend(conv("down1", config.feature_channels, config.down_channels));
    shapes.extend(conv("down2", config.down_channels, 1));
    shapes.push((STEP_LENGTH.to_string(), Vec::new()));
    shapes
}

/// One learned iteration of gradient descent
///
/// The prior branch sees the current estimate, the gradient branch sees the
/// physics gradient. Their features are summed, projected to one channel,
/// scaled by the step length and added to the estimate:
///
/// `out = relu(x + λ · down2(relu(down1(prior(x) + gradient(g)))))`
#[derive(Debug)]
pub struct DgdNetwork {
    config: DgdConfig,
    prior: ConvBranch,
    gradient: ConvBranch,
    down1: Conv3d,
    down2: Conv3d,
    step_length: Tensor,
    device: Device,
}

impl DgdNetwork {
    /// Create network from a VarBuilder holding every declared parameter
    pub fn new(config: DgdConfig, vb: VarBuilder) -> crate::Result<Self> {
        config.validate()?;

        let device = vb.device().clone();
        let k = config.kernel_size;

        let prior = ConvBranch::new(
            1,
            config.branch_channels,
            config.feature_channels,
            k,
            vb.pp("prior"),
        )?;
        let gradient = ConvBranch::new(
            1,
            config.branch_channels,
            config.feature_channels,
            k,
            vb.pp("gradient"),
        )?;
        let down1 = Conv3d::new(config.feature_channels, config.down_channels, k, vb.pp("down1"))?;
        let down2 = Conv3d::new(config.down_channels, 1, k, vb.pp("down2"))?;
        let step_length = vb.get((), STEP_LENGTH)?;

        Ok(Self {
            config,
            prior,
            gradient,
            down1,
            down2,
            step_length,
            device,
        })
    }

    /// Create network from named tensors, rejecting missing or misshapen ones
    pub fn from_tensors(
        config: DgdConfig,
        tensors: HashMap<String, Tensor>,
        device: &Device,
    ) -> crate::Result<Self> {
        checkpoint::validate_tensors(&tensors, &config)?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        Self::new(config, vb)
    }

    /// Freshly initialised network: truncated-normal weights (σ = 0.01),
    /// biases of 0.01 and a unit step length
    pub fn random(config: DgdConfig, seed: u64, device: &Device) -> crate::Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tensors = HashMap::new();

        for (name, shape) in parameter_shapes(&config) {
            let count: usize = shape.iter().product();
            let values = if name == STEP_LENGTH {
                vec![INIT_STEP_LENGTH]
            } else if name.ends_with(".bias") {
                vec![INIT_BIAS; count]
            } else {
                trunc_normal(&mut rng, INIT_WEIGHT_STD, count)
            };
            tensors.insert(name, Tensor::from_vec(values, shape, device)?);
        }

        Self::from_tensors(config, tensors, device)
    }

    /// Learned step length λ
    pub fn step_length(&self) -> crate::Result<f32> {
        Ok(self.step_length.to_scalar::<f32>()?)
    }

    /// All parameters keyed by their checkpoint names
    pub fn tensors(&self) -> HashMap<String, Tensor> {
        let mut tensors = HashMap::new();
        let mut insert = |prefix: &str, conv: &Conv3d| {
            tensors.insert(format!("{}.weight", prefix), conv.weight().clone());
            tensors.insert(format!("{}.bias", prefix), conv.bias().clone());
        };

        insert("prior.conv1", self.prior.conv1());
        insert("prior.conv2", self.prior.conv2());
        insert("gradient.conv1", self.gradient.conv1());
        insert("gradient.conv2", self.gradient.conv2());
        insert("down1", &self.down1);
        insert("down2", &self.down2);
        tensors.insert(STEP_LENGTH.to_string(), self.step_length.clone());
        tensors
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> usize {
        self.tensors().values().map(count_parameters).sum()
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `image` - Current estimate [batch, 1, y, x, z]
    /// * `grad` - Physics gradient [batch, 1, y, x, z]
    ///
    /// # Returns
    /// Updated estimate [batch, 1, y, x, z], non-negative
    pub fn forward(&self, image: &Tensor, grad: &Tensor) -> Result<Tensor> {
        let h_prior = self.prior.forward(image)?;
        let h_grad = self.gradient.forward(grad)?;
        let h_sum = (h_prior + h_grad)?;

        let h_down = self.down1.forward(&h_sum)?.relu()?;
        let step = self.step_length.reshape((1, 1, 1, 1, 1))?;
        let correction = self.down2.forward(&h_down)?.broadcast_mul(&step)?;

        (image + correction)?.relu()
    }

    /// Fail unless `spatial` equals the volume size the network is built for
    pub fn check_volume(&self, spatial: [usize; 3]) -> crate::Result<()> {
        if spatial != self.config.volume_shape {
            return Err(DgdError::ShapeMismatch(format!(
                "input volume {:?} does not match network volume {:?}",
                spatial, self.config.volume_shape
            )));
        }
        Ok(())
    }

    /// Run the update over every example of a dataset at once
    pub fn update(&self, dataset: &PairedDataset) -> crate::Result<Array4<f32>> {
        if dataset.is_empty() {
            return Err(DgdError::Validation("dataset holds no volumes".to_string()));
        }
        self.check_volume(dataset.spatial_shape())?;

        let image = volumes_to_tensor(dataset.images(), &self.device)?;
        let grad = volumes_to_tensor(dataset.grad(), &self.device)?;

        let output = self.forward(&image, &grad)?;
        tensor_to_volumes(&output)
    }
}
