use crate::data::LayoutHint;

/// Configuration for one DGD iteration
///
/// The architecture fields mirror the trained network: a 240×240×80 volume,
/// 5×5×5 kernels and 16/32 channel widths. Changing them only makes sense
/// together with a checkpoint trained for the new shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DgdConfig {
    /// Spatial volume size (y, x, z) the network is built for
    pub volume_shape: [usize; 3],

    /// Edge length of the cubic convolution kernels (odd)
    pub kernel_size: usize,

    /// Channels after the first convolution of each branch
    pub branch_channels: usize,

    /// Channels after the second convolution of each branch
    pub feature_channels: usize,

    /// Channels after the first down projection
    pub down_channels: usize,

    /// Name of the current-estimate array in the input file
    pub image_name: String,

    /// Name of the gradient array in the input file
    pub grad_name: String,

    /// Name of the array written to the output file
    pub result_name: String,

    /// How to interpret the leading axes of the input arrays
    #[serde(default)]
    pub layout: LayoutHint,
}

impl Default for DgdConfig {
    fn default() -> Self {
        Self {
            volume_shape: [240, 240, 80],
            kernel_size: 5,
            branch_channels: 16,
            feature_channels: 32,
            down_channels: 16,
            image_name: "imag".to_string(),
            grad_name: "grad".to_string(),
            result_name: "result".to_string(),
            layout: LayoutHint::Auto,
        }
    }
}

impl DgdConfig {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.volume_shape.iter().any(|&d| d == 0) {
            return Err(crate::DgdError::Config(format!(
                "volume_shape must be non-zero, got {:?}",
                self.volume_shape
            )));
        }

        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(crate::DgdError::Config(format!(
                "kernel_size must be odd for same padding, got {}",
                self.kernel_size
            )));
        }

        if self.branch_channels == 0 || self.feature_channels == 0 || self.down_channels == 0 {
            return Err(crate::DgdError::Config(
                "channel widths must be > 0".to_string(),
            ));
        }

        if self.image_name == self.grad_name {
            return Err(crate::DgdError::Config(format!(
                "image and gradient arrays must differ, both are '{}'",
                self.image_name
            )));
        }

        Ok(())
    }

    /// Zero padding on each side that keeps the volume size unchanged
    pub fn padding(&self) -> usize {
        self.kernel_size / 2
    }

    /// Whether two configs describe the same parameter shapes.
    /// The volume size does not enter any parameter, so it is not compared.
    pub fn same_architecture(&self, other: &DgdConfig) -> bool {
        self.kernel_size == other.kernel_size
            && self.branch_channels == other.branch_channels
            && self.feature_channels == other.feature_channels
            && self.down_channels == other.down_channels
    }
}
