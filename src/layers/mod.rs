/// Neural network layer primitives
///
/// This module contains the building blocks for the DGD update network:
/// - 3D convolution with "same" zero padding
/// - Two-stage convolutional branches (conv + ReLU, twice)

pub mod conv3d;

pub use conv3d::{Conv3d, ConvBranch};
