/// Utility functions for DGD
use candle_core::{Device, Tensor};
use ndarray::{Array4, ArrayView4};
use num_traits::{Float, NumCast};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::DgdError;

/// Truncated normal initialization
///
/// Draws from N(0, std²) and redraws any sample further than two standard
/// deviations from the mean.
pub fn trunc_normal<F: Float, R: Rng>(rng: &mut R, std: F, count: usize) -> Vec<F> {
    let limit = F::one() + F::one();
    (0..count)
        .map(|_| loop {
            let z: f64 = rng.sample(StandardNormal);
            let z = <F as NumCast>::from(z).unwrap_or_else(F::zero);
            if z.abs() <= limit {
                break z * std;
            }
        })
        .collect()
}

/// Calculate the number of parameters in a tensor
pub fn count_parameters(tensor: &Tensor) -> usize {
    tensor.dims().iter().product()
}

/// Convert `[N, y, x, z]` volumes into a `[N, 1, y, x, z]` tensor
pub fn volumes_to_tensor(volumes: ArrayView4<'_, f32>, device: &Device) -> candle_core::Result<Tensor> {
    let (n, y, x, z) = volumes.dim();
    let data: Vec<f32> = volumes.iter().copied().collect();
    Tensor::from_vec(data, (n, 1, y, x, z), device)
}

/// Convert a `[N, 1, y, x, z]` tensor back into `[N, y, x, z]` volumes
pub fn tensor_to_volumes(tensor: &Tensor) -> crate::Result<Array4<f32>> {
    let (n, channels, y, x, z) = tensor.dims5()?;
    if channels != 1 {
        return Err(DgdError::ShapeMismatch(format!(
            "expected a single-channel output, got {:?}",
            tensor.dims()
        )));
    }

    let data = tensor.flatten_all()?.to_vec1::<f32>()?;
    Array4::from_shape_vec((n, y, x, z), data)
        .map_err(|e| DgdError::ShapeMismatch(format!("output reshape failed: {}", e)))
}
