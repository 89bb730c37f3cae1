/// 3D convolution for volumetric data
///
/// Candle ships 1D and 2D convolutions only. A stride-1 3D convolution is
/// assembled from one 2D convolution per kernel depth tap: the depth axis is
/// folded into the batch, each tap sees the input shifted along depth, and the
/// partial results are summed.
use candle_core::{Module, Result, Tensor};
use candle_nn::VarBuilder;

/// Stride-1 3D convolution with "same" zero padding
///
/// Input and output layout is `[batch, channels, d, h, w]`.
/// Weights are `[out_channels, in_channels, k, k, k]`, bias is `[out_channels]`.
#[derive(Debug)]
pub struct Conv3d {
    weight: Tensor,
    bias: Tensor,
    padding: usize,
}

impl Conv3d {
    /// Create new Conv3d layer
    ///
    /// # Arguments
    /// * `in_channels` - Input channels
    /// * `out_channels` - Output channels
    /// * `kernel_size` - Edge length of the cubic kernel (odd)
    /// * `vb` - VarBuilder holding `weight` and `bias`
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let weight = vb.get(
            (out_channels, in_channels, kernel_size, kernel_size, kernel_size),
            "weight",
        )?;
        let bias = vb.get(out_channels, "bias")?;
        Self::from_parts(weight, bias)
    }

    /// Build from existing tensors, checking that they describe a cubic odd kernel
    pub fn from_parts(weight: Tensor, bias: Tensor) -> Result<Self> {
        let (out_channels, _, kd, kh, kw) = weight.dims5()?;
        if kd != kh || kh != kw || kd % 2 == 0 {
            candle_core::bail!("conv3d kernel must be cubic and odd, got {:?}", weight.dims());
        }
        if bias.dims() != [out_channels] {
            candle_core::bail!(
                "conv3d bias shape {:?} does not match {} output channels",
                bias.dims(),
                out_channels
            );
        }
        Ok(Self {
            weight,
            bias,
            padding: kd / 2,
        })
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }
}

impl Module for Conv3d {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, c_in, depth, height, width) = xs.dims5()?;
        let (c_out, w_in, taps, _, _) = self.weight.dims5()?;
        if c_in != w_in {
            candle_core::bail!(
                "conv3d expects {} input channels, got input shape {:?}",
                w_in,
                xs.dims()
            );
        }

        let padded = xs.pad_with_zeros(2, self.padding, self.padding)?;

        let mut acc: Option<Tensor> = None;
        for tap in 0..taps {
            // [b, c_in, d, h, w] -> [b * d, c_in, h, w]
            let slab = padded
                .narrow(2, tap, depth)?
                .permute((0, 2, 1, 3, 4))?
                .contiguous()?
                .reshape((batch * depth, c_in, height, width))?;
            let kernel = self.weight.narrow(2, tap, 1)?.squeeze(2)?.contiguous()?;
            let partial = slab.conv2d(&kernel, self.padding, 1, 1, 1)?;
            acc = Some(match acc {
                Some(sum) => (sum + partial)?,
                None => partial,
            });
        }

        let out = match acc {
            Some(out) => out,
            None => candle_core::bail!("conv3d kernel has no depth taps"),
        };

        // [b * d, c_out, h, w] -> [b, c_out, d, h, w]
        let out = out
            .reshape((batch, depth, c_out, height, width))?
            .permute((0, 2, 1, 3, 4))?
            .contiguous()?;
        out.broadcast_add(&self.bias.reshape((1, c_out, 1, 1, 1))?)
    }
}

/// Two rectified convolutions: `relu(conv2(relu(conv1(x))))`
#[derive(Debug)]
pub struct ConvBranch {
    conv1: Conv3d,
    conv2: Conv3d,
}

impl ConvBranch {
    /// Create new branch reading `conv1.*` and `conv2.*` from `vb`
    pub fn new(
        in_channels: usize,
        hidden_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let conv1 = Conv3d::new(in_channels, hidden_channels, kernel_size, vb.pp("conv1"))?;
        let conv2 = Conv3d::new(hidden_channels, out_channels, kernel_size, vb.pp("conv2"))?;
        Ok(Self { conv1, conv2 })
    }

    pub fn conv1(&self) -> &Conv3d {
        &self.conv1
    }

    pub fn conv2(&self) -> &Conv3d {
        &self.conv2
    }
}

impl Module for ConvBranch {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let hidden = self.conv1.forward(xs)?.relu()?;
        self.conv2.forward(&hidden)?.relu()
    }
}
