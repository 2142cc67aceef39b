//! CNN for 32x32 DermaMNIST images.
//!
//! Eight Conv-BN-ReLU blocks widen the feature maps from `w` to `4w` channels
//! while two stride-2 blocks shrink 32x32 to 8x8. Global average pooling and a
//! linear head then produce one logit per lesion class.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use derma_core::{ModelConfig, CHANNELS};

/// Configuration for [`DermaCnn`]
#[derive(Config, Debug)]
pub struct DermaCnnConfig {
    #[config(default = "7")]
    pub num_classes: usize,

    #[config(default = "3")]
    pub in_channels: usize,

    /// Width `w` of the first stage; later stages use `2w` and `4w`
    #[config(default = "64")]
    pub base_channels: usize,
}

impl From<&ModelConfig> for DermaCnnConfig {
    fn from(config: &ModelConfig) -> Self {
        Self::new()
            .with_num_classes(config.num_classes)
            .with_in_channels(CHANNELS)
            .with_base_channels(config.base_channels)
    }
}

/// One row of the block table: output width as a multiple of `w`, then
/// kernel, stride and padding
#[derive(Debug, Clone, Copy)]
struct BlockSpec {
    width: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
}

const fn block(width: usize, kernel: usize, stride: usize, padding: usize) -> BlockSpec {
    BlockSpec {
        width,
        kernel,
        stride,
        padding,
    }
}

const BLOCKS: [BlockSpec; 8] = [
    block(1, 5, 1, 2),
    block(1, 3, 1, 1),
    block(1, 3, 1, 1),
    block(2, 3, 2, 1),
    block(2, 3, 1, 1),
    block(2, 3, 1, 1),
    block(4, 3, 2, 1),
    block(4, 3, 1, 1),
];

/// Conv2d (no bias) -> BatchNorm -> ReLU
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct DermaCnn<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub head: Linear<B>,
}

impl DermaCnnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DermaCnn<B> {
        let mut in_channels = self.in_channels;
        let blocks = BLOCKS
            .iter()
            .map(|spec| {
                let out_channels = spec.width * self.base_channels;
                let block = ConvBlock::new(in_channels, out_channels, spec.kernel, spec.stride, spec.padding, device);
                in_channels = out_channels;
                block
            })
            .collect();

        DermaCnn {
            blocks,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: LinearConfig::new(in_channels, self.num_classes).init(device),
        }
    }
}

impl<B: Backend> DermaCnn<B> {
    /// `[n, 3, H, W]` images to `[n, num_classes]` logits
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self
            .blocks
            .iter()
            .fold(images, |x, block| block.forward(x));

        let pooled = self.global_pool.forward(features);
        let [batch, channels, _, _] = pooled.dims();
        self.head.forward(pooled.reshape([batch, channels]))
    }

    pub fn num_classes(&self) -> usize {
        self.head.weight.dims()[1]
    }

    /// Name and shape of every trainable tensor, in layer order
    pub fn parameter_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let mut shapes = Vec::with_capacity(self.blocks.len() * 3 + 2);
        for (i, block) in self.blocks.iter().enumerate() {
            shapes.push((format!("blocks.{i}.conv.weight"), block.conv.weight.dims().to_vec()));
            shapes.push((format!("blocks.{i}.bn.gamma"), block.bn.gamma.dims().to_vec()));
            shapes.push((format!("blocks.{i}.bn.beta"), block.bn.beta.dims().to_vec()));
        }
        shapes.push(("head.weight".to_string(), self.head.weight.dims().to_vec()));
        if let Some(bias) = &self.head.bias {
            shapes.push(("head.bias".to_string(), bias.dims().to_vec()));
        }
        shapes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> DermaCnnConfig {
        DermaCnnConfig::new().with_base_channels(4)
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model: DermaCnn<TestBackend> = small_config().init(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [2, 7]);
    }

    #[test]
    fn test_forward_accepts_native_resolution() {
        let device = Default::default();
        let model: DermaCnn<TestBackend> = small_config().init(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 28, 28], &device);
        assert_eq!(model.forward(input).dims(), [1, 7]);
    }

    #[test]
    fn test_block_table_widths() {
        let device = Default::default();
        let model: DermaCnn<TestBackend> = small_config().init(&device);

        assert_eq!(model.blocks.len(), 8);
        let widths: Vec<usize> = model.blocks.iter().map(|b| b.conv.weight.dims()[0]).collect();
        assert_eq!(widths, vec![4, 4, 4, 8, 8, 8, 16, 16]);
        assert_eq!(model.blocks[0].conv.weight.dims(), [4, 3, 5, 5]);
        assert!(model.blocks.iter().all(|b| b.conv.bias.is_none()));
        assert_eq!(model.num_classes(), 7);
    }

    #[test]
    fn test_param_count_covers_convs_and_head() {
        let device = Default::default();
        let model: DermaCnn<TestBackend> = small_config().init(&device);

        // Conv weights (no bias) plus the linear head, before BatchNorm affine terms
        let conv = 3 * 4 * 25 + 2 * 4 * 4 * 9 + 4 * 8 * 9 + 2 * 8 * 8 * 9 + 8 * 16 * 9 + 16 * 16 * 9;
        let head = 16 * 7 + 7;
        assert!(model.num_params() >= conv + head);
    }

    #[test]
    fn test_parameter_shapes_account_for_every_parameter() {
        let device = Default::default();
        let model: DermaCnn<TestBackend> = small_config().init(&device);

        let shapes = model.parameter_shapes();
        assert_eq!(shapes.len(), 8 * 3 + 2);
        assert_eq!(shapes[0], ("blocks.0.conv.weight".to_string(), vec![4, 3, 5, 5]));
        assert_eq!(shapes[1], ("blocks.0.bn.gamma".to_string(), vec![4]));
        assert_eq!(shapes.last().unwrap(), &("head.bias".to_string(), vec![7]));

        let total: usize = shapes.iter().map(|(_, dims)| dims.iter().product::<usize>()).sum();
        assert_eq!(total, model.num_params());
    }

    #[test]
    fn test_config_from_model_config() {
        let config = DermaCnnConfig::from(&ModelConfig::default());
        assert_eq!(config.base_channels, 64);
        assert_eq!(config.num_classes, 7);
        assert_eq!(config.in_channels, 3);
    }
}
