//! VGG16 layer topology

use super::model::{Activation, Layer, LayerKind, Model};
use cnncls_common::entity::ImageSize;

/// Convolution blocks as (block number, conv count, filters)
const BLOCKS: [(u32, u32, u32); 5] = [(1, 2, 64), (2, 2, 128), (3, 3, 256), (4, 3, 512), (5, 3, 512)];

/// Units of the ImageNet classifier top
const TOP_UNITS: usize = 4096;
const IMAGENET_CLASSES: usize = 1000;

/// Build the VGG16 layer list for `input_shape`
///
/// Without the top this is 19 layers: the input plus five conv/pool blocks.
pub fn vgg16(input_shape: ImageSize, include_top: bool) -> Model {
    let mut layers = vec![Layer::new("input_1", LayerKind::Input)];

    for (block, convs, filters) in BLOCKS {
        for conv in 1..=convs {
            layers.push(Layer::new(
                format!("block{}_conv{}", block, conv),
                LayerKind::Conv2d {
                    filters,
                    kernel_size: 3,
                    activation: Activation::Relu,
                },
            ));
        }
        layers.push(Layer::new(
            format!("block{}_pool", block),
            LayerKind::MaxPool2d { pool_size: 2 },
        ));
    }

    if include_top {
        layers.push(Layer::new("flatten", LayerKind::Flatten));
        for name in ["fc1", "fc2"] {
            layers.push(Layer::new(
                name,
                LayerKind::Dense {
                    units: TOP_UNITS,
                    activation: Activation::Relu,
                },
            ));
        }
        layers.push(Layer::new(
            "predictions",
            LayerKind::Dense {
                units: IMAGENET_CLASSES,
                activation: Activation::Softmax,
            },
        ));
    }

    Model::new("vgg16", input_shape, layers)
}
