use image::{imageops, imageops::FilterType, ImageReader, RgbImage};
use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

/// Batch of one image, laid out as configured by [`Layout`].
pub type Tensor = Array4<f32>;

const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];
const TORCH_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const TORCH_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("tensor shape {actual:?} does not match expected {expected:?}")]
    Shape {
        expected: [usize; 4],
        actual: Vec<usize>,
    },
}

/// Per-classifier-family input scaling.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `[0, 255] -> [0, 1]`
    #[default]
    Rescale,
    /// `[0, 255] -> [-1, 1]` (MobileNet family)
    Tf,
    /// BGR order, ImageNet mean subtracted, unscaled (Keras ResNet50)
    Caffe,
    /// ImageNet mean/std on `[0, 1]` values (PyTorch / HuggingFace)
    Torch,
    /// Raw `[0, 255]`; the network rescales internally (EfficientNet)
    Passthrough,
}

impl Normalization {
    /// RGB channel feeding output channel `channel`.
    fn source_channel(&self, channel: usize) -> usize {
        match self {
            Normalization::Caffe => 2 - channel,
            _ => channel,
        }
    }

    fn apply(&self, channel: usize, value: f32) -> f32 {
        match self {
            Normalization::Rescale => value / 255.0,
            Normalization::Tf => value / 127.5 - 1.0,
            Normalization::Caffe => value - CAFFE_MEAN_BGR[channel],
            Normalization::Torch => (value / 255.0 - TORCH_MEAN[channel]) / TORCH_STD[channel],
            Normalization::Passthrough => value,
        }
    }

    fn invert(&self, channel: usize, value: f32) -> f32 {
        match self {
            Normalization::Rescale => value * 255.0,
            Normalization::Tf => (value + 1.0) * 127.5,
            Normalization::Caffe => value + CAFFE_MEAN_BGR[channel],
            Normalization::Torch => (value * TORCH_STD[channel] + TORCH_MEAN[channel]) * 255.0,
            Normalization::Passthrough => value,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// `[1, H, W, 3]`, the Keras convention.
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`, the PyTorch convention.
    Nchw,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessConfig {
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub filter: ResizeFilter,
}

fn default_image_size() -> u32 {
    224
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: default_image_size(),
            normalization: Normalization::default(),
            layout: Layout::default(),
            filter: ResizeFilter::default(),
        }
    }
}

impl PreprocessConfig {
    pub fn tensor_shape(&self) -> [usize; 4] {
        let size = self.image_size as usize;
        match self.layout {
            Layout::Nhwc => [1, size, size, 3],
            Layout::Nchw => [1, 3, size, size],
        }
    }

    fn index(&self, y: usize, x: usize, channel: usize) -> [usize; 4] {
        match self.layout {
            Layout::Nhwc => [0, y, x, channel],
            Layout::Nchw => [0, channel, y, x],
        }
    }

    /// Undoes normalization and layout, giving `[H, W, 3]` RGB intensities in `[0, 255]`.
    pub fn to_rgb_intensities(&self, tensor: &Tensor) -> Result<Array3<f32>, PreprocessError> {
        let expected = self.tensor_shape();
        if tensor.shape() != expected {
            return Err(PreprocessError::Shape {
                expected,
                actual: tensor.shape().to_vec(),
            });
        }

        let size = self.image_size as usize;
        let mut rgb = Array3::zeros((size, size, 3));
        for y in 0..size {
            for x in 0..size {
                for channel in 0..3 {
                    let value = tensor[self.index(y, x, channel)];
                    let source = self.normalization.source_channel(channel);
                    rgb[[y, x, source]] = self.normalization.invert(channel, value);
                }
            }
        }

        Ok(rgb)
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn decode(&self, image_data: &[u8]) -> Result<RgbImage, PreprocessError> {
        let image_reader = ImageReader::new(Cursor::new(image_data))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)?;

        Ok(image_reader.decode()?.to_rgb8())
    }

    pub fn preprocess(&self, image_data: &[u8]) -> Result<Tensor, PreprocessError> {
        let rgb = self.decode(image_data)?;
        Ok(self.to_tensor(&rgb))
    }

    pub fn to_tensor(&self, rgb: &RgbImage) -> Tensor {
        let size = self.config.image_size;
        let resized = imageops::resize(rgb, size, size, self.config.filter.into());

        let normalization = self.config.normalization;
        let mut input = Array4::zeros(self.config.tensor_shape());
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                let value = pixel.0[normalization.source_channel(channel)] as f32;
                input[self.config.index(y, x, channel)] = normalization.apply(channel, value);
            }
        }

        input
    }
}
