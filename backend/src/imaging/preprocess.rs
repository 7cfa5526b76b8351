use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::{Array4, ArrayView1, ArrayView2, ArrayView3};
use serde::ser::{Serialize, Serializer};

use super::DecodeError;

/// Model input of shape (1, H, W, 3) with values in [0, 1].
#[derive(Debug, Clone)]
pub struct PreprocessedTensor(Array4<f32>);

impl PreprocessedTensor {
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.0
    }
}

struct Pixel<'a>(ArrayView1<'a, f32>);
struct Row<'a>(ArrayView2<'a, f32>);
struct Plane<'a>(ArrayView3<'a, f32>);

impl Serialize for Pixel<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.outer_iter().map(Pixel))
    }
}

impl Serialize for Plane<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.outer_iter().map(Row))
    }
}

// Nested lists, batch outermost: [[[[r, g, b], ...], ...]]
impl Serialize for PreprocessedTensor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.outer_iter().map(Plane))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TensorPreprocessor {
    size: u32,
}

impl TensorPreprocessor {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn preprocess(&self, image: &RgbImage) -> Result<PreprocessedTensor, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::Empty);
        }

        let resized = imageops::resize(image, self.size, self.size, FilterType::CatmullRom);
        let side = self.size as usize;
        let tensor = Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });

        log::debug!("Preprocessed image into tensor {:?}", tensor.shape());
        Ok(PreprocessedTensor(tensor))
    }
}

impl Default for TensorPreprocessor {
    fn default() -> Self {
        Self::new(150)
    }
}
