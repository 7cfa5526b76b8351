use image::RgbImage;
use std::sync::Arc;

use crate::config::{GateConfig, GateStrategy};

/// Pre-inference filter deciding whether an upload plausibly is an X-ray.
pub trait XrayGate: Send + Sync {
    fn name(&self) -> &'static str;
    fn classify(&self, image: &RgbImage) -> bool;
}

/// Accepts images whose pixels are mostly near-gray.
pub struct GrayscaleRatioGate {
    tolerance: u8,
    min_ratio: f32,
}

impl GrayscaleRatioGate {
    pub fn new(tolerance: u8, min_ratio: f32) -> Self {
        Self {
            tolerance,
            min_ratio,
        }
    }

    pub fn gray_ratio(&self, image: &RgbImage) -> f32 {
        let total = image.width() as u64 * image.height() as u64;
        if total == 0 {
            return 0.0;
        }

        let gray = image
            .pixels()
            .filter(|pixel| {
                let [r, g, b] = pixel.0;
                r.abs_diff(g) < self.tolerance && g.abs_diff(b) < self.tolerance
            })
            .count() as u64;

        (gray as f64 / total as f64) as f32
    }
}

impl Default for GrayscaleRatioGate {
    fn default() -> Self {
        Self::new(10, 0.75)
    }
}

impl XrayGate for GrayscaleRatioGate {
    fn name(&self) -> &'static str {
        "grayscale-ratio"
    }

    fn classify(&self, image: &RgbImage) -> bool {
        let ratio = self.gray_ratio(image);
        log::debug!("Near-gray pixel ratio: {:.4}", ratio);
        ratio > self.min_ratio
    }
}

/// Stricter dimension check: narrow, at least 100px tall, portrait or square.
pub struct AspectGate;

impl XrayGate for AspectGate {
    fn name(&self) -> &'static str {
        "aspect-size"
    }

    fn classify(&self, image: &RgbImage) -> bool {
        let (width, height) = image.dimensions();
        !(width > 100 || height < 100 || width > height)
    }
}

pub fn from_config(config: &GateConfig) -> Arc<dyn XrayGate> {
    match config.strategy {
        GateStrategy::Grayscale => Arc::new(GrayscaleRatioGate::new(
            config.channel_tolerance,
            config.min_gray_ratio,
        )),
        GateStrategy::Aspect => Arc::new(AspectGate),
    }
}
