pub mod gate;
pub mod preprocess;

use image::{ImageFormat, ImageReader, RgbImage};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported or corrupt image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Image has no pixels")]
    Empty,
}

#[derive(Debug)]
pub struct DecodedImage {
    pub pixels: RgbImage,
    pub format: Option<ImageFormat>,
}

impl DecodedImage {
    /// File extension matching the detected container format.
    pub fn extension(&self) -> &'static str {
        self.format
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("jpg")
    }

    pub fn content_type(&self) -> &'static str {
        self.format
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream")
    }
}

/// Decodes an image file into RGB, sniffing the format from its contents.
pub fn decode_file(path: &Path) -> Result<DecodedImage, DecodeError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format();
    let pixels = reader.decode()?.to_rgb8();
    if pixels.width() == 0 || pixels.height() == 0 {
        return Err(DecodeError::Empty);
    }
    Ok(DecodedImage { pixels, format })
}
