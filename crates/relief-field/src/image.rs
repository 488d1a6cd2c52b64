use crate::error::FieldError;

/// A decoded grayscale depth map: row-major f32 intensities in 0..=255,
/// row 0 at the top of the image. 16-bit sources are scaled into the same
/// range so downstream math is depth-format agnostic.
#[derive(Debug, Clone)]
pub struct DepthImage {
    pixels: Vec<f32>,
    width: usize,
    height: usize,
}

impl DepthImage {
    pub fn from_gray8(data: &[u8], width: usize, height: usize) -> Result<Self, FieldError> {
        Self::from_f32(data.iter().map(|&p| p as f32).collect(), width, height)
    }

    pub fn from_gray16(data: &[u16], width: usize, height: usize) -> Result<Self, FieldError> {
        Self::from_f32(
            data.iter().map(|&p| p as f32 / 256.0).collect(),
            width,
            height,
        )
    }

    pub fn from_f32(pixels: Vec<f32>, width: usize, height: usize) -> Result<Self, FieldError> {
        if width == 0 || height == 0 || pixels.is_empty() {
            return Err(FieldError::EmptyImage);
        }
        if pixels.len() != width * height {
            return Err(FieldError::BadDimensions {
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.pixels[row * self.width + col]
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }
}
