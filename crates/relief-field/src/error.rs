use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("depth image is empty")]
    EmptyImage,

    #[error("pixel buffer length {actual} does not match {width}x{height}")]
    BadDimensions {
        width: usize,
        height: usize,
        actual: usize,
    },

    #[error("image must be at least 2 pixels tall to fix a pixel size")]
    ImageTooSmall,

    #[error(
        "tool of diameter {diameter} is narrower than a pixel ({pixel_size}); \
         reduce the stepover or use a larger tool"
    )]
    ToolFinerThanPixel { diameter: f64, pixel_size: f64 },

    #[error(transparent)]
    Core(#[from] relief_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_dimensions_display() {
        let err = FieldError::BadDimensions {
            width: 4,
            height: 4,
            actual: 15,
        };
        assert!(err.to_string().contains("4x4"));
        assert!(err.to_string().contains("15"));
    }
}
