pub mod error;
pub mod field;
pub mod image;
pub mod toolshape;

pub use error::FieldError;
pub use field::HeightField;
pub use image::DepthImage;
pub use toolshape::ToolShape;
