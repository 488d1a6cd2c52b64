use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Config(#[from] relief_core::Error),

    #[error(transparent)]
    Field(#[from] relief_field::FieldError),
}
