use thiserror::Error;

#[derive(Error, Debug)]
pub enum RampFitError {
    #[error("input shape mismatch: {0}")]
    InvalidInput(String),

    #[error("empty exposure: {0}")]
    EmptyExposure(String),
}

pub type Result<T> = std::result::Result<T, RampFitError>;
