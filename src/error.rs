use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("activation function '{0}' not found")]
    ActivationNotFound(String),
    #[error("activation function '{0}' already exists")]
    ActivationExists(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("corrupt model: {0}")]
    CorruptModel(String),
    /// The largest weight needs more integer bits than an 8-bit value can hold.
    #[error("cannot quantize: max |weight| {max_abs} needs exponent {exponent} > 7")]
    QuantizationOverflow { max_abs: f64, exponent: u32 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
