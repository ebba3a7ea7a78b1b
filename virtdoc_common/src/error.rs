use thiserror::Error;

#[derive(Error, Debug)]
pub enum VirtDocError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A size unit token that is neither a byte literal nor a scale letter form
    #[error("invalid unit: {unit}")]
    InvalidUnit { unit: String },

    /// The `__value` of a unit-bearing quantity is missing or not an integer
    #[error("invalid magnitude: {value}")]
    InvalidMagnitude { value: String },

    #[error("malformed document at byte {position}: {message}")]
    MalformedDocument { message: String, position: u64 },

    #[error("invalid element or attribute name: {0:?}")]
    InvalidName(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, VirtDocError>;

impl VirtDocError {
    pub fn invalid_unit(unit: impl Into<String>) -> Self {
        Self::InvalidUnit { unit: unit.into() }
    }

    pub fn malformed(message: impl Into<String>, position: u64) -> Self {
        Self::MalformedDocument {
            message: message.into(),
            position,
        }
    }
}
