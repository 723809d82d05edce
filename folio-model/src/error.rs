use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug)]
pub enum ModelError {
    UnknownStatus { kind: &'static str, value: String },
    InvalidCounts(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::UnknownStatus { kind, value } => {
                write!(f, "unknown {kind} status: {value}")
            }
            ModelError::InvalidCounts(msg) => write!(f, "invalid copy counts: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
