use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },
    #[error("missing parameter '{0}'")]
    MissingParam(String),
    #[error("unknown value '{value}' for {what}")]
    UnknownValue { what: &'static str, value: String },
}
