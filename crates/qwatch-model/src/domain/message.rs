use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Which session message set a text is recorded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageScope {
    /// Informational messages.
    Messages,
    /// Error messages.
    Errors,
}

impl FromStr for MessageScope {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "messages" | "message" | "info" => Ok(MessageScope::Messages),
            "errors" | "error" => Ok(MessageScope::Errors),
            _ => Err(ModelError::UnknownValue {
                what: "message scope",
                value: s.to_string(),
            }),
        }
    }
}
