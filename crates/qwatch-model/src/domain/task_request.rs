use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Free-form string parameters of a task request.
pub type TaskParams = BTreeMap<String, String>;

/// Request to start a background task, as received by the API layer.
///
/// `kind` selects the action builder; `params` are interpreted by that builder only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: TaskParams,
}

impl TaskRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: TaskParams::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, ModelError> {
        self.param(name)
            .ok_or_else(|| ModelError::MissingParam(name.to_string()))
    }

    /// Parse an optional unsigned parameter.
    pub fn param_u64(&self, name: &str) -> Result<Option<u64>, ModelError> {
        self.param(name)
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|e| ModelError::InvalidParam {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_to_empty() {
        let req: TaskRequest = serde_json::from_str(r#"{"kind":"count"}"#).unwrap();
        assert_eq!(req.kind, "count");
        assert!(req.params.is_empty());
    }

    #[test]
    fn numeric_params_are_validated() {
        let req = TaskRequest::new("scan")
            .with_param("rows", "250")
            .with_param("delay_ms", "soon");

        assert_eq!(req.param_u64("rows").unwrap(), Some(250));
        assert_eq!(req.param_u64("absent").unwrap(), None);
        assert!(matches!(
            req.param_u64("delay_ms"),
            Err(ModelError::InvalidParam { .. })
        ));
        assert!(matches!(req.require("table"), Err(ModelError::MissingParam(_))));
    }
}
