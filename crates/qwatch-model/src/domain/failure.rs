use serde::{Deserialize, Serialize};

/// Classification of a failed task.
///
/// Each kind produces a different user-facing message.
/// Cancellation is not a failure and has no kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// The engine refused or stopped the query because it would run too long.
    EngineTimeout,
    /// Any other structured failure reported by the engine.
    EngineError,
    /// A fault outside the engine: a bug in the action, a panic, a failing callback.
    UnexpectedError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::EngineTimeout => "engine_timeout",
            FailureKind::EngineError => "engine_error",
            FailureKind::UnexpectedError => "unexpected_error",
        }
    }
}
