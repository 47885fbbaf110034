//! Cancellation hooks consumed from the execution engine.
//!
//! The engine owns its token table; this crate only registers, deregisters and aborts tokens and
//! tolerates each of those calls failing on its own.

use std::fmt;

use thiserror::Error;

mod table;
pub use table::TokenTable;

/// Opaque handle naming the engine work that belongs to one task execution.
///
/// Minted by [`ExecutionEngine::register_token`], never by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelToken(u64);

impl CancelToken {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token-{}", self.0)
    }
}

/// Structured failure reported by the execution engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The query hit (or was estimated to hit) the engine's duration limit.
    #[error("query exceeded the duration limit: {0}")]
    DurationLimit(String),

    /// Work tagged with the token was aborted.
    #[error("query aborted")]
    Aborted,

    #[error("unknown cancellation token: {0}")]
    UnknownToken(CancelToken),

    #[error("engine failure: {0}")]
    Failure(String),
}

impl EngineError {
    #[inline]
    pub fn is_duration_limit(&self) -> bool {
        matches!(self, EngineError::DurationLimit(_))
    }
}

/// Cancellation interface of the underlying execution engine.
///
/// Calls are synchronous: the supervisor invokes `abort` from its loop and the runner invokes
/// `register_token` / `deregister_token` around the action.
pub trait ExecutionEngine: Send + Sync + 'static {
    /// Register a fresh token for one execution.
    fn register_token(&self) -> Result<CancelToken, EngineError>;

    /// Forget a token once its execution is over.
    fn deregister_token(&self, token: CancelToken) -> Result<(), EngineError>;

    /// Abort the in-flight engine work tagged with `token`.
    fn abort(&self, token: CancelToken) -> Result<(), EngineError>;
}
