use qwatch_model::{ModelError, SessionId, TaskId, TaskStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("task id already registered: {0}")]
    DuplicateTask(TaskId),

    #[error("monitor is already bound to task {0}")]
    MonitorInUse(TaskId),

    #[error("no action builder for kind '{0}'")]
    NoBuilder(String),

    #[error("invalid task request: {0}")]
    InvalidRequest(String),

    #[error("no tokio runtime available to start the task")]
    NoRuntime,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("monitor is already {current:?}; refusing transition to {attempted:?}")]
    AlreadyTerminal {
        current: TaskStatus,
        attempted: TaskStatus,
    },

    #[error("monitor channel closed")]
    Closed,
}
