use qwatch_model::TaskId;
use thiserror::Error;

use crate::{
    engine::{CancelToken, EngineError},
    monitor::Monitor,
};

/// Why an action did not return normally.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The result set is empty. The task still counts as successful.
    #[error("no results available")]
    EmptyResult,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Unit of supervised work.
pub type BoxAction = Box<dyn FnOnce(&TaskContext) -> Result<(), ActionError> + Send + 'static>;

/// Continuation invoked once after a successful action, before the monitor is marked completed.
pub type CompletionCallback = Box<dyn FnOnce(&Monitor) -> anyhow::Result<()> + Send + 'static>;

/// What an action sees of its own supervision.
pub struct TaskContext {
    id: TaskId,
    token: Option<CancelToken>,
    monitor: Monitor,
}

impl TaskContext {
    pub(crate) fn new(id: TaskId, monitor: Monitor) -> Self {
        Self {
            id,
            token: None,
            monitor,
        }
    }

    pub(crate) fn set_token(&mut self, token: Option<CancelToken>) {
        self.token = token;
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Token to tag engine operations with; `None` when the engine does not support cancellation.
    pub fn token(&self) -> Option<CancelToken> {
        self.token
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Cooperative check for actions that loop outside the engine.
    pub fn cancel_requested(&self) -> bool {
        self.monitor.cancel_requested()
    }
}
