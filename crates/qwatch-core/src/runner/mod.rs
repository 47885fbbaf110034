//! Execution of one action on a worker thread.
//!
//! The runner brackets the action with token registration and deregistration, catches every
//! failure (panics included) at its boundary and turns it into a [`TaskFailure`]. It records
//! nothing itself; the supervisor decides whether a failure reaches the session.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use qwatch_model::{FailureKind, MessageScope};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::{
    action::{ActionError, BoxAction, TaskContext},
    config::MessageCatalog,
    engine::{CancelToken, EngineError, ExecutionEngine},
    messages::MessageSink,
    session::Privileges,
};

/// A classified task failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub kind: FailureKind,
    /// Rendered diagnostic: the engine message, the error chain or the panic payload.
    pub detail: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn unexpected(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::UnexpectedError, detail)
    }

    fn from_engine(err: &EngineError) -> Self {
        let kind = if err.is_duration_limit() {
            FailureKind::EngineTimeout
        } else {
            FailureKind::EngineError
        };
        Self::new(kind, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed(TaskFailure),
}

/// Everything the supervisor learns from one execution.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Set when the token could not be deregistered; never changes `outcome`.
    pub deregister_error: Option<EngineError>,
}

impl RunReport {
    pub(crate) fn failed(failure: TaskFailure) -> Self {
        Self {
            outcome: RunOutcome::Failed(failure),
            deregister_error: None,
        }
    }
}

/// Turns failures into session error messages.
///
/// Only the supervisor records, once it has settled the task's verdict.
#[derive(Clone)]
pub(crate) struct Reporter {
    pub(crate) sink: Arc<dyn MessageSink>,
    pub(crate) catalog: MessageCatalog,
    pub(crate) privileges: Privileges,
}

impl Reporter {
    pub(crate) fn render(&self, failure: &TaskFailure) -> String {
        match failure.kind {
            FailureKind::EngineTimeout => self.catalog.query_too_long.clone(),
            FailureKind::EngineError => self.catalog.query_error.clone(),
            FailureKind::UnexpectedError if self.privileges.is_elevated() => {
                format!("{}: {}", self.catalog.unexpected_error, failure.detail)
            }
            FailureKind::UnexpectedError => self.catalog.unexpected_error.clone(),
        }
    }

    pub(crate) fn record(&self, failure: &TaskFailure) {
        self.sink.append(MessageScope::Errors, self.render(failure));
    }
}

/// What the supervisor holds on to while the action runs.
pub(crate) struct RunHandle {
    pub(crate) token: Option<CancelToken>,
    pub(crate) join: JoinHandle<RunReport>,
}

pub(crate) struct TaskRunner {
    ctx: TaskContext,
    action: BoxAction,
    engine: Option<Arc<dyn ExecutionEngine>>,
}

impl TaskRunner {
    pub(crate) fn new(
        ctx: TaskContext,
        action: BoxAction,
        engine: Option<Arc<dyn ExecutionEngine>>,
    ) -> Self {
        Self {
            ctx,
            action,
            engine,
        }
    }

    /// Register the token and start the action on the blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(self) -> RunHandle {
        let registration = self
            .engine
            .as_ref()
            .map(|engine| engine.register_token())
            .transpose();
        let token = registration.as_ref().ok().copied().flatten();
        let join = tokio::task::spawn_blocking(move || self.run(registration));
        RunHandle { token, join }
    }

    fn run(self, registration: Result<Option<CancelToken>, EngineError>) -> RunReport {
        let TaskRunner {
            mut ctx,
            action,
            engine,
        } = self;
        let task = ctx.id().clone();

        let token = match registration {
            Ok(token) => token,
            Err(err) => {
                error!(%task, error = %err, "failed to register cancellation token");
                return RunReport::failed(TaskFailure::from_engine(&err));
            }
        };
        if token.is_none() {
            debug!(%task, "engine does not support cancellation; running without token");
        }
        ctx.set_token(token);

        trace!(%task, ?token, "action starting");
        let result = panic::catch_unwind(AssertUnwindSafe(|| action(&ctx)));
        let outcome = classify(result);

        let deregister_error = match (&engine, token) {
            (Some(engine), Some(token)) => engine.deregister_token(token).err().inspect(|err| {
                error!(%task, %token, error = %err, "failed to deregister cancellation token");
            }),
            _ => None,
        };

        match &outcome {
            RunOutcome::Failed(failure) => {
                debug!(%task, kind = failure.kind.as_str(), detail = %failure.detail, "action returned a failure");
            }
            RunOutcome::Succeeded => trace!(%task, "action returned normally"),
        }

        RunReport {
            outcome,
            deregister_error,
        }
    }
}

fn classify(result: Result<Result<(), ActionError>, Box<dyn Any + Send>>) -> RunOutcome {
    match result {
        Ok(Ok(())) => RunOutcome::Succeeded,
        Ok(Err(ActionError::EmptyResult)) => {
            debug!("action reported an empty result set");
            RunOutcome::Succeeded
        }
        Ok(Err(ActionError::Engine(err))) => RunOutcome::Failed(TaskFailure::from_engine(&err)),
        Ok(Err(ActionError::Unexpected(err))) => {
            match err.chain().find_map(|cause| cause.downcast_ref::<EngineError>()) {
                Some(engine) => RunOutcome::Failed(TaskFailure::from_engine(engine)),
                None => RunOutcome::Failed(TaskFailure::unexpected(format!("{err:?}"))),
            }
        }
        Err(payload) => RunOutcome::Failed(TaskFailure::unexpected(format!(
            "action panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
