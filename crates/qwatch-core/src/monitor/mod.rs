use std::{
    fmt,
    sync::{Arc, OnceLock},
    time::SystemTime,
};

use qwatch_model::{Outcome, TaskId, TaskInfo, TaskStatus};
use tokio::sync::watch;

use crate::error::{CoreError, MonitorError};

/// Mutable part of a monitor.
#[derive(Debug, Clone)]
pub(crate) struct MonitorState {
    pub(crate) cancel_requested: bool,
    pub(crate) status: TaskStatus,
    pub(crate) count: Option<u64>,
    pub(crate) started_at: SystemTime,
    pub(crate) finished_at: Option<SystemTime>,
}

/// Status and cancellation flags of one background task.
///
/// Cloning is cheap and every clone observes the same state.
/// The state lives in a `watch` channel so waiters and the supervisor loop are woken on every change.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    id: OnceLock<TaskId>,
    state: watch::Sender<MonitorState>,
}

impl Monitor {
    pub fn new() -> Self {
        let (state, _) = watch::channel(MonitorState {
            cancel_requested: false,
            status: TaskStatus::Running,
            count: None,
            started_at: SystemTime::now(),
            finished_at: None,
        });
        Self {
            inner: Arc::new(MonitorInner {
                id: OnceLock::new(),
                state,
            }),
        }
    }

    /// Task id, `None` until the monitor was handed to a supervisor.
    pub fn id(&self) -> Option<&TaskId> {
        self.inner.id.get()
    }

    pub(crate) fn bind(&self, id: TaskId) -> Result<(), CoreError> {
        if let Some(current) = self.inner.id.get() {
            return Err(CoreError::MonitorInUse(current.clone()));
        }
        self.inner.id.set(id).map_err(CoreError::MonitorInUse)
    }

    /// Ask for the task to be cancelled.
    ///
    /// Idempotent; does nothing once the task is terminal.
    /// Returns `true` only for the call that actually raised the flag.
    pub fn request_cancel(&self) -> bool {
        self.inner.state.send_if_modified(|s| {
            if s.status.is_terminal() || s.cancel_requested {
                return false;
            }
            s.cancel_requested = true;
            true
        })
    }

    /// `true` iff cancellation was requested and no terminal state is set yet.
    pub fn should_cancel(&self) -> bool {
        let s = self.inner.state.borrow();
        s.cancel_requested && !s.status.is_terminal()
    }

    /// Raw cancellation flag; survives the terminal transition.
    pub fn cancel_requested(&self) -> bool {
        self.inner.state.borrow().cancel_requested
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.state.borrow().status
    }

    pub fn count(&self) -> Option<u64> {
        self.inner.state.borrow().count
    }

    /// Publish the numeric result of a count-style task.
    pub fn set_count(&self, count: u64) {
        self.inner.state.send_if_modified(|s| {
            if s.count == Some(count) {
                return false;
            }
            s.count = Some(count);
            true
        });
    }

    pub fn mark_completed(&self) -> Result<(), MonitorError> {
        self.finish(TaskStatus::Completed)
    }

    pub fn mark_completed_with_error(&self) -> Result<(), MonitorError> {
        self.finish(TaskStatus::Failed)
    }

    pub fn mark_cancelled(&self) -> Result<(), MonitorError> {
        self.finish(TaskStatus::Cancelled)
    }

    fn finish(&self, status: TaskStatus) -> Result<(), MonitorError> {
        let mut result = Ok(());
        self.inner.state.send_if_modified(|s| {
            if s.status.is_terminal() {
                result = Err(MonitorError::AlreadyTerminal {
                    current: s.status,
                    attempted: status,
                });
                return false;
            }
            s.status = status;
            s.finished_at = Some(SystemTime::now());
            true
        });
        result
    }

    /// Snapshot for API responses, `None` for an unbound monitor.
    pub fn info(&self) -> Option<TaskInfo> {
        let id = self.id()?.clone();
        let s = self.inner.state.borrow();
        Some(TaskInfo {
            id,
            status: s.status,
            cancel_requested: s.cancel_requested,
            count: s.count,
            started_at: s.started_at,
            finished_at: s.finished_at,
        })
    }

    /// Wait until the monitor reaches a terminal state.
    pub async fn wait(&self) -> Result<Outcome, MonitorError> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .map_err(|_| MonitorError::Closed)?;
        state.status.outcome().ok_or(MonitorError::Closed)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.inner.state.subscribe()
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.inner.state.borrow();
        f.debug_struct("Monitor")
            .field("id", &self.id())
            .field("status", &s.status)
            .field("cancel_requested", &s.cancel_requested)
            .field("count", &s.count)
            .finish()
    }
}
