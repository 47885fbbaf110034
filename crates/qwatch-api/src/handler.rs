use std::time::Duration;

use async_trait::async_trait;
use qwatch_model::{MessageScope, Outcome, SessionId, TaskId, TaskInfo, TaskRequest};

use crate::error::ApiError;

/// Session and task API handler.
///
/// Every task operation is scoped to the calling session; only `admin_cancel`
/// reaches across sessions and it requires a superuser session.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Open a new session.
    async fn open_session(&self, superuser: bool) -> Result<SessionId, ApiError>;

    /// Close a session and cancel its live tasks.
    async fn close_session(&self, session: &SessionId) -> Result<(), ApiError>;

    /// Build and start a task from a request; returns as soon as the task is registered.
    async fn start_task(&self, session: &SessionId, request: TaskRequest) -> Result<TaskId, ApiError>;

    /// Current state of a task, `None` once it was evicted.
    async fn get_task(&self, session: &SessionId, task: &TaskId) -> Result<Option<TaskInfo>, ApiError>;

    async fn list_tasks(&self, session: &SessionId) -> Result<Vec<TaskInfo>, ApiError>;

    /// Request cancellation; a no-op for tasks that already finished.
    async fn cancel_task(&self, session: &SessionId, task: &TaskId) -> Result<(), ApiError>;

    /// Wait for the task to finish, up to `timeout`; `None` if it is still running.
    async fn wait_for_outcome(
        &self,
        session: &SessionId,
        task: &TaskId,
        timeout: Duration,
    ) -> Result<Option<Outcome>, ApiError>;

    /// Return and clear the session's messages of one scope.
    async fn drain_messages(&self, session: &SessionId, scope: MessageScope) -> Result<Vec<String>, ApiError>;

    /// Cancel a task owned by any session; returns the owning session.
    async fn admin_cancel(&self, session: &SessionId, task: &TaskId) -> Result<SessionId, ApiError>;
}
