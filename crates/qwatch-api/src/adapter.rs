use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use qwatch_core::{ActionRouter, Monitor, Session, SessionStore};
use qwatch_model::{MessageScope, Outcome, SessionId, TaskId, TaskInfo, TaskRequest};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::handler::ApiHandler;

/// Adapter that bridges a [`SessionStore`] and an [`ActionRouter`] to [`ApiHandler`].
pub struct SessionStoreAdapter {
    store: SessionStore,
    router: Arc<ActionRouter>,
}

impl SessionStoreAdapter {
    pub fn new(store: SessionStore, router: Arc<ActionRouter>) -> Self {
        Self { store, router }
    }

    fn session(&self, id: &SessionId) -> Result<Arc<Session>, ApiError> {
        self.store
            .get(id)
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))
    }
}

#[async_trait]
impl ApiHandler for SessionStoreAdapter {
    async fn open_session(&self, superuser: bool) -> Result<SessionId, ApiError> {
        let session = self.store.open();
        session.set_superuser(superuser);
        info!(session = %session.id(), superuser, "session opened");
        Ok(session.id().clone())
    }

    async fn close_session(&self, session: &SessionId) -> Result<(), ApiError> {
        self.store
            .close(session)
            .map(|_| ())
            .ok_or_else(|| ApiError::SessionNotFound(session.to_string()))
    }

    async fn start_task(&self, session: &SessionId, request: TaskRequest) -> Result<TaskId, ApiError> {
        let session = self.session(session)?;
        let built = self.router.build(&request, &session)?;
        let id = session
            .tasks()
            .start_with_monitor(Monitor::new(), built.action, built.on_complete)?;
        debug!(session = %session.id(), task = %id, kind = %request.kind, "task submitted");
        Ok(id)
    }

    async fn get_task(&self, session: &SessionId, task: &TaskId) -> Result<Option<TaskInfo>, ApiError> {
        Ok(self.session(session)?.tasks().get_info(task))
    }

    async fn list_tasks(&self, session: &SessionId) -> Result<Vec<TaskInfo>, ApiError> {
        Ok(self.session(session)?.tasks().list())
    }

    async fn cancel_task(&self, session: &SessionId, task: &TaskId) -> Result<(), ApiError> {
        self.session(session)?.tasks().request_cancel(task)?;
        Ok(())
    }

    async fn wait_for_outcome(
        &self,
        session: &SessionId,
        task: &TaskId,
        timeout: Duration,
    ) -> Result<Option<Outcome>, ApiError> {
        let tasks = self.session(session)?.tasks().clone();
        Ok(tasks.wait_for_outcome_timeout(task, timeout).await?)
    }

    async fn drain_messages(&self, session: &SessionId, scope: MessageScope) -> Result<Vec<String>, ApiError> {
        Ok(self.session(session)?.messages().drain(scope))
    }

    async fn admin_cancel(&self, session: &SessionId, task: &TaskId) -> Result<SessionId, ApiError> {
        let caller = self.session(session)?;
        if !caller.is_superuser() {
            warn!(session = %session, %task, "administrative cancel refused");
            return Err(ApiError::Forbidden("superuser session required".into()));
        }
        Ok(self.store.cancel_any(task)?)
    }
}
