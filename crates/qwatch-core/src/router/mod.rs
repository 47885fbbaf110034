use std::sync::Arc;

use qwatch_model::TaskRequest;
use tracing::{instrument, trace};

use crate::{
    action::{BoxAction, CompletionCallback},
    error::CoreError,
    session::Session,
};

/// An action ready to hand to the supervisor, plus its optional completion callback.
pub struct BuiltAction {
    pub action: BoxAction,
    pub on_complete: Option<CompletionCallback>,
}

impl BuiltAction {
    pub fn new(action: BoxAction) -> Self {
        Self {
            action,
            on_complete: None,
        }
    }

    pub fn with_completion(mut self, on_complete: CompletionCallback) -> Self {
        self.on_complete = Some(on_complete);
        self
    }
}

/// Turns a [`TaskRequest`] of a given kind into an executable action.
pub trait ActionBuilder: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn supports(&self, request: &TaskRequest) -> bool;

    /// Validate the request and build the action; the session is available for callbacks.
    fn build(&self, request: &TaskRequest, session: &Session) -> Result<BuiltAction, CoreError>;
}

#[derive(Default)]
pub struct ActionRouter {
    builders: Vec<Arc<dyn ActionBuilder>>,
}

impl ActionRouter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn register(&mut self, builder: Arc<dyn ActionBuilder>) {
        self.builders.push(builder);
    }

    pub fn with_builder(mut self, builder: Arc<dyn ActionBuilder>) -> Self {
        self.register(builder);
        self
    }

    pub fn pick(&self, request: &TaskRequest) -> Option<&Arc<dyn ActionBuilder>> {
        self.builders.iter().find(|b| b.supports(request))
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.builders.iter().map(|b| b.name()).collect()
    }

    #[instrument(level = "trace", skip(self, request, session), fields(kind = %request.kind))]
    pub fn build(&self, request: &TaskRequest, session: &Session) -> Result<BuiltAction, CoreError> {
        let builder = self
            .pick(request)
            .ok_or_else(|| CoreError::NoBuilder(request.kind.clone()))?;

        let built = builder.build(request, session)?;
        trace!(builder = builder.name(), "builder produced action");
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SessionStore, SupervisorConfig};
    use qwatch_model::{MessageScope, Outcome};

    struct Echo;

    impl ActionBuilder for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn supports(&self, request: &TaskRequest) -> bool {
            request.kind == "echo"
        }

        fn build(&self, request: &TaskRequest, _session: &Session) -> Result<BuiltAction, CoreError> {
            let text = request.require("text")?.to_string();
            Ok(BuiltAction::new(Box::new(|_| Ok(()))).with_completion(Box::new(move |_| {
                if text.is_empty() {
                    anyhow::bail!("nothing to echo");
                }
                Ok(())
            })))
        }
    }

    fn router() -> ActionRouter {
        ActionRouter::new().with_builder(Arc::new(Echo))
    }

    #[test]
    fn unknown_kind_has_no_builder() {
        let store = SessionStore::builder(SupervisorConfig::default()).build();
        let session = store.open();

        let err = router()
            .build(&TaskRequest::new("scan"), &session)
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::NoBuilder(kind) if kind == "scan"));
    }

    #[test]
    fn builder_validation_errors_propagate() {
        let store = SessionStore::builder(SupervisorConfig::default()).build();
        let session = store.open();

        let err = router()
            .build(&TaskRequest::new("echo"), &session)
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::Model(_)));
    }

    #[tokio::test]
    async fn built_action_runs_under_the_session_supervisor() {
        let store = SessionStore::builder(SupervisorConfig::default()).build();
        let session = store.open();
        let built = router()
            .build(&TaskRequest::new("echo").with_param("text", "hi"), &session)
            .unwrap();

        let id = session
            .tasks()
            .start_with_monitor(crate::Monitor::new(), built.action, built.on_complete)
            .unwrap();

        assert_eq!(session.tasks().wait_for_outcome(&id).await.unwrap(), Outcome::Completed);
        assert!(session.messages().is_empty(MessageScope::Errors));
    }
}
