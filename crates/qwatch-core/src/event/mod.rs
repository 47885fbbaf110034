//! Task lifecycle events published by the supervisor.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use qwatch_model::{FailureKind, Outcome, SessionId, TaskId};
use tracing::warn;

use crate::runner::panic_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEventKind {
    /// Monitor registered and runner spawned.
    Started,
    /// A caller asked for cancellation.
    CancelRequested,
    /// The engine was told to abort the task's token.
    Aborted,
    Completed,
    Failed,
    Cancelled,
    /// The monitor left the registry after its grace period.
    Evicted,
}

impl TaskEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventKind::Started => "started",
            TaskEventKind::CancelRequested => "cancel_requested",
            TaskEventKind::Aborted => "aborted",
            TaskEventKind::Completed => "completed",
            TaskEventKind::Failed => "failed",
            TaskEventKind::Cancelled => "cancelled",
            TaskEventKind::Evicted => "evicted",
        }
    }
}

impl From<Outcome> for TaskEventKind {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Completed => TaskEventKind::Completed,
            Outcome::Failed => TaskEventKind::Failed,
            Outcome::Cancelled => TaskEventKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub task: TaskId,
    pub session: Option<SessionId>,
    /// Present on `Failed`.
    pub failure: Option<FailureKind>,
    pub reason: Option<String>,
    /// Time since the task started; present on terminal events.
    pub elapsed: Option<Duration>,
}

impl TaskEvent {
    pub fn new(kind: TaskEventKind, task: TaskId) -> Self {
        Self {
            kind,
            task,
            session: None,
            failure: None,
            reason: None,
            elapsed: None,
        }
    }

    pub fn with_session(mut self, session: Option<SessionId>) -> Self {
        self.session = session;
        self
    }

    pub fn with_failure(mut self, kind: FailureKind, reason: impl Into<String>) -> Self {
        self.failure = Some(kind);
        self.reason = Some(reason.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

/// Receiver of task events.
///
/// Called synchronously from the supervisor loop; implementations must not block.
pub trait TaskObserver: Send + Sync + 'static {
    fn on_event(&self, event: &TaskEvent);

    fn name(&self) -> &'static str {
        "observer"
    }
}

/// Deliver an event to every observer, containing observer panics.
pub(crate) fn publish(observers: &[Arc<dyn TaskObserver>], event: &TaskEvent) {
    for observer in observers {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
            warn!(
                observer = observer.name(),
                task = %event.task,
                reason = %panic_message(payload.as_ref()),
                "task observer panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collect(Mutex<Vec<TaskEventKind>>);

    impl TaskObserver for Collect {
        fn on_event(&self, event: &TaskEvent) {
            self.0.lock().unwrap().push(event.kind);
        }
    }

    struct Explode;

    impl TaskObserver for Explode {
        fn on_event(&self, _event: &TaskEvent) {
            panic!("observer bug");
        }
        fn name(&self) -> &'static str {
            "explode"
        }
    }

    #[test]
    fn panicking_observer_does_not_starve_the_others() {
        let collect = Arc::new(Collect(Mutex::new(Vec::new())));
        let observers: Vec<Arc<dyn TaskObserver>> = vec![Arc::new(Explode), collect.clone()];

        publish(&observers, &TaskEvent::new(TaskEventKind::Started, TaskId::from("1")));

        assert_eq!(*collect.0.lock().unwrap(), vec![TaskEventKind::Started]);
    }
}
