use std::borrow::Borrow;

use qwatch_core::{TaskEvent, TaskEventKind};
use tracing::{debug, error, info, trace};

/// Field accessors over a [`TaskEvent`] with placeholder values for absent fields.
pub trait View {
    fn as_task(&self) -> &str;
    fn as_session(&self) -> &str;
    fn as_reason(&self) -> &str;
    fn as_failure(&self) -> &str;
    fn elapsed_ms(&self) -> u64;
    fn kind(&self) -> TaskEventKind;
}

impl<T> View for T
where
    T: Borrow<TaskEvent>,
{
    #[inline]
    fn as_task(&self) -> &str {
        self.borrow().task.as_str()
    }
    #[inline]
    fn as_session(&self) -> &str {
        self.borrow().session.as_ref().map(|s| s.as_str()).unwrap_or("none")
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.borrow().reason.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn as_failure(&self) -> &str {
        self.borrow().failure.map(|f| f.as_str()).unwrap_or("none")
    }
    #[inline]
    fn elapsed_ms(&self) -> u64 {
        self.borrow()
            .elapsed
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
    #[inline]
    fn kind(&self) -> TaskEventKind {
        self.borrow().kind
    }
}

#[inline]
pub fn message_for(kind: TaskEventKind) -> &'static str {
    match kind {
        TaskEventKind::Started => "task started (monitor registered, worker spawned)",
        TaskEventKind::CancelRequested => "cancellation requested by a caller",
        TaskEventKind::Aborted => "engine work aborted",
        TaskEventKind::Completed => "task completed",
        TaskEventKind::Failed => "task failed",
        TaskEventKind::Cancelled => "task cancelled",
        TaskEventKind::Evicted => "task evicted after grace period",
    }
}

#[inline]
pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.kind());

    match e.kind() {
        TaskEventKind::Started => debug!(task = e.as_task(), session = e.as_session(), "{msg}"),
        TaskEventKind::CancelRequested => {
            info!(task = e.as_task(), session = e.as_session(), "{msg}")
        }
        TaskEventKind::Aborted => debug!(task = e.as_task(), session = e.as_session(), "{msg}"),
        TaskEventKind::Completed => info!(
            task = e.as_task(),
            session = e.as_session(),
            elapsed_ms = e.elapsed_ms(),
            "{msg}"
        ),
        TaskEventKind::Cancelled => info!(
            task = e.as_task(),
            session = e.as_session(),
            elapsed_ms = e.elapsed_ms(),
            "{msg}"
        ),
        TaskEventKind::Failed => error!(
            task = e.as_task(),
            session = e.as_session(),
            kind = e.as_failure(),
            reason = e.as_reason(),
            elapsed_ms = e.elapsed_ms(),
            "{msg}"
        ),
        TaskEventKind::Evicted => trace!(task = e.as_task(), session = e.as_session(), "{msg}"),
    }
}
