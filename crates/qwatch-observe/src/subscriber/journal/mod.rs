use qwatch_core::{TaskEvent, TaskObserver};

use crate::subscriber::view::log_event;

/// Observer that writes every task event to the `tracing` log.
#[derive(Debug, Default)]
pub struct Journal;

impl Journal {
    pub fn new() -> Self {
        Self
    }
}

impl TaskObserver for Journal {
    fn on_event(&self, event: &TaskEvent) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "journal"
    }
}
