//! Session-scoped message sets shown to the user on their next page.

use std::sync::{Mutex, MutexGuard, PoisonError};

use qwatch_model::MessageScope;

/// Receiver of user-facing messages.
///
/// Implementations must keep set semantics per scope: recording identical text twice keeps one copy.
pub trait MessageSink: Send + Sync + 'static {
    fn append(&self, scope: MessageScope, text: String);
}

/// In-memory message sets of one session, insertion ordered.
#[derive(Debug, Default)]
pub struct SessionMessages {
    inner: Mutex<Sets>,
}

#[derive(Debug, Default)]
struct Sets {
    messages: Vec<String>,
    errors: Vec<String>,
}

impl Sets {
    fn scope(&mut self, scope: MessageScope) -> &mut Vec<String> {
        match scope {
            MessageScope::Messages => &mut self.messages,
            MessageScope::Errors => &mut self.errors,
        }
    }
}

impl SessionMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&self, text: impl Into<String>) {
        self.append(MessageScope::Messages, text.into());
    }

    pub fn record_error(&self, text: impl Into<String>) {
        self.append(MessageScope::Errors, text.into());
    }

    /// Current contents of a scope.
    pub fn list(&self, scope: MessageScope) -> Vec<String> {
        self.lock().scope(scope).clone()
    }

    /// Return and clear a scope (messages are displayed once).
    pub fn drain(&self, scope: MessageScope) -> Vec<String> {
        std::mem::take(self.lock().scope(scope))
    }

    pub fn len(&self, scope: MessageScope) -> usize {
        self.lock().scope(scope).len()
    }

    pub fn is_empty(&self, scope: MessageScope) -> bool {
        self.len(scope) == 0
    }

    fn lock(&self) -> MutexGuard<'_, Sets> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageSink for SessionMessages {
    fn append(&self, scope: MessageScope, text: String) {
        let mut sets = self.lock();
        let set = sets.scope(scope);
        if !set.contains(&text) {
            set.push(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_messages_are_kept_once() {
        let m = SessionMessages::new();
        m.record_error("query failed");
        m.record_error("query failed");
        m.record_error("another");

        assert_eq!(m.list(MessageScope::Errors), vec!["query failed", "another"]);
    }

    #[test]
    fn scopes_are_independent() {
        let m = SessionMessages::new();
        m.record_message("saved as query_1");
        m.record_error("query failed");

        assert_eq!(m.len(MessageScope::Messages), 1);
        assert_eq!(m.len(MessageScope::Errors), 1);
    }

    #[test]
    fn drain_clears_only_its_scope() {
        let m = SessionMessages::new();
        m.record_message("hello");
        m.record_error("boom");

        assert_eq!(m.drain(MessageScope::Errors), vec!["boom"]);
        assert!(m.is_empty(MessageScope::Errors));
        assert_eq!(m.list(MessageScope::Messages), vec!["hello"]);

        m.record_error("boom");
        assert_eq!(m.len(MessageScope::Errors), 1, "drained text may be recorded again");
    }
}
