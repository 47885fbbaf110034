use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{CancelToken, EngineError, ExecutionEngine};

/// Engine-side token table.
///
/// Each registered [`CancelToken`] maps to a [`CancellationToken`] that the engine's own operations
/// watch. Engines embed a table and delegate the [`ExecutionEngine`] hooks to it.
#[derive(Default)]
pub struct TokenTable {
    next: AtomicU64,
    tokens: Mutex<HashMap<CancelToken, CancellationToken>>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancellation handle for a registered token.
    pub fn cancellation(&self, token: CancelToken) -> Option<CancellationToken> {
        self.lock().get(&token).cloned()
    }

    /// `Err(Aborted)` once the token was aborted, `Err(UnknownToken)` if it is not registered.
    ///
    /// Long-running engine operations call this between chunks of work.
    pub fn check(&self, token: CancelToken) -> Result<(), EngineError> {
        match self.lock().get(&token) {
            Some(c) if c.is_cancelled() => Err(EngineError::Aborted),
            Some(_) => Ok(()),
            None => Err(EngineError::UnknownToken(token)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CancelToken, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ExecutionEngine for TokenTable {
    fn register_token(&self) -> Result<CancelToken, EngineError> {
        let token = CancelToken::from_raw(self.next.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(token, CancellationToken::new());
        trace!(%token, "cancellation token registered");
        Ok(token)
    }

    fn deregister_token(&self, token: CancelToken) -> Result<(), EngineError> {
        self.lock()
            .remove(&token)
            .map(|_| trace!(%token, "cancellation token deregistered"))
            .ok_or(EngineError::UnknownToken(token))
    }

    fn abort(&self, token: CancelToken) -> Result<(), EngineError> {
        let cancellation = self
            .cancellation(token)
            .ok_or(EngineError::UnknownToken(token))?;
        cancellation.cancel();
        trace!(%token, "cancellation token aborted");
        Ok(())
    }
}
