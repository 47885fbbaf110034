//! In-process stand-in for a query engine: scans are sleeps split into rows.

use std::{thread, time::Duration};

use qwatch_core::{CancelToken, EngineError, ExecutionEngine, TokenTable};
use tracing::trace;

pub struct SimulatedEngine {
    tokens: TokenTable,
    duration_limit: Duration,
}

impl SimulatedEngine {
    pub fn new(duration_limit: Duration) -> Self {
        Self {
            tokens: TokenTable::new(),
            duration_limit,
        }
    }

    /// Scan `rows` rows, spending `row_delay` on each; returns the number of rows read.
    ///
    /// Scans estimated to exceed the duration limit are refused up front. `fail_at` makes the
    /// scan fail when it reaches that row.
    pub fn scan(
        &self,
        token: Option<CancelToken>,
        rows: u64,
        row_delay: Duration,
        fail_at: Option<u64>,
    ) -> Result<u64, EngineError> {
        let estimate = row_delay.saturating_mul(u32::try_from(rows).unwrap_or(u32::MAX));
        if estimate > self.duration_limit {
            return Err(EngineError::DurationLimit(format!(
                "estimated {}ms, limit {}ms",
                estimate.as_millis(),
                self.duration_limit.as_millis()
            )));
        }

        for row in 0..rows {
            if let Some(token) = token {
                self.tokens.check(token)?;
            }
            if fail_at == Some(row) {
                return Err(EngineError::Failure(format!("corrupt page at row {row}")));
            }
            thread::sleep(row_delay);
        }
        trace!(rows, "scan finished");
        Ok(rows)
    }

    pub fn active_tokens(&self) -> usize {
        self.tokens.len()
    }
}

impl ExecutionEngine for SimulatedEngine {
    fn register_token(&self) -> Result<CancelToken, EngineError> {
        self.tokens.register_token()
    }

    fn deregister_token(&self, token: CancelToken) -> Result<(), EngineError> {
        self.tokens.deregister_token(token)
    }

    fn abort(&self, token: CancelToken) -> Result<(), EngineError> {
        self.tokens.abort(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_scans_hit_the_duration_limit() {
        let engine = SimulatedEngine::new(Duration::from_millis(100));
        let err = engine
            .scan(None, 1_000, Duration::from_millis(1), None)
            .unwrap_err();
        assert!(err.is_duration_limit());
    }

    #[test]
    fn aborted_tokens_stop_the_scan() {
        let engine = SimulatedEngine::new(Duration::from_secs(10));
        let token = engine.register_token().unwrap();
        engine.abort(token).unwrap();

        assert_eq!(
            engine.scan(Some(token), 10, Duration::from_millis(1), None),
            Err(EngineError::Aborted)
        );
    }

    #[test]
    fn scans_report_rows_and_failures() {
        let engine = SimulatedEngine::new(Duration::from_secs(10));
        assert_eq!(engine.scan(None, 3, Duration::ZERO, None), Ok(3));
        assert!(matches!(
            engine.scan(None, 3, Duration::ZERO, Some(1)),
            Err(EngineError::Failure(_))
        ));
    }
}
