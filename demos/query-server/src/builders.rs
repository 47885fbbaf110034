use std::{sync::Arc, time::Duration};

use qwatch_core::{
    ActionBuilder, ActionError, ActionRouter, BoxAction, BuiltAction, CompletionCallback, CoreError,
    MessageSink, Session,
};
use qwatch_model::{MessageScope, TaskRequest};

use crate::engine::SimulatedEngine;

const DEFAULT_ROW_DELAY_MS: u64 = 10;

/// Parameters shared by scan-style requests.
struct ScanParams {
    rows: u64,
    row_delay: Duration,
    fail_at: Option<u64>,
}

impl ScanParams {
    fn parse(request: &TaskRequest) -> Result<Self, CoreError> {
        let rows = request
            .param_u64("rows")?
            .ok_or_else(|| CoreError::InvalidRequest("parameter 'rows' is required".into()))?;
        let delay_ms = request.param_u64("row_delay_ms")?.unwrap_or(DEFAULT_ROW_DELAY_MS);
        Ok(Self {
            rows,
            row_delay: Duration::from_millis(delay_ms),
            fail_at: request.param_u64("fail_at")?,
        })
    }
}

/// `scan`: reads rows and reports how many were read once the results are "saved".
pub struct ScanBuilder {
    engine: Arc<SimulatedEngine>,
}

impl ScanBuilder {
    pub fn new(engine: Arc<SimulatedEngine>) -> Self {
        Self { engine }
    }
}

impl ActionBuilder for ScanBuilder {
    fn name(&self) -> &'static str {
        "scan"
    }

    fn supports(&self, request: &TaskRequest) -> bool {
        request.kind == "scan"
    }

    fn build(&self, request: &TaskRequest, session: &Session) -> Result<BuiltAction, CoreError> {
        let params = ScanParams::parse(request)?;
        let engine = Arc::clone(&self.engine);
        let label = request.param("label").unwrap_or("query").to_string();

        let action: BoxAction = Box::new(move |ctx| {
            let read = engine.scan(ctx.token(), params.rows, params.row_delay, params.fail_at)?;
            if read == 0 {
                return Err(ActionError::EmptyResult);
            }
            Ok(())
        });

        let messages = Arc::clone(session.messages());
        let rows = params.rows;
        let on_complete: CompletionCallback = Box::new(move |_| {
            messages.append(MessageScope::Messages, format!("{label} finished: {rows} rows"));
            Ok(())
        });

        Ok(BuiltAction::new(action).with_completion(on_complete))
    }
}

/// `count`: like `scan` but publishes the row count on the monitor.
pub struct CountBuilder {
    engine: Arc<SimulatedEngine>,
}

impl CountBuilder {
    pub fn new(engine: Arc<SimulatedEngine>) -> Self {
        Self { engine }
    }
}

impl ActionBuilder for CountBuilder {
    fn name(&self) -> &'static str {
        "count"
    }

    fn supports(&self, request: &TaskRequest) -> bool {
        request.kind == "count"
    }

    fn build(&self, request: &TaskRequest, _session: &Session) -> Result<BuiltAction, CoreError> {
        let params = ScanParams::parse(request)?;
        let engine = Arc::clone(&self.engine);

        Ok(BuiltAction::new(Box::new(move |ctx| {
            let n = engine.scan(ctx.token(), params.rows, params.row_delay, params.fail_at)?;
            ctx.monitor().set_count(n);
            Ok(())
        })))
    }
}

pub fn router(engine: Arc<SimulatedEngine>) -> ActionRouter {
    ActionRouter::new()
        .with_builder(Arc::new(ScanBuilder::new(Arc::clone(&engine))))
        .with_builder(Arc::new(CountBuilder::new(engine)))
}
