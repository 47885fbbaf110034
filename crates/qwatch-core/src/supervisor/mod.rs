use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use qwatch_model::{Outcome, SessionId, TaskId, TaskInfo};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    action::{ActionError, BoxAction, CompletionCallback, TaskContext},
    config::SupervisorConfig,
    engine::{CancelToken, ExecutionEngine},
    error::CoreError,
    event::{self, TaskEvent, TaskEventKind, TaskObserver},
    messages::{MessageSink, SessionMessages},
    monitor::Monitor,
    registry::TaskRegistry,
    runner::{Reporter, RunHandle, RunOutcome, RunReport, TaskFailure, TaskRunner, panic_message},
    session::Privileges,
};


/// Starts, watches and cleans up background tasks of one session.
///
/// Cloning is cheap; clones share the registry and configuration.
#[derive(Clone)]
pub struct TaskSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: SupervisorConfig,
    registry: TaskRegistry,
    engine: Option<Arc<dyn ExecutionEngine>>,
    reporter: Reporter,
    observers: Vec<Arc<dyn TaskObserver>>,
    session: Option<SessionId>,
}

pub struct SupervisorBuilder {
    config: SupervisorConfig,
    registry: Option<TaskRegistry>,
    engine: Option<Arc<dyn ExecutionEngine>>,
    messages: Option<Arc<dyn MessageSink>>,
    privileges: Privileges,
    observers: Vec<Arc<dyn TaskObserver>>,
    session: Option<SessionId>,
}

impl SupervisorBuilder {
    fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            registry: None,
            engine: None,
            messages: None,
            privileges: Privileges::default(),
            observers: Vec::new(),
            session: None,
        }
    }

    /// Engine whose cancellation hooks the runner uses; without one cancellation is best effort.
    pub fn with_engine(mut self, engine: Arc<dyn ExecutionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_messages(mut self, messages: Arc<dyn MessageSink>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_privileges(mut self, privileges: Privileges) -> Self {
        self.privileges = privileges;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_observers(mut self, observers: Vec<Arc<dyn TaskObserver>>) -> Self {
        self.observers.extend(observers);
        self
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    pub fn build(self) -> TaskSupervisor {
        let sink = self
            .messages
            .unwrap_or_else(|| Arc::new(SessionMessages::new()));
        let reporter = Reporter {
            sink,
            catalog: self.config.messages.clone(),
            privileges: self.privileges,
        };
        TaskSupervisor {
            inner: Arc::new(Inner {
                config: self.config,
                registry: self.registry.unwrap_or_default(),
                engine: self.engine,
                reporter,
                observers: self.observers,
                session: self.session,
            }),
        }
    }
}

/// How the supervisor loop settled a task.
struct Verdict {
    outcome: Outcome,
    failure: Option<TaskFailure>,
}

impl Verdict {
    fn completed() -> Self {
        Self {
            outcome: Outcome::Completed,
            failure: None,
        }
    }

    fn cancelled() -> Self {
        Self {
            outcome: Outcome::Cancelled,
            failure: None,
        }
    }

    fn failed(failure: TaskFailure) -> Self {
        Self {
            outcome: Outcome::Failed,
            failure: Some(failure),
        }
    }
}

impl TaskSupervisor {
    pub fn builder(config: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.inner.session.as_ref()
    }

    /// Start `action` in the background and return its id immediately.
    ///
    /// `on_complete` runs once, only on success, before the monitor is marked completed.
    /// Must be called from within a tokio runtime.
    pub fn start_task<F>(
        &self,
        action: F,
        on_complete: Option<CompletionCallback>,
    ) -> Result<TaskId, CoreError>
    where
        F: FnOnce(&TaskContext) -> Result<(), ActionError> + Send + 'static,
    {
        self.start_with_monitor(Monitor::new(), Box::new(action), on_complete)
    }

    /// Start a count-style task; the returned number is published on the monitor before it completes.
    pub fn start_count<F>(&self, count: F) -> Result<TaskId, CoreError>
    where
        F: FnOnce(&TaskContext) -> Result<u64, ActionError> + Send + 'static,
    {
        self.start_task(
            move |ctx| {
                let n = count(ctx)?;
                ctx.monitor().set_count(n);
                Ok(())
            },
            None,
        )
    }

    /// Start a task supervised through a caller-created monitor.
    #[instrument(level = "debug", skip_all, fields(session = ?self.inner.session))]
    pub fn start_with_monitor(
        &self,
        monitor: Monitor,
        action: BoxAction,
        on_complete: Option<CompletionCallback>,
    ) -> Result<TaskId, CoreError> {
        let handle = Handle::try_current().map_err(|_| CoreError::NoRuntime)?;
        if let Some(id) = monitor.id() {
            return Err(CoreError::MonitorInUse(id.clone()));
        }
        if monitor.is_terminal() {
            return Err(CoreError::InvalidRequest(format!(
                "monitor is already {}",
                monitor.status().as_str()
            )));
        }

        let id = self.inner.registry.mint_id();
        monitor.bind(id.clone())?;
        self.inner.registry.register(id.clone(), monitor.clone())?;

        let runner = TaskRunner::new(
            TaskContext::new(id.clone(), monitor.clone()),
            action,
            self.inner.engine.clone(),
        );
        let run = runner.spawn();
        debug!(task = %id, token = ?run.token, "runner spawned");
        self.emit(TaskEvent::new(TaskEventKind::Started, id.clone()));

        let this = self.clone();
        let task = id.clone();
        handle.spawn(async move { this.drive(task, monitor, run, on_complete).await });

        Ok(id)
    }

    pub fn get_monitor(&self, id: &TaskId) -> Option<Monitor> {
        self.inner.registry.lookup(id)
    }

    pub fn get_info(&self, id: &TaskId) -> Option<TaskInfo> {
        self.get_monitor(id).and_then(|m| m.info())
    }

    pub fn list(&self) -> Vec<TaskInfo> {
        self.inner.registry.snapshot()
    }

    /// Ask for a task to be cancelled.
    ///
    /// A task that already finished is left alone; only ids unknown to the registry are an error.
    #[instrument(level = "debug", skip(self), fields(session = ?self.inner.session))]
    pub fn request_cancel(&self, id: &TaskId) -> Result<(), CoreError> {
        let monitor = self
            .get_monitor(id)
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))?;
        if monitor.request_cancel() {
            info!(task = %id, "cancellation requested");
            self.emit(TaskEvent::new(TaskEventKind::CancelRequested, id.clone()));
        } else {
            debug!(task = %id, status = monitor.status().as_str(), "cancellation already requested or task finished");
        }
        Ok(())
    }

    /// Request cancellation of every live task of this supervisor.
    pub fn cancel_all(&self) -> usize {
        let flagged = self.inner.registry.request_cancel_all();
        if flagged > 0 {
            info!(count = flagged, session = ?self.inner.session, "cancellation requested for all live tasks");
        }
        flagged
    }

    /// Block until the task is terminal.
    pub async fn wait_for_outcome(&self, id: &TaskId) -> Result<Outcome, CoreError> {
        let monitor = self
            .get_monitor(id)
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))?;
        Ok(monitor.wait().await?)
    }

    /// Like [`wait_for_outcome`](Self::wait_for_outcome) but gives up after `timeout`, returning `None`.
    pub async fn wait_for_outcome_timeout(
        &self,
        id: &TaskId,
        timeout: Duration,
    ) -> Result<Option<Outcome>, CoreError> {
        let monitor = self
            .get_monitor(id)
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))?;
        match time::timeout(timeout, monitor.wait()).await {
            Ok(outcome) => Ok(Some(outcome?)),
            Err(_) => Ok(None),
        }
    }

    /// Start `action` and wait for it to finish.
    pub async fn run<F>(
        &self,
        action: F,
        on_complete: Option<CompletionCallback>,
    ) -> Result<Outcome, CoreError>
    where
        F: FnOnce(&TaskContext) -> Result<(), ActionError> + Send + 'static,
    {
        let monitor = Monitor::new();
        self.start_with_monitor(monitor.clone(), Box::new(action), on_complete)?;
        Ok(monitor.wait().await?)
    }

    async fn drive(
        self,
        id: TaskId,
        monitor: Monitor,
        run: RunHandle,
        on_complete: Option<CompletionCallback>,
    ) {
        let started = Instant::now();
        let verdict = self.supervise(&id, &monitor, run, on_complete).await;
        let elapsed = started.elapsed();

        let mut event = TaskEvent::new(verdict.outcome.into(), id.clone()).with_elapsed(elapsed);
        if let Some(failure) = &verdict.failure {
            event = event.with_failure(failure.kind, failure.detail.clone());
        }
        self.emit(event);
        info!(
            task = %id,
            outcome = verdict.outcome.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "task finished"
        );

        // Terminal monitor stays retrievable for the grace period.
        time::sleep(self.inner.config.grace_period()).await;
        if self.inner.registry.unregister(&id).is_some() {
            trace!(task = %id, "monitor evicted");
            self.emit(TaskEvent::new(TaskEventKind::Evicted, id));
        }
    }

    async fn supervise(
        &self,
        id: &TaskId,
        monitor: &Monitor,
        run: RunHandle,
        on_complete: Option<CompletionCallback>,
    ) -> Verdict {
        let RunHandle { token, mut join } = run;
        let mut changes = monitor.subscribe();
        let mut ticker = time::interval(self.inner.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let joined = loop {
            tokio::select! {
                biased;
                joined = &mut join => break joined,
                _ = ticker.tick() => {}
                Ok(()) = changes.changed() => {}
            }
            if monitor.should_cancel() {
                return self.cancel(id, monitor, token, join);
            }
        };

        let report = joined.unwrap_or_else(|err| {
            error!(task = %id, error = %err, "worker did not return a report");
            RunReport::failed(TaskFailure::unexpected(format!(
                "worker terminated abnormally: {err}"
            )))
        });
        if let Some(err) = &report.deregister_error {
            debug!(task = %id, error = %err, "token deregistration failed; outcome unchanged");
        }

        match report.outcome {
            RunOutcome::Succeeded => self.complete(id, monitor, on_complete).await,
            RunOutcome::Failed(failure) if monitor.cancel_requested() => {
                debug!(
                    task = %id,
                    kind = failure.kind.as_str(),
                    detail = %failure.detail,
                    "action failed after cancellation was requested"
                );
                self.mark(id, monitor, Outcome::Cancelled);
                Verdict::cancelled()
            }
            RunOutcome::Failed(failure) => self.fail(id, monitor, failure),
        }
    }

    /// Run the callback on the blocking pool, then mark the task completed.
    async fn complete(
        &self,
        id: &TaskId,
        monitor: &Monitor,
        on_complete: Option<CompletionCallback>,
    ) -> Verdict {
        if let Some(callback) = on_complete {
            let target = monitor.clone();
            let result = tokio::task::spawn_blocking(move || {
                panic::catch_unwind(AssertUnwindSafe(|| callback(&target)))
            })
            .await;
            let failure = match result {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(err))) => Some(TaskFailure::unexpected(format!(
                    "completion callback failed: {err:?}"
                ))),
                Ok(Err(payload)) => Some(TaskFailure::unexpected(format!(
                    "completion callback panicked: {}",
                    panic_message(payload.as_ref())
                ))),
                Err(err) => Some(TaskFailure::unexpected(format!(
                    "completion callback did not finish: {err}"
                ))),
            };
            if let Some(failure) = failure {
                return self.fail(id, monitor, failure);
            }
        }
        self.mark(id, monitor, Outcome::Completed);
        Verdict::completed()
    }

    fn fail(&self, id: &TaskId, monitor: &Monitor, failure: TaskFailure) -> Verdict {
        error!(task = %id, kind = failure.kind.as_str(), detail = %failure.detail, "task failed");
        self.inner.reporter.record(&failure);
        self.mark(id, monitor, Outcome::Failed);
        Verdict::failed(failure)
    }

    fn cancel(
        &self,
        id: &TaskId,
        monitor: &Monitor,
        token: Option<CancelToken>,
        join: JoinHandle<RunReport>,
    ) -> Verdict {
        match (&self.inner.engine, token) {
            (Some(engine), Some(token)) => {
                debug!(task = %id, %token, "aborting engine work");
                if let Err(err) = engine.abort(token) {
                    warn!(task = %id, %token, error = %err, "engine abort failed");
                }
                self.emit(TaskEvent::new(TaskEventKind::Aborted, id.clone()));
            }
            _ => debug!(task = %id, "no cancellation token; the action has to notice on its own"),
        }
        self.mark(id, monitor, Outcome::Cancelled);

        let task = id.clone();
        tokio::spawn(async move {
            match join.await {
                Ok(report) => trace!(%task, outcome = ?report.outcome, "worker unwound after cancellation"),
                Err(err) => warn!(%task, error = %err, "worker ended abnormally after cancellation"),
            }
        });
        Verdict::cancelled()
    }

    fn mark(&self, id: &TaskId, monitor: &Monitor, outcome: Outcome) {
        let result = match outcome {
            Outcome::Completed => monitor.mark_completed(),
            Outcome::Failed => monitor.mark_completed_with_error(),
            Outcome::Cancelled => monitor.mark_cancelled(),
        };
        if let Err(err) = result {
            warn!(task = %id, error = %err, "monitor transition rejected");
        }
    }

    fn emit(&self, event: TaskEvent) {
        if self.inner.observers.is_empty() {
            return;
        }
        let event = event.with_session(self.inner.session.clone());
        event::publish(&self.inner.observers, &event);
    }
}
