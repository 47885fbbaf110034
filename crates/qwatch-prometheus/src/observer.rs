use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use qwatch_core::{TaskEvent, TaskEventKind, TaskObserver};
use tracing::trace;

const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 1800.0];

/// Task metrics backed by a private prometheus [`Registry`].
#[derive(Clone)]
pub struct PrometheusObserver {
    registry: Registry,
    started: IntCounter,
    finished: IntCounterVec,
    failures: IntCounterVec,
    active: IntGauge,
    duration: HistogramVec,
}

impl PrometheusObserver {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Register the metrics into an existing registry.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let started = IntCounter::with_opts(Opts::new(
            "qwatch_tasks_started_total",
            "Background tasks started",
        ))?;
        let finished = IntCounterVec::new(
            Opts::new("qwatch_tasks_finished_total", "Background tasks that reached a terminal state"),
            &["outcome"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new("qwatch_task_failures_total", "Failed tasks by failure kind"),
            &["kind"],
        )?;
        let active = IntGauge::with_opts(Opts::new(
            "qwatch_tasks_active",
            "Tasks started and not yet terminal",
        ))?;
        let duration = HistogramVec::new(
            HistogramOpts::new("qwatch_task_duration_seconds", "Time from start to terminal state")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["outcome"],
        )?;

        registry.register(Box::new(started.clone()))?;
        registry.register(Box::new(finished.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(active.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            started,
            finished,
            failures,
            active,
            duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format, ready for a `/metrics` response body.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    fn finish(&self, event: &TaskEvent) {
        let outcome = event.kind.as_str();
        self.finished.with_label_values(&[outcome]).inc();
        self.active.dec();
        if let Some(elapsed) = event.elapsed {
            self.duration
                .with_label_values(&[outcome])
                .observe(elapsed.as_secs_f64());
        }
    }
}

impl TaskObserver for PrometheusObserver {
    fn on_event(&self, event: &TaskEvent) {
        match event.kind {
            TaskEventKind::Started => {
                self.started.inc();
                self.active.inc();
            }
            TaskEventKind::Completed | TaskEventKind::Cancelled => self.finish(event),
            TaskEventKind::Failed => {
                self.finish(event);
                if let Some(kind) = event.failure {
                    self.failures.with_label_values(&[kind.as_str()]).inc();
                }
            }
            TaskEventKind::CancelRequested | TaskEventKind::Aborted | TaskEventKind::Evicted => {
                trace!(task = %event.task, kind = event.kind.as_str(), "event not metered");
            }
        }
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qwatch_model::{FailureKind, TaskId};
    use std::time::Duration;

    fn event(kind: TaskEventKind, id: &str) -> TaskEvent {
        TaskEvent::new(kind, TaskId::from(id))
    }

    #[test]
    fn lifecycle_updates_counters_and_gauge() {
        let m = PrometheusObserver::new().unwrap();

        m.on_event(&event(TaskEventKind::Started, "1"));
        m.on_event(&event(TaskEventKind::Started, "2"));
        assert_eq!(m.started.get(), 2);
        assert_eq!(m.active.get(), 2);

        m.on_event(&event(TaskEventKind::Completed, "1").with_elapsed(Duration::from_millis(10)));
        m.on_event(
            &event(TaskEventKind::Failed, "2")
                .with_failure(FailureKind::EngineTimeout, "limit")
                .with_elapsed(Duration::from_secs(2)),
        );

        assert_eq!(m.active.get(), 0);
        assert_eq!(m.finished.with_label_values(&["completed"]).get(), 1);
        assert_eq!(m.finished.with_label_values(&["failed"]).get(), 1);
        assert_eq!(m.failures.with_label_values(&["engine_timeout"]).get(), 1);
        assert_eq!(m.duration.with_label_values(&["failed"]).get_sample_count(), 1);
    }

    #[test]
    fn non_terminal_events_do_not_move_the_gauge() {
        let m = PrometheusObserver::new().unwrap();
        m.on_event(&event(TaskEventKind::Started, "1"));
        m.on_event(&event(TaskEventKind::CancelRequested, "1"));
        m.on_event(&event(TaskEventKind::Aborted, "1"));
        assert_eq!(m.active.get(), 1);

        m.on_event(&event(TaskEventKind::Cancelled, "1"));
        m.on_event(&event(TaskEventKind::Evicted, "1"));
        assert_eq!(m.active.get(), 0);
    }

    #[test]
    fn encode_exposes_metric_names() {
        let m = PrometheusObserver::new().unwrap();
        m.on_event(&event(TaskEventKind::Started, "1"));

        let text = m.encode().unwrap();
        assert!(text.contains("qwatch_tasks_started_total 1"));
        assert!(text.contains("qwatch_tasks_active 1"));
    }

    #[test]
    fn registering_twice_in_one_registry_fails() {
        let registry = Registry::new();
        assert!(PrometheusObserver::with_registry(registry.clone()).is_ok());
        assert!(PrometheusObserver::with_registry(registry).is_err());
    }
}
