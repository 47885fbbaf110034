//! Supervision of slow, cancellable background work.
//!
//! A [`TaskSupervisor`] runs an action on a worker thread, polls the task's [`Monitor`], aborts the
//! engine-side [`CancelToken`] when cancellation is requested, and keeps the terminal monitor in the
//! session's [`TaskRegistry`] for a grace period before evicting it.

pub mod action;
pub use action::{ActionError, BoxAction, CompletionCallback, TaskContext};

pub mod config;
pub use config::{MessageCatalog, SupervisorConfig};

pub mod engine;
pub use engine::{CancelToken, EngineError, ExecutionEngine, TokenTable};

mod error;
pub use error::{CoreError, MonitorError};

pub mod event;
pub use event::{TaskEvent, TaskEventKind, TaskObserver};

pub mod messages;
pub use messages::{MessageSink, SessionMessages};

mod monitor;
pub use monitor::Monitor;

mod registry;
pub use registry::TaskRegistry;

pub mod router;
pub use router::{ActionBuilder, ActionRouter, BuiltAction};

pub mod runner;
pub use runner::{RunOutcome, RunReport, TaskFailure};

pub mod session;
pub use session::{Privileges, Session, SessionStore, SessionStoreBuilder};

pub mod supervisor;
pub use supervisor::{SupervisorBuilder, TaskSupervisor};
