mod task_id;
pub use task_id::TaskId;

mod session_id;
pub use session_id::SessionId;

mod task_status;
pub use task_status::{Outcome, TaskStatus};

mod failure;
pub use failure::FailureKind;

mod message;
pub use message::MessageScope;

mod task_info;
pub use task_info::TaskInfo;

mod task_request;
pub use task_request::{TaskParams, TaskRequest};

/// Interval value in milliseconds.
///
/// Used by configuration structs where a duration has to survive serialization.
pub type IntervalMs = u64;
