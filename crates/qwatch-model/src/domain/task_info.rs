use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::{TaskId, TaskStatus};

/// Point-in-time snapshot of a task monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    /// Task identifier.
    pub id: TaskId,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Whether somebody asked for the task to be cancelled.
    ///
    /// Stays `true` after the task reached a terminal state, including when it completed anyway.
    pub cancel_requested: bool,
    /// Numeric result for count-style tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// When the monitor was created.
    #[serde(with = "time_serde")]
    pub started_at: SystemTime,
    /// When the monitor reached its terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_time_serde")]
    pub finished_at: Option<SystemTime>,
}

mod time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        since_epoch.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(secs))
    }
}

mod opt_time_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(time) => super::time_serde::serialize(time, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(|secs| UNIX_EPOCH + std::time::Duration::from_secs(secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(id: &str) -> TaskInfo {
        TaskInfo {
            id: TaskId::from(id),
            status: TaskStatus::Running,
            cancel_requested: false,
            count: None,
            started_at: SystemTime::now(),
            finished_at: None,
        }
    }

    #[test]
    fn running_task_omits_optional_fields() {
        let json = serde_json::to_string(&running("7")).unwrap();
        assert!(json.contains(r#""status":"running""#));
        assert!(json.contains(r#""cancelRequested":false"#));
        assert!(!json.contains("count"));
        assert!(!json.contains("finishedAt"));
    }

    #[test]
    fn finished_task_keeps_count_and_finish_time() {
        let mut info = running("8");
        info.status = TaskStatus::Completed;
        info.count = Some(1234);
        info.finished_at = Some(SystemTime::now());

        let json = serde_json::to_string(&info).unwrap();
        let back: TaskInfo = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, info.id);
        assert_eq!(back.status, TaskStatus::Completed);
        assert_eq!(back.count, Some(1234));
        assert!(back.finished_at.is_some());
    }
}
