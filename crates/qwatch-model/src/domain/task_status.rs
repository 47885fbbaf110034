use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Lifecycle state of a background task as recorded on its monitor.
///
/// The only legal transitions are `Running` to one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Task is executing (or has not been observed to finish yet).
    Running,
    /// Task finished successfully and its completion callback has run.
    Completed,
    /// Task finished with an error.
    Failed,
    /// Task was cancelled by its user or an administrator.
    Cancelled,
}

impl TaskStatus {
    /// Returns `true` if the task is in a terminal state (won't transition further).
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    /// Terminal outcome, `None` while running.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            TaskStatus::Running => None,
            TaskStatus::Completed => Some(Outcome::Completed),
            TaskStatus::Failed => Some(Outcome::Failed),
            TaskStatus::Cancelled => Some(Outcome::Cancelled),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            _ => Err(ModelError::UnknownValue {
                what: "task status",
                value: s.to_string(),
            }),
        }
    }
}

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        TaskStatus::from(*self).as_str()
    }
}

impl From<Outcome> for TaskStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Completed => TaskStatus::Completed,
            Outcome::Failed => TaskStatus::Failed,
            Outcome::Cancelled => TaskStatus::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_is_live() {
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn outcome_matches_terminal_status() {
        assert_eq!(TaskStatus::Running.outcome(), None);
        for outcome in [Outcome::Completed, Outcome::Failed, Outcome::Cancelled] {
            assert_eq!(TaskStatus::from(outcome).outcome(), Some(outcome));
        }
    }

    #[test]
    fn parses_both_spellings_of_cancelled() {
        assert_eq!("Cancelled".parse::<TaskStatus>().unwrap(), TaskStatus::Cancelled);
        assert_eq!("canceled".parse::<TaskStatus>().unwrap(), TaskStatus::Cancelled);
        assert!("paused".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let json = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(json, r#""cancelled""#);
        let json = serde_json::to_string(&Outcome::Failed).unwrap();
        assert_eq!(json, r#""failed""#);
    }
}
