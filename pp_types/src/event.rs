use crate::{RunId, UnitId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Status carried by a phase event.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    #[strum(to_string = "running", serialize = "r")]
    Running,
    #[strum(to_string = "success", serialize = "s")]
    Success,
    #[strum(to_string = "failed", serialize = "f")]
    Failed,
}

impl PhaseStatus {
    /// Single-letter code used by older status tables.
    pub fn code(self) -> char {
        match self {
            PhaseStatus::Running => 'r',
            PhaseStatus::Success => 's',
            PhaseStatus::Failed => 'f',
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PhaseStatus::Running)
    }
}

/// An immutable record of a phase attempt changing state.
///
/// `unit` is `None` for run-level events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEvent {
    pub run_id: RunId,
    pub unit: Option<UnitId>,
    pub phase: u32,
    pub status: PhaseStatus,
    pub timestamp: DateTime<Utc>,
}

impl PhaseEvent {
    /// An event stamped with the current time.
    pub fn now(run_id: RunId, unit: Option<UnitId>, phase: u32, status: PhaseStatus) -> Self {
        PhaseEvent {
            run_id,
            unit,
            phase,
            status,
            timestamp: Utc::now(),
        }
    }
}

/// A [`PhaseEvent`] together with its insertion sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub seq: i64,
    #[serde(flatten)]
    pub event: PhaseEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_parsing() {
        assert_eq!(PhaseStatus::from_str("running").unwrap(), PhaseStatus::Running);
        assert_eq!(PhaseStatus::from_str("s").unwrap(), PhaseStatus::Success);
        assert_eq!(PhaseStatus::Failed.to_string(), "failed");
        assert_eq!(PhaseStatus::Failed.code(), 'f');
        assert!(PhaseStatus::from_str("done").is_err());
        assert!(!PhaseStatus::Running.is_terminal());
    }

    #[test]
    fn test_event_json() {
        let event = PhaseEvent::now(RunId(1), Some("OG1".into()), 2, PhaseStatus::Success);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["unit"], "OG1");
        assert_eq!(json["phase"], 2);
    }
}
