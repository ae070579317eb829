//! Reconstruction of the current pipeline state from the event history.
//!
//! [`RunState`] is a pure fold over events; the free functions at the bottom
//! load a run's history from an [`EventLog`] and answer one question each.

use crate::{EventLog, StorageError};
use chrono::{DateTime, Utc};
use pp_types::{LoggedEvent, Phase, PhaseStatus, RunId, UnitId};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

/// A (unit, phase) pair. `unit` is `None` for run-level events.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhaseKey {
    pub unit: Option<UnitId>,
    pub phase: u32,
}

impl Display for PhaseKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{unit}@phase{}", self.phase),
            None => write!(f, "<run>@phase{}", self.phase),
        }
    }
}

/// Where an interrupted run should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    Phase(u32),
    Complete,
}

impl Display for ResumePoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ResumePoint::Phase(p) => write!(f, "phase {p}"),
            ResumePoint::Complete => f.write_str("pipeline complete"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Latest {
    timestamp: DateTime<Utc>,
    seq: i64,
    status: PhaseStatus,
}

/// Per-key summary of one run's history.
#[derive(Debug, Default, Clone)]
pub struct RunState {
    /// Chronologically last event, ties broken by insertion order.
    by_time: HashMap<PhaseKey, Latest>,
    /// Last event in insertion order.
    by_insertion: HashMap<PhaseKey, Latest>,
}

impl RunState {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a LoggedEvent>) -> Self {
        let mut state = RunState::default();
        for logged in events {
            let key = PhaseKey {
                unit: logged.event.unit.clone(),
                phase: logged.event.phase,
            };
            let candidate = Latest {
                timestamp: logged.event.timestamp,
                seq: logged.seq,
                status: logged.event.status,
            };
            state
                .by_time
                .entry(key.clone())
                .and_modify(|cur| {
                    if (candidate.timestamp, candidate.seq) > (cur.timestamp, cur.seq) {
                        *cur = candidate;
                    }
                })
                .or_insert(candidate);
            state
                .by_insertion
                .entry(key)
                .and_modify(|cur| {
                    if candidate.seq > cur.seq {
                        *cur = candidate;
                    }
                })
                .or_insert(candidate);
        }
        state
    }

    /// Authoritative status of (unit, phase), or `None` if nothing was ever
    /// recorded for it.
    pub fn latest_status(&self, unit: Option<&UnitId>, phase: u32) -> Option<PhaseStatus> {
        let key = PhaseKey {
            unit: unit.cloned(),
            phase,
        };
        self.by_time.get(&key).map(|l| l.status)
    }

    /// Keys whose last inserted event is `running`, sorted.
    pub fn in_flight(&self) -> Vec<PhaseKey> {
        let mut keys: Vec<_> = self
            .by_insertion
            .iter()
            .filter(|(_, latest)| latest.status == PhaseStatus::Running)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// The lowest phase in `0..=last_phase` that some unit has not completed
    /// successfully.
    pub fn resume_phase(&self, units: &[UnitId], last_phase: u32) -> ResumePoint {
        (0..=last_phase)
            .find(|&phase| {
                units.iter().any(|unit| {
                    self.latest_status(Some(unit), phase) != Some(PhaseStatus::Success)
                })
            })
            .map_or(ResumePoint::Complete, ResumePoint::Phase)
    }

    /// Whether `unit` has a recorded success for `phase`.
    pub fn succeeded(&self, unit: &UnitId, phase: u32) -> bool {
        self.latest_status(Some(unit), phase) == Some(PhaseStatus::Success)
    }
}

/// Load the state of one run.
pub fn load(log: &dyn EventLog, run_id: RunId) -> Result<RunState, StorageError> {
    Ok(RunState::from_events(&log.events_for(run_id, None, None)?))
}

/// Status of the most recent event for (unit, phase); `None` means unknown.
pub fn latest_status(
    log: &dyn EventLog,
    run_id: RunId,
    unit: Option<&UnitId>,
    phase: u32,
) -> Result<Option<PhaseStatus>, StorageError> {
    let events = log.events_for(run_id, unit, Some(phase))?;
    // events_for(unit = None) is unfiltered, so run-level keys need the fold
    Ok(RunState::from_events(&events).latest_status(unit, phase))
}

/// (unit, phase) pairs of the run that are currently mid-phase.
pub fn in_flight(log: &dyn EventLog, run_id: RunId) -> Result<Vec<PhaseKey>, StorageError> {
    Ok(load(log, run_id)?.in_flight())
}

/// The phase from which the orchestrator should (re)start the run.
pub fn resume_phase(log: &dyn EventLog, run_id: RunId) -> Result<ResumePoint, StorageError> {
    let units: Vec<UnitId> = log.units(run_id)?.into_iter().map(|u| u.id).collect();
    Ok(load(log, run_id)?.resume_phase(&units, Phase::LAST.number()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventLog, MemoryEventLog};
    use chrono::TimeZone;
    use pp_types::{PhaseEvent, Unit};
    use pretty_assertions::assert_eq;

    fn logged(seq: i64, unit: Option<&str>, phase: u32, status: PhaseStatus, t: i64) -> LoggedEvent {
        LoggedEvent {
            seq,
            event: PhaseEvent {
                run_id: RunId(1),
                unit: unit.map(UnitId::from),
                phase,
                status,
                timestamp: Utc.timestamp_opt(t, 0).unwrap(),
            },
        }
    }

    #[test]
    fn test_latest_status_is_last_event() {
        use PhaseStatus::{Failed, Running, Success};
        let og = UnitId::from("OG1");
        let mut events = Vec::new();
        let history = [Running, Failed, Running, Failed, Running, Success];
        for (i, status) in history.iter().enumerate() {
            events.push(logged(i as i64, Some("OG1"), 2, *status, 100 + i as i64));
            let state = RunState::from_events(&events);
            assert_eq!(state.latest_status(Some(&og), 2), Some(*status));
        }
        // replaying the same history gives the same answer
        let doubled: Vec<_> = events.iter().chain(events.iter()).cloned().collect();
        assert_eq!(
            RunState::from_events(&doubled).latest_status(Some(&og), 2),
            Some(Success)
        );
        assert_eq!(RunState::from_events(&events).latest_status(Some(&og), 3), None);
    }

    #[test]
    fn test_latest_status_orders_by_timestamp_then_insertion() {
        let og = UnitId::from("OG1");
        // inserted later but stamped earlier
        let events = vec![
            logged(1, Some("OG1"), 1, PhaseStatus::Success, 200),
            logged(2, Some("OG1"), 1, PhaseStatus::Failed, 100),
        ];
        let state = RunState::from_events(&events);
        assert_eq!(state.latest_status(Some(&og), 1), Some(PhaseStatus::Success));

        let tied = vec![
            logged(1, Some("OG1"), 1, PhaseStatus::Running, 100),
            logged(2, Some("OG1"), 1, PhaseStatus::Failed, 100),
        ];
        assert_eq!(
            RunState::from_events(&tied).latest_status(Some(&og), 1),
            Some(PhaseStatus::Failed)
        );
    }

    #[test]
    fn test_in_flight() {
        let events = vec![
            logged(1, None, 0, PhaseStatus::Running, 1),
            logged(2, None, 0, PhaseStatus::Success, 2),
            logged(3, Some("OG1"), 1, PhaseStatus::Running, 3),
            logged(4, Some("OG2"), 1, PhaseStatus::Running, 4),
            logged(5, Some("OG2"), 1, PhaseStatus::Success, 5),
            logged(6, Some("OG3"), 1, PhaseStatus::Running, 6),
            logged(7, Some("OG3"), 1, PhaseStatus::Failed, 7),
            logged(8, Some("OG3"), 1, PhaseStatus::Running, 8),
        ];
        let in_flight = RunState::from_events(&events).in_flight();
        assert_eq!(
            in_flight,
            vec![
                PhaseKey {
                    unit: Some("OG1".into()),
                    phase: 1
                },
                PhaseKey {
                    unit: Some("OG3".into()),
                    phase: 1
                },
            ]
        );
        assert_eq!(in_flight[0].to_string(), "OG1@phase1");
    }

    #[test]
    fn test_resume_from_lowest_incomplete_phase() {
        let mut events = Vec::new();
        let mut seq = 0;
        let mut push = |unit: &str, phase: u32, status: PhaseStatus| {
            seq += 1;
            events.push(logged(seq, Some(unit), phase, status, seq));
        };
        for phase in 0..=3 {
            push("A", phase, PhaseStatus::Running);
            push("A", phase, PhaseStatus::Success);
        }
        push("B", 0, PhaseStatus::Success);
        // B reached phase 1 but never completed it: the process died mid-phase
        push("B", 1, PhaseStatus::Running);

        let units = [UnitId::from("A"), UnitId::from("B")];
        let state = RunState::from_events(&events);
        assert_eq!(state.resume_phase(&units, 5), ResumePoint::Phase(1));
        assert_eq!(state.resume_phase(&units[..1], 5), ResumePoint::Phase(4));
        assert_eq!(state.resume_phase(&units[..1], 3), ResumePoint::Complete);
        assert_eq!(state.resume_phase(&[], 5), ResumePoint::Complete);
    }

    #[test]
    fn test_resume_after_failure() {
        let events = vec![
            logged(1, Some("A"), 0, PhaseStatus::Success, 1),
            logged(2, Some("A"), 1, PhaseStatus::Success, 2),
            logged(3, Some("A"), 2, PhaseStatus::Success, 3),
            logged(4, Some("B"), 0, PhaseStatus::Success, 4),
            logged(5, Some("B"), 1, PhaseStatus::Success, 5),
            logged(6, Some("B"), 2, PhaseStatus::Failed, 6),
        ];
        let units = [UnitId::from("A"), UnitId::from("B")];
        assert_eq!(
            RunState::from_events(&events).resume_phase(&units, 5),
            ResumePoint::Phase(2)
        );
    }

    #[test]
    fn test_functions_over_log() -> anyhow::Result<()> {
        let log = MemoryEventLog::new();
        let run = log.register_run("resume")?.run().clone();
        let unit = Unit {
            run_id: run.id,
            id: "OG1".into(),
            record_names: vec![],
        };
        log.register_units(run.id, &[unit.clone()])?;
        assert_eq!(resume_phase(&log, run.id)?, ResumePoint::Phase(0));
        for phase in 0..=Phase::LAST.number() {
            log.append(&PhaseEvent::now(
                run.id,
                Some(unit.id.clone()),
                phase,
                PhaseStatus::Success,
            ))?;
        }
        assert_eq!(resume_phase(&log, run.id)?, ResumePoint::Complete);
        assert_eq!(
            latest_status(&log, run.id, Some(&unit.id), 4)?,
            Some(PhaseStatus::Success)
        );
        log.append(&PhaseEvent::now(run.id, None, 0, PhaseStatus::Running))?;
        assert_eq!(
            latest_status(&log, run.id, None, 0)?,
            Some(PhaseStatus::Running)
        );
        assert_eq!(in_flight(&log, run.id)?.len(), 1);
        Ok(())
    }
}
