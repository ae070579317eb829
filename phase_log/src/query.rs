//! Read-only status queries over the event log, for operators and status
//! front ends. None of these write to the log.

use crate::state::{PhaseKey, RunState};
use crate::{EventLog, StorageError};
use itertools::Itertools;
use pp_types::{LoggedEvent, PhaseStatus, Run, Unit, UnitId};

pub struct StatusQuery<'a> {
    log: &'a dyn EventLog,
}

impl<'a> StatusQuery<'a> {
    pub fn new(log: &'a dyn EventLog) -> Self {
        StatusQuery { log }
    }

    pub fn runs(&self) -> Result<Vec<Run>, StorageError> {
        self.log.runs()
    }

    pub fn run(&self, name: &str) -> Result<Option<Run>, StorageError> {
        self.log.find_run(name)
    }

    pub fn units(&self, run: &Run) -> Result<Vec<Unit>, StorageError> {
        self.log.units(run.id)
    }

    /// Every event of the run, newest first.
    pub fn events(&self, run: &Run) -> Result<Vec<LoggedEvent>, StorageError> {
        Ok(newest_first(self.log.events_for(run.id, None, None)?))
    }

    /// Events of the run with the given status, newest first.
    pub fn events_with_status(
        &self,
        run: &Run,
        status: PhaseStatus,
    ) -> Result<Vec<LoggedEvent>, StorageError> {
        Ok(newest_first(
            self.log
                .events_for(run.id, None, None)?
                .into_iter()
                .filter(|e| e.event.status == status)
                .collect(),
        ))
    }

    /// History of one unit across all phases, in insertion order.
    pub fn unit_events(&self, run: &Run, unit: &UnitId) -> Result<Vec<LoggedEvent>, StorageError> {
        self.log.events_for(run.id, Some(unit), None)
    }

    pub fn in_flight(&self, run: &Run) -> Result<Vec<PhaseKey>, StorageError> {
        crate::state::in_flight(self.log, run.id)
    }

    /// Count of units per (phase, latest status), ordered by phase.
    pub fn phase_summary(&self, run: &Run) -> Result<Vec<(u32, PhaseStatus, usize)>, StorageError> {
        let state = RunState::from_events(&self.log.events_for(run.id, None, None)?);
        let units = self.log.units(run.id)?;
        let counts = (0..=pp_types::Phase::LAST.number())
            .cartesian_product(units.iter())
            .filter_map(|(phase, unit)| {
                state
                    .latest_status(Some(&unit.id), phase)
                    .map(|status| (phase, status))
            })
            .counts();
        Ok(counts
            .into_iter()
            .map(|((phase, status), n)| (phase, status, n))
            .sorted_by_key(|&(phase, status, _)| (phase, status.code()))
            .collect())
    }
}

fn newest_first(mut events: Vec<LoggedEvent>) -> Vec<LoggedEvent> {
    events.sort_by(|a, b| (b.event.timestamp, b.seq).cmp(&(a.event.timestamp, a.seq)));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryEventLog;
    use pp_types::PhaseEvent;
    use pretty_assertions::assert_eq;

    fn populated() -> (MemoryEventLog, Run) {
        let log = MemoryEventLog::new();
        let run = log.register_run("q").unwrap().run().clone();
        let units: Vec<Unit> = ["OG1", "OG2"]
            .iter()
            .map(|id| Unit {
                run_id: run.id,
                id: (*id).into(),
                record_names: vec![format!("{id}_a")],
            })
            .collect();
        log.register_units(run.id, &units).unwrap();
        for (unit, status) in [
            ("OG1", PhaseStatus::Running),
            ("OG2", PhaseStatus::Running),
            ("OG1", PhaseStatus::Success),
            ("OG2", PhaseStatus::Failed),
        ] {
            log.append(&PhaseEvent::now(run.id, Some(unit.into()), 1, status))
                .unwrap();
        }
        (log, run)
    }

    #[test]
    fn test_queries_are_projections() {
        let (log, run) = populated();
        let query = StatusQuery::new(&log);
        assert_eq!(query.run("q").unwrap(), Some(run.clone()));
        assert_eq!(query.run("nope").unwrap(), None);
        assert_eq!(query.runs().unwrap().len(), 1);
        assert_eq!(query.units(&run).unwrap().len(), 2);

        let events = query.events(&run).unwrap();
        assert_eq!(events.len(), 4);
        assert!(events.windows(2).all(|w| w[0].seq > w[1].seq));

        let failed = query
            .events_with_status(&run, PhaseStatus::Failed)
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].event.unit, Some("OG2".into()));

        assert_eq!(query.unit_events(&run, &"OG1".into()).unwrap().len(), 2);
        assert!(query.in_flight(&run).unwrap().is_empty());

        assert_eq!(
            query.phase_summary(&run).unwrap(),
            vec![(1, PhaseStatus::Failed, 1), (1, PhaseStatus::Success, 1)]
        );
        // nothing was written by the queries above
        assert_eq!(log.events_for(run.id, None, None).unwrap().len(), 4);
    }
}
