use crate::{EventLog, Registration, StorageError};
use pp_types::{LoggedEvent, PhaseEvent, Run, RunId, Unit, UnitId};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    runs: Vec<Run>,
    units: Vec<Unit>,
    events: Vec<LoggedEvent>,
}

impl Tables {
    fn has_run(&self, run_id: RunId) -> bool {
        self.runs.iter().any(|r| r.id == run_id)
    }
}

/// Event log kept in process memory. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryEventLog {
    tables: Mutex<Tables>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl EventLog for MemoryEventLog {
    fn register_run(&self, name: &str) -> Result<Registration, StorageError> {
        let mut tables = self.lock()?;
        if let Some(run) = tables.runs.iter().find(|r| r.name == name) {
            return Ok(Registration::Existing(run.clone()));
        }
        let run = Run {
            id: RunId(tables.runs.len() as i64 + 1),
            name: name.to_string(),
        };
        tables.runs.push(run.clone());
        Ok(Registration::Created(run))
    }

    fn find_run(&self, name: &str) -> Result<Option<Run>, StorageError> {
        Ok(self.lock()?.runs.iter().find(|r| r.name == name).cloned())
    }

    fn runs(&self) -> Result<Vec<Run>, StorageError> {
        Ok(self.lock()?.runs.clone())
    }

    fn register_units(&self, run_id: RunId, units: &[Unit]) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        if !tables.has_run(run_id) {
            return Err(StorageError::RunNotFound(run_id));
        }
        for unit in units {
            let known = tables
                .units
                .iter()
                .any(|u| u.run_id == run_id && u.id == unit.id);
            if !known {
                tables.units.push(Unit {
                    run_id,
                    ..unit.clone()
                });
            }
        }
        Ok(())
    }

    fn units(&self, run_id: RunId) -> Result<Vec<Unit>, StorageError> {
        Ok(self
            .lock()?
            .units
            .iter()
            .filter(|u| u.run_id == run_id)
            .cloned()
            .collect())
    }

    fn append(&self, event: &PhaseEvent) -> Result<i64, StorageError> {
        let mut tables = self.lock()?;
        if !tables.has_run(event.run_id) {
            return Err(StorageError::RunNotFound(event.run_id));
        }
        let seq = tables.events.len() as i64 + 1;
        tables.events.push(LoggedEvent {
            seq,
            event: event.clone(),
        });
        Ok(seq)
    }

    fn events_for(
        &self,
        run_id: RunId,
        unit: Option<&UnitId>,
        phase: Option<u32>,
    ) -> Result<Vec<LoggedEvent>, StorageError> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|e| e.event.run_id == run_id)
            .filter(|e| unit.map_or(true, |u| e.event.unit.as_ref() == Some(u)))
            .filter(|e| phase.map_or(true, |p| e.event.phase == p))
            .cloned()
            .collect())
    }
}
