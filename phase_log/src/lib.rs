//! phase_log
//!
//! Append-only record of phase events per run and unit, and the pure
//! projections that reconstruct the current pipeline state from it.
//!
//! There is deliberately no way to update or delete an event: a correction
//! is a new event. Everything the orchestrator or an operator needs to know
//! about a run (latest status, in-flight work, where to resume) is derived
//! from the history.

mod error;
mod memory;
pub mod query;
mod sqlite;
pub mod state;

pub use error::StorageError;
pub use memory::MemoryEventLog;
pub use sqlite::SqliteEventLog;

use pp_types::{LoggedEvent, PhaseEvent, Run, RunId, Unit, UnitId};

/// Outcome of registering a run name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The name was new and a run was created for it.
    Created(Run),
    /// A run with this name already existed; nothing was written.
    Existing(Run),
}

impl Registration {
    pub fn run(&self) -> &Run {
        match self {
            Registration::Created(run) | Registration::Existing(run) => run,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Registration::Created(_))
    }
}

/// Persistent, append-only store of runs, units and phase events.
///
/// Implementations must accept concurrent appends from several workers;
/// events are ordered by insertion.
pub trait EventLog: Send + Sync {
    /// Create the run `name` unless it already exists.
    fn register_run(&self, name: &str) -> Result<Registration, StorageError>;

    fn find_run(&self, name: &str) -> Result<Option<Run>, StorageError>;

    /// All runs, in creation order.
    fn runs(&self) -> Result<Vec<Run>, StorageError>;

    /// Register units for an existing run. Units already registered under the
    /// same id are left untouched.
    fn register_units(&self, run_id: RunId, units: &[Unit]) -> Result<(), StorageError>;

    /// Units of a run, in registration order.
    fn units(&self, run_id: RunId) -> Result<Vec<Unit>, StorageError>;

    /// Append one event and return its sequence number. Fails with
    /// [`StorageError::RunNotFound`] if the event's run does not exist.
    fn append(&self, event: &PhaseEvent) -> Result<i64, StorageError>;

    /// Events of `run_id`, optionally restricted to one unit and/or phase, in
    /// insertion order.
    fn events_for(
        &self,
        run_id: RunId,
        unit: Option<&UnitId>,
        phase: Option<u32>,
    ) -> Result<Vec<LoggedEvent>, StorageError>;
}
