//! pp_types
//!
//! Vocabulary shared by every crate of the workspace: runs, units
//! (orthogroups), pipeline phases and the immutable phase events that the
//! event log records.

mod event;
mod phase;
mod run;

pub use event::{LoggedEvent, PhaseEvent, PhaseStatus};
pub use phase::Phase;
pub use run::{Run, RunId, Unit, UnitId};

/// Separator used when a unit's record names are flattened into one string.
pub const RECORD_NAME_SEPARATOR: char = ',';
