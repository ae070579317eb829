use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The fixed, totally ordered pipeline phases.
///
/// Phase 0 validates the input and registers the units of a run; every
/// later phase consumes the artifacts of the phase before it, one unit at a
/// time.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    Hash,
    PartialEq,
    Ord,
    PartialOrd,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Validate,
    Align,
    CodonAlign,
    Tree,
    Label,
    Fit,
}

impl Phase {
    /// The last phase of the pipeline.
    pub const LAST: Phase = Phase::Fit;

    pub const ALL: [Phase; 6] = [
        Phase::Validate,
        Phase::Align,
        Phase::CodonAlign,
        Phase::Tree,
        Phase::Label,
        Phase::Fit,
    ];

    pub fn number(self) -> u32 {
        match self {
            Phase::Validate => 0,
            Phase::Align => 1,
            Phase::CodonAlign => 2,
            Phase::Tree => 3,
            Phase::Label => 4,
            Phase::Fit => 5,
        }
    }

    pub fn from_number(number: u32) -> Option<Phase> {
        Phase::ALL.get(number as usize).copied()
    }

    pub fn next(self) -> Option<Phase> {
        Phase::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Phase> {
        self.number().checked_sub(1).and_then(Phase::from_number)
    }

    /// Phases from `self` through the last one, in order.
    pub fn from_here(self) -> impl Iterator<Item = Phase> {
        Phase::ALL.into_iter().skip(self.number() as usize)
    }
}
