use crate::RECORD_NAME_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};

/// Database-generated identifier of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub i64);

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A named execution context. Created once, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub name: String,
}

/// Identifier of an orthogroup, unique within its run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        UnitId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        UnitId(id.to_string())
    }
}

impl From<String> for UnitId {
    fn from(id: String) -> Self {
        UnitId(id)
    }
}

impl Borrow<str> for UnitId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for UnitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One orthogroup registered for a run, with the ordered names of the
/// sequence records it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub run_id: RunId,
    pub id: UnitId,
    pub record_names: Vec<String>,
}

impl Unit {
    /// Record names flattened into the form persisted as unit metadata.
    pub fn metadata(&self) -> String {
        self.record_names.join(&RECORD_NAME_SEPARATOR.to_string())
    }

    /// Inverse of [`Unit::metadata`].
    pub fn from_metadata(run_id: RunId, id: UnitId, metadata: &str) -> Self {
        let record_names = if metadata.is_empty() {
            Vec::new()
        } else {
            metadata
                .split(RECORD_NAME_SEPARATOR)
                .map(str::to_string)
                .collect()
        };
        Unit {
            run_id,
            id,
            record_names,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_metadata_roundtrip() {
        let unit = Unit {
            run_id: RunId(3),
            id: UnitId::from("OG0001"),
            record_names: vec!["At1g01010".into(), "GRMZM2G069542_T01".into()],
        };
        assert_eq!(unit.metadata(), "At1g01010,GRMZM2G069542_T01");
        let back = Unit::from_metadata(RunId(3), unit.id.clone(), &unit.metadata());
        assert_eq!(back, unit);
        assert!(Unit::from_metadata(RunId(3), "x".into(), "")
            .record_names
            .is_empty());
    }
}
