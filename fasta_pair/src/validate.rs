//! Pairing of the nucleotide and peptide inputs.
//!
//! Name mismatches are fatal ([`PairingError`]); length mismatches only move
//! the record pair into the faulty set.

use crate::error::{FastaIoError, PairingError};
use crate::{base_name, read_records, NUC_DIR, PEP_DIR};
use itertools::Itertools;
use log::{info, warn};
use pp_types::{RunId, Unit, UnitId};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// The input files of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFiles {
    pub unit: UnitId,
    pub nuc: PathBuf,
    pub pep: PathBuf,
}

/// A record whose nucleotide length is not three times its peptide length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthMismatch {
    pub unit: UnitId,
    pub record: String,
    pub nuc_len: usize,
    pub pep_len: usize,
}

impl fmt::Display for LengthMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}: {} nucleotides for {} residues",
            self.unit, self.record, self.nuc_len, self.pep_len
        )
    }
}

#[derive(Debug, Default)]
pub struct Validation {
    /// Record names of every unit, sorted.
    pub units: BTreeMap<UnitId, Vec<String>>,
    pub files: Vec<UnitFiles>,
    pub faulty: Vec<LengthMismatch>,
}

impl Validation {
    pub fn to_units(&self, run_id: RunId) -> Vec<Unit> {
        self.units
            .iter()
            .map(|(id, names)| Unit {
                run_id,
                id: id.clone(),
                record_names: names.clone(),
            })
            .collect()
    }

    pub fn faulty_records(&self, unit: &UnitId) -> impl Iterator<Item = &LengthMismatch> + '_ {
        let unit = unit.clone();
        self.faulty.iter().filter(move |m| m.unit == unit)
    }

    /// Units with at least one faulty record.
    pub fn faulty_units(&self) -> Vec<&UnitId> {
        self.faulty.iter().map(|m| &m.unit).dedup().collect()
    }
}

/// Whether `nuc_len` codes for `pep_len` residues, with or without a stop
/// codon on either side.
pub fn length_consistent(nuc_len: usize, pep_len: usize) -> bool {
    let codons = 3 * pep_len;
    nuc_len == codons || nuc_len + 3 == codons || nuc_len == codons + 3
}

/// Validate an input directory holding `nuc/` and `pep/` subdirectories.
///
/// Every file is a unit; its base name (file name minus the last extension)
/// is the unit id and must exist in both directories.
pub fn validate_input_dir(input_dir: &Path) -> Result<Validation, PairingError> {
    let nuc_files = list_fasta_dir(input_dir, NUC_DIR)?;
    let pep_files = list_fasta_dir(input_dir, PEP_DIR)?;

    let only_nuc = nuc_files
        .keys()
        .filter(|k| !pep_files.contains_key(*k))
        .cloned()
        .collect::<Vec<_>>();
    let only_pep = pep_files
        .keys()
        .filter(|k| !nuc_files.contains_key(*k))
        .cloned()
        .collect::<Vec<_>>();
    if !only_nuc.is_empty() || !only_pep.is_empty() {
        return Err(PairingError::UnmatchedFiles { only_nuc, only_pep });
    }

    let mut validation = Validation::default();
    for (base, nuc) in nuc_files {
        let unit = UnitId::new(base.as_str());
        let pep = pep_files[&base].clone();
        let (names, faulty) = validate_pair(&unit, &nuc, &pep)?;
        validation.units.insert(unit.clone(), names);
        validation.faulty.extend(faulty);
        validation.files.push(UnitFiles { unit, nuc, pep });
    }
    info!(
        "validated {} units, {} faulty records",
        validation.units.len(),
        validation.faulty.len()
    );
    Ok(validation)
}

/// Validate one nucleotide/peptide file pair and return its sorted record
/// names together with the records failing the length rule.
pub fn validate_pair(
    unit: &UnitId,
    nuc: &Path,
    pep: &Path,
) -> Result<(Vec<String>, Vec<LengthMismatch>), PairingError> {
    let mut nuc_records = read_records(nuc)?;
    let mut pep_records = read_records(pep)?;
    nuc_records.sort_by(|a, b| a.id().cmp(b.id()));
    pep_records.sort_by(|a, b| a.id().cmp(b.id()));

    let nuc_names = nuc_records.iter().map(|r| r.id().to_string()).collect_vec();
    let pep_names = pep_records.iter().map(|r| r.id().to_string()).collect_vec();
    if nuc_names != pep_names {
        return Err(PairingError::RecordNames {
            unit: unit.clone(),
            nuc: nuc_names,
            pep: pep_names,
        });
    }

    let faulty = nuc_records
        .iter()
        .zip(&pep_records)
        .filter(|(n, p)| !length_consistent(n.seq().len(), p.seq().len()))
        .map(|(n, p)| LengthMismatch {
            unit: unit.clone(),
            record: n.id().to_string(),
            nuc_len: n.seq().len(),
            pep_len: p.seq().len(),
        })
        .collect_vec();
    for mismatch in &faulty {
        warn!("faulty pair {mismatch}");
    }
    Ok((nuc_names, faulty))
}

fn list_fasta_dir(
    input_dir: &Path,
    sub: &'static str,
) -> Result<BTreeMap<String, PathBuf>, PairingError> {
    let dir = input_dir.join(sub);
    if !dir.is_dir() {
        return Err(PairingError::MissingDir {
            dir: input_dir.to_path_buf(),
            sub,
        });
    }
    let mut files = BTreeMap::new();
    for entry in std::fs::read_dir(&dir).map_err(FastaIoError::at(&dir))? {
        let path = entry.map_err(FastaIoError::at(&dir))?.path();
        let hidden = path
            .file_name()
            .map_or(true, |n| n.to_string_lossy().starts_with('.'));
        if hidden || !path.is_file() {
            continue;
        }
        let Some(base) = base_name(&path) else {
            continue;
        };
        if files.insert(base.clone(), path).is_some() {
            return Err(PairingError::DuplicateBaseName { dir, base });
        }
    }
    Ok(files)
}
