//! Faulty-pair side collection and CDS rescue.
//!
//! A nucleotide record that is not a clean coding sequence (for example a
//! full transcript with UTRs) is replaced by the longest ATG-initiated ORF
//! whose translation is exactly the provided peptide.

use crate::error::FastaIoError;
use crate::validate::Validation;
use crate::{read_records, write_records, NUC_DIR, PEP_DIR};
use bio::io::fasta::Record;
use log::{info, warn};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;

/// Translate one codon with the standard genetic code. Unknown or ambiguous
/// codons translate to `X`.
pub fn codon_to_aa(codon: &[u8]) -> u8 {
    match codon {
        b"GGT" | b"GGC" | b"GGA" | b"GGG" => b'G',
        b"TGG" => b'W',
        b"TGT" | b"TGC" => b'C',
        b"TTT" | b"TTC" => b'F',
        b"TTA" | b"TTG" | b"CTT" | b"CTC" | b"CTA" | b"CTG" => b'L',
        b"ATT" | b"ATC" | b"ATA" => b'I',
        b"GTT" | b"GTC" | b"GTA" | b"GTG" => b'V',
        b"TCT" | b"TCC" | b"TCA" | b"TCG" | b"AGT" | b"AGC" => b'S',
        b"CCT" | b"CCC" | b"CCA" | b"CCG" => b'P',
        b"ACT" | b"ACC" | b"ACA" | b"ACG" => b'T',
        b"GCT" | b"GCC" | b"GCA" | b"GCG" => b'A',
        b"TAT" | b"TAC" => b'Y',
        b"CAT" | b"CAC" => b'H',
        b"CAA" | b"CAG" => b'Q',
        b"AAT" | b"AAC" => b'N',
        b"AAA" | b"AAG" => b'K',
        b"GAT" | b"GAC" => b'D',
        b"GAA" | b"GAG" => b'E',
        b"CGT" | b"CGC" | b"CGA" | b"CGG" | b"AGA" | b"AGG" => b'R',
        b"ATG" => b'M',
        b"TAG" | b"TAA" | b"TGA" => b'*',
        _ => b'X',
    }
}

/// Translate whole codons; a trailing partial codon is ignored.
pub fn translate(seq: &[u8]) -> Vec<u8> {
    seq.chunks_exact(3).map(codon_to_aa).collect()
}

fn is_stop(codon: &[u8]) -> bool {
    matches!(codon, b"TAA" | b"TGA" | b"TAG")
}

/// Every ORF starting at an `ATG`, in start order. An ORF runs through its
/// stop codon, or up to the last complete codon if there is none.
pub fn find_orfs(seq: &[u8]) -> Vec<&[u8]> {
    let mut orfs = Vec::new();
    for start in (0..seq.len().saturating_sub(2)).filter(|&i| &seq[i..i + 3] == b"ATG") {
        let mut end = start;
        while end + 3 <= seq.len() {
            end += 3;
            if is_stop(&seq[end - 3..end]) {
                break;
            }
        }
        orfs.push(&seq[start..end]);
    }
    orfs
}

/// The longest ORF of `nuc` translating to `pep`, with or without its stop
/// codon. Comparison is case-insensitive.
pub fn rescue_cds(nuc: &[u8], pep: &[u8]) -> Option<Vec<u8>> {
    let nuc = nuc.to_ascii_uppercase();
    let pep = pep.to_ascii_uppercase();
    let mut orfs = find_orfs(&nuc);
    // stable, so equally long ORFs keep their start order
    orfs.sort_by_key(|orf| std::cmp::Reverse(orf.len()));
    orfs.into_iter().find_map(|orf| {
        if translate(orf) == pep {
            Some(orf.to_vec())
        } else if orf.len() >= 3 && translate(&orf[..orf.len() - 3]) == pep {
            Some(orf[..orf.len() - 3].to_vec())
        } else {
            None
        }
    })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FixReport {
    pub rescued: Vec<String>,
    pub unrescued: Vec<String>,
}

impl FixReport {
    pub fn extend(&mut self, other: FixReport) {
        self.rescued.extend(other.rescued);
        self.unrescued.extend(other.unrescued);
    }
}

/// Rescue the `records` of one unit and write the whole nucleotide file to
/// `out`, which may be `nuc` itself. Records that cannot be rescued are
/// written unchanged.
pub fn fix_unit(
    nuc: &Path,
    pep: &Path,
    records: &HashSet<&str>,
    out: &Path,
) -> Result<FixReport, FastaIoError> {
    let nuc_records = read_records(nuc)?;
    let pep_records = read_records(pep)?;
    let mut report = FixReport::default();
    let fixed: Vec<Record> = nuc_records
        .into_iter()
        .map(|record| {
            if !records.contains(record.id()) {
                return record;
            }
            let cds = pep_records
                .iter()
                .find(|p| p.id() == record.id())
                .and_then(|p| rescue_cds(record.seq(), p.seq()));
            match cds {
                Some(cds) => {
                    report.rescued.push(record.id().to_string());
                    Record::with_attrs(record.id(), record.desc(), &cds)
                }
                None => {
                    warn!("no CDS matching the peptide of {}", record.id());
                    report.unrescued.push(record.id().to_string());
                    record
                }
            }
        })
        .collect();
    write_records(out, &fixed)?;
    Ok(report)
}

/// Copy the faulty record pairs of every unit into `faulty_dir/{nuc,pep}/`,
/// keeping the input file names. Returns the number of files written.
pub fn collect_faulty(validation: &Validation, faulty_dir: &Path) -> Result<usize, FastaIoError> {
    let mut written = 0;
    for files in &validation.files {
        let names: HashSet<&str> = validation
            .faulty_records(&files.unit)
            .map(|m| m.record.as_str())
            .collect();
        if names.is_empty() {
            continue;
        }
        for (sub, path) in [(NUC_DIR, &files.nuc), (PEP_DIR, &files.pep)] {
            let dir = faulty_dir.join(sub);
            std::fs::create_dir_all(&dir).map_err(FastaIoError::at(&dir))?;
            let records: Vec<Record> = read_records(path)?
                .into_iter()
                .filter(|r| names.contains(r.id()))
                .collect();
            let file_name = path
                .file_name()
                .unwrap_or_else(|| OsStr::new(files.unit.as_str()));
            write_records(&dir.join(file_name), &records)?;
            written += 1;
        }
    }
    if written > 0 {
        info!("wrote faulty pairs to {}", faulty_dir.display());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate_input_dir;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_translate() {
        assert_eq!(translate(b"ATGGCCTAA"), b"MA*".to_vec());
        assert_eq!(translate(b"ATGNNNGC"), b"MX".to_vec());
    }

    #[test]
    fn test_find_orfs() {
        // ATG at 2 and 5, stop TAA at 11
        let seq = b"CCATGATGGCCTAAGG";
        let orfs = find_orfs(seq);
        assert_eq!(orfs, vec![&b"ATGATGGCCTAA"[..], &b"ATGGCCTAA"[..]]);
        // no stop: runs to the last complete codon
        assert_eq!(find_orfs(b"ATGGCCG"), vec![&b"ATGGCC"[..]]);
    }

    #[test]
    fn test_rescue_cds() {
        let transcript = b"ggcATGAAATTTTGAccc";
        assert_eq!(rescue_cds(transcript, b"MKF"), Some(b"ATGAAATTT".to_vec()));
        assert_eq!(rescue_cds(transcript, b"MKF*"), Some(b"ATGAAATTTTGA".to_vec()));
        assert_eq!(rescue_cds(transcript, b"MKW"), None);
    }

    #[test]
    fn test_collect_and_fix() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("nuc"))?;
        fs::create_dir(dir.path().join("pep"))?;
        fs::write(
            dir.path().join("nuc/OG1.fa"),
            ">ok\nATGAAA\n>utr\nGGGATGAAATTTTAGCC\n>junk\nCCCCCCCCCC\n",
        )?;
        fs::write(
            dir.path().join("pep/OG1.fa"),
            ">ok\nMK\n>utr\nMKF\n>junk\nMKF\n",
        )?;
        let validation = validate_input_dir(dir.path())?;
        assert_eq!(validation.faulty.len(), 2);

        let faulty_dir = dir.path().join("faulty");
        assert_eq!(collect_faulty(&validation, &faulty_dir)?, 2);
        let side = read_records(&faulty_dir.join("nuc/OG1.fa"))?;
        assert_eq!(
            side.iter().map(|r| r.id()).collect::<Vec<_>>(),
            vec!["utr", "junk"]
        );

        let names: HashSet<&str> = validation.faulty.iter().map(|m| m.record.as_str()).collect();
        let out = dir.path().join("fixed.fa");
        let files = &validation.files[0];
        let report = fix_unit(&files.nuc, &files.pep, &names, &out)?;
        assert_eq!(report.rescued, vec!["utr".to_string()]);
        assert_eq!(report.unrescued, vec!["junk".to_string()]);
        let fixed = read_records(&out)?;
        assert_eq!(fixed[1].seq(), b"ATGAAATTT");
        assert_eq!(fixed[0].seq(), b"ATGAAA");
        Ok(())
    }
}
