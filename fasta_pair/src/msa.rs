//! Alignment helpers: nucleotide re-ordering for the codon mapper, FASTA to
//! PHYLIP conversion, the PAML sequential alignment format, and mapping of
//! ungapped alignment positions back to gapped and per-sequence coordinates.

use crate::error::{FastaIoError, MsaError};
use crate::{read_records, write_records};
use bio::io::fasta::Record;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

const PHYLIP_NAME_WIDTH: usize = 30;

/// Write the records of `nuc_fa` to `out` in the order of the peptide
/// alignment `pep_msa`.
pub fn reorder_to_msa(nuc_fa: &Path, pep_msa: &Path, out: &Path) -> Result<usize, MsaError> {
    let mut nuc: HashMap<String, Record> = read_records(nuc_fa)?
        .into_iter()
        .map(|r| (r.id().to_string(), r))
        .collect();
    let ordered = read_records(pep_msa)?
        .iter()
        .map(|p| {
            nuc.remove(p.id()).ok_or_else(|| MsaError::MissingRecord {
                record: p.id().to_string(),
                msa: pep_msa.to_path_buf(),
                source_fa: nuc_fa.to_path_buf(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    write_records(out, &ordered)?;
    Ok(ordered.len())
}

/// Convert an aligned FASTA file to relaxed PHYLIP. Returns the number of
/// sequences and the alignment length.
pub fn mfa2phy(mfa: &Path, phy: &Path) -> Result<(usize, usize), MsaError> {
    let records = read_records(mfa)?;
    let Some(first) = records.first() else {
        return Err(MsaError::Empty {
            path: mfa.to_path_buf(),
        });
    };
    let expected = first.seq().len();
    if let Some(ragged) = records.iter().find(|r| r.seq().len() != expected) {
        return Err(MsaError::RaggedAlignment {
            path: mfa.to_path_buf(),
            record: ragged.id().to_string(),
            len: ragged.seq().len(),
            expected,
        });
    }

    let mut text = format!("{}    {}\n", records.len(), expected);
    for record in &records {
        let pad = PHYLIP_NAME_WIDTH.saturating_sub(record.id().len()).max(1);
        let _ = writeln!(
            text,
            "{}{}{}",
            record.id(),
            " ".repeat(pad),
            String::from_utf8_lossy(record.seq())
        );
    }
    std::fs::write(phy, text).map_err(FastaIoError::at(phy))?;
    Ok((records.len(), expected))
}

/// One sequence position mapped back from an ungapped alignment column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedPosition {
    pub record: String,
    pub ungapped: usize,
    pub gapped: usize,
    /// Position in the record's own unaligned sequence.
    pub original: usize,
}

/// A PAML sequential alignment as written by the codon mapper: a header line
/// `<count> <length>`, then each name on its own line followed by its
/// sequence, possibly wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PamlAlignment {
    pub sequences: Vec<(String, Vec<u8>)>,
    pub length: usize,
}

fn parse_header(line: &str) -> Option<(usize, usize)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let count = fields.first()?.parse().ok()?;
    let length = fields.get(1)?.parse().ok()?;
    Some((count, length))
}

/// Alignment length from the header line of a PAML alignment file.
pub fn paml_alignment_length(path: &Path) -> Result<usize, MsaError> {
    let text = std::fs::read_to_string(path).map_err(FastaIoError::at(path))?;
    text.lines()
        .find(|l| !l.trim().is_empty())
        .and_then(parse_header)
        .map(|(_, length)| length)
        .ok_or_else(|| MsaError::BadPaml {
            path: path.to_path_buf(),
            reason: "missing '<count> <length>' header".to_string(),
        })
}

impl PamlAlignment {
    pub fn read(path: &Path) -> Result<Self, MsaError> {
        let text = std::fs::read_to_string(path).map_err(FastaIoError::at(path))?;
        Self::parse(&text).map_err(|reason| MsaError::BadPaml {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let header = lines.next().ok_or("empty file")?;
        let (count, length) =
            parse_header(header).ok_or_else(|| format!("bad header '{header}'"))?;

        let mut sequences: Vec<(String, Vec<u8>)> = Vec::with_capacity(count);
        let mut current: Option<(String, Vec<u8>)> = None;
        for line in lines {
            match current.as_mut() {
                Some((_, seq)) if seq.len() < length => {
                    seq.extend(line.bytes().filter(|b| !b.is_ascii_whitespace()));
                }
                _ => {
                    sequences.extend(current.take());
                    current = Some((line.to_string(), Vec::with_capacity(length)));
                }
            }
        }
        sequences.extend(current);

        if sequences.len() != count {
            return Err(format!(
                "header declares {count} sequences, found {}",
                sequences.len()
            ));
        }
        if let Some((name, seq)) = sequences.iter().find(|(_, s)| s.len() != length) {
            return Err(format!(
                "sequence {name} has length {}, header declares {length}",
                seq.len()
            ));
        }
        Ok(PamlAlignment { sequences, length })
    }

    /// Columns with a gap in at least one sequence.
    pub fn gap_columns(&self) -> Vec<usize> {
        (0..self.length)
            .filter(|&col| self.sequences.iter().any(|(_, s)| s[col] == b'-'))
            .collect()
    }

    /// Column of the gapped alignment that became column `ungapped` once
    /// every gap column was dropped.
    pub fn ungapped_to_gapped(&self, ungapped: usize) -> Option<usize> {
        let gaps = self.gap_columns();
        (0..self.length)
            .filter(|col| gaps.binary_search(col).is_err())
            .nth(ungapped)
    }

    /// Map an ungapped column back to the alignment column and to the
    /// position inside each unaligned sequence.
    pub fn map_back(&self, ungapped: usize) -> Option<Vec<MappedPosition>> {
        let gapped = self.ungapped_to_gapped(ungapped)?;
        Some(
            self.sequences
                .iter()
                .map(|(name, seq)| MappedPosition {
                    record: name.clone(),
                    ungapped,
                    gapped,
                    original: seq[..gapped].iter().filter(|&&b| b != b'-').count(),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const PAML: &str = "   3   12\n\
        human\nATG---AAA\nTTT\n\
        mouse\nATGCCCAAATTT\n\
        \n\
        rat\nATGCCC---TTT\n";

    #[test]
    fn test_parse_paml() {
        let aln = PamlAlignment::parse(PAML).unwrap();
        assert_eq!(aln.length, 12);
        assert_eq!(aln.sequences[0], ("human".to_string(), b"ATG---AAATTT".to_vec()));
        assert_eq!(aln.sequences[2].0, "rat");
        assert!(PamlAlignment::parse("2 3\na\nAAA\n").is_err());
        assert!(PamlAlignment::parse("2 3\na\nAAA\nb\nAA\n").is_err());
    }

    #[test]
    fn test_map_back() {
        let aln = PamlAlignment::parse(PAML).unwrap();
        assert_eq!(aln.gap_columns(), vec![3, 4, 5, 6, 7, 8]);
        assert_eq!(aln.ungapped_to_gapped(2), Some(2));
        assert_eq!(aln.ungapped_to_gapped(3), Some(9));
        assert_eq!(aln.ungapped_to_gapped(6), None);

        let mapped = aln.map_back(4).unwrap();
        let originals: Vec<_> = mapped.iter().map(|m| (m.record.as_str(), m.original)).collect();
        assert_eq!(originals, vec![("human", 7), ("mouse", 10), ("rat", 7)]);
        assert!(mapped.iter().all(|m| m.gapped == 10 && m.ungapped == 4));
    }

    #[test]
    fn test_mfa2phy_and_reorder() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let pep = dir.path().join("OG1.pep.msa");
        let nuc = dir.path().join("OG1.fa");
        fs::write(&pep, ">b\nM-K\n>a\nMRK\n")?;
        fs::write(&nuc, ">a\nATGCGTAAA\n>b\nATGAAA\n")?;

        let ordered = dir.path().join("OG1.nuc");
        assert_eq!(reorder_to_msa(&nuc, &pep, &ordered)?, 2);
        let ids: Vec<_> = read_records(&ordered)?
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);

        let phy = dir.path().join("OG1.phy");
        assert_eq!(mfa2phy(&pep, &phy)?, (2, 3));
        let expected = format!("2    3\nb{}M-K\na{}MRK\n", " ".repeat(29), " ".repeat(29));
        assert_eq!(fs::read_to_string(&phy)?, expected);

        fs::write(&pep, ">b\nM-K\n>a\nMR\n")?;
        assert!(matches!(
            mfa2phy(&pep, &phy),
            Err(MsaError::RaggedAlignment { len: 2, expected: 3, .. })
        ));
        fs::write(&pep, ">c\nMK\n")?;
        assert!(matches!(
            reorder_to_msa(&nuc, &pep, &ordered),
            Err(MsaError::MissingRecord { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_alignment_length_from_header() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("OG1.paml");
        fs::write(&path, PAML)?;
        assert_eq!(paml_alignment_length(&path)?, 12);
        fs::write(&path, "not an alignment\n")?;
        assert!(paml_alignment_length(&path).is_err());
        Ok(())
    }
}
