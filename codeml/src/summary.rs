//! Batch likelihood-ratio summary over every result file under a directory.

use crate::lrt::evaluate_files;
use crate::{LrtError, SummaryError};
use log::warn;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Nested model pairs compared in a batch, as (H0 suffix, H1 suffix).
pub const NESTED_PAIRS: [(&str, &str); 6] = [
    (".M1a_e1", ".M2a_e1"),
    (".M7_e1", ".M8_e1"),
    (".M8a", ".M8_e1"),
    (".Ah0", ".Ah1"),
    (".BM_f1", ".BM_e1"),
    (".M0_f10", ".M0_e10"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub unit: String,
    pub h0: String,
    pub h1: String,
    pub statistic: f64,
    pub df: u32,
    pub p_value: f64,
    pub stars: String,
    #[serde(rename = "lnL_h0")]
    pub lnl_h0: f64,
    #[serde(rename = "lnL_h1")]
    pub lnl_h1: f64,
    pub np_h0: u32,
    pub np_h1: u32,
}

#[derive(Debug, Default)]
pub struct Summary {
    pub rows: Vec<SummaryRow>,
    /// Pairs that could not be evaluated.
    pub failures: Vec<(PathBuf, PathBuf, LrtError)>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Find every H0 result below `dir` that has its H1 counterpart next to it
/// and test the pair. The unit of a pair is the name of the directory
/// holding it. A pair that fails to evaluate is recorded and skipped.
pub fn summarize_dir(dir: &Path) -> Result<Summary, SummaryError> {
    let mut summary = Summary::default();
    let root = glob::Pattern::escape(&dir.to_string_lossy());
    for (h0_suffix, h1_suffix) in NESTED_PAIRS {
        for entry in glob::glob(&format!("{root}/**/*{h0_suffix}"))? {
            let h0 = entry?;
            let h0_name = file_name(&h0);
            let base = &h0_name[..h0_name.len() - h0_suffix.len()];
            let h1 = h0.with_file_name(format!("{base}{h1_suffix}"));
            if !h1.is_file() {
                continue;
            }
            match evaluate_files(&h0, &h1) {
                Ok((fit0, fit1, lrt)) => summary.rows.push(SummaryRow {
                    unit: h0.parent().map(file_name).unwrap_or_default(),
                    h0: h0_name.clone(),
                    h1: file_name(&h1),
                    statistic: lrt.statistic,
                    df: lrt.df,
                    p_value: lrt.p_value,
                    stars: lrt.significance.to_string(),
                    lnl_h0: fit0.lnl,
                    lnl_h1: fit1.lnl,
                    np_h0: fit0.np,
                    np_h1: fit1.np,
                }),
                Err(err) => {
                    warn!("skipping {} vs {}: {err}", h0.display(), h1.display());
                    summary.failures.push((h0, h1, err));
                }
            }
        }
    }
    summary
        .rows
        .sort_by(|a, b| (&a.unit, &a.h0, &a.h1).cmp(&(&b.unit, &b.h0, &b.h1)));
    Ok(summary)
}

/// Write the rows as CSV with a header line.
pub fn write_csv<W: Write>(rows: &[SummaryRow], out: W) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
