//! Staging of validated inputs into the run directory.

use crate::config::PipelineConfig;
use crate::layout::RunLayout;
use anyhow::{Context, Result};
use fasta_pair::fix::{collect_faulty, fix_unit, FixReport};
use fasta_pair::Validation;
use log::{info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Put `src` at `dst`, as a copy or as a symlink to its absolute path.
fn place(src: &Path, dst: &Path, copy: bool) -> Result<()> {
    if dst.symlink_metadata().is_ok() {
        fs::remove_file(dst).with_context(|| format!("replacing {}", dst.display()))?;
    }
    if copy {
        fs::copy(src, dst)
            .with_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
        return Ok(());
    }
    let src = src
        .canonicalize()
        .with_context(|| format!("resolving {}", src.display()))?;
    link(&src, dst).with_context(|| format!("linking {} to {}", dst.display(), src.display()))
}

#[cfg(unix)]
fn link(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(not(unix))]
fn link(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

/// Stage every unit's input pair, write the faulty record pairs to the side
/// collection and, when configured, try to rescue their coding sequences.
pub fn stage_inputs(
    validation: &Validation,
    layout: &RunLayout,
    config: &PipelineConfig,
) -> Result<FixReport> {
    for files in &validation.files {
        let paths = layout.unit(&files.unit);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("creating {}", paths.dir.display()))?;
        place(&files.nuc, &paths.nuc(), config.copy_inputs)?;
        place(&files.pep, &paths.pep(), config.copy_inputs)?;
    }
    info!(
        "staged {} units in {}",
        validation.files.len(),
        layout.root().display()
    );

    let mut report = FixReport::default();
    if validation.faulty.is_empty() {
        return Ok(report);
    }
    let faulty_dir = layout.faulty_dir();
    let written = collect_faulty(validation, &faulty_dir)?;
    warn!(
        "{} faulty record pairs, {written} files written to {}",
        validation.faulty.len(),
        faulty_dir.display()
    );
    if !config.fix_faulty {
        return Ok(report);
    }

    for files in &validation.files {
        let records: HashSet<&str> = validation
            .faulty_records(&files.unit)
            .map(|m| m.record.as_str())
            .collect();
        if records.is_empty() {
            continue;
        }
        let staged = layout.unit(&files.unit).nuc();
        // never write through a symlink into the input directory
        fs::remove_file(&staged).with_context(|| format!("replacing {}", staged.display()))?;
        report.extend(fix_unit(&files.nuc, &files.pep, &records, &staged)?);
    }
    info!("rescued {} faulty records", report.rescued.len());
    if !report.unrescued.is_empty() {
        warn!("could not rescue: {}", report.unrescued.join(", "));
    }
    Ok(report)
}
