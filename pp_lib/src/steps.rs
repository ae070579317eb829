//! The per-unit work of phases 1 to 5.

use crate::adapter::{invoke_checked, AdapterSet, Invocation};
use crate::config::PipelineConfig;
use crate::layout::UnitPaths;
use anyhow::{bail, ensure, Context, Result};
use codeml::{controls_for_trees, write_control_files};
use fasta_pair::msa::{mfa2phy, paml_alignment_length, reorder_to_msa};
use log::{debug, info, warn};
use pp_types::Phase;
use std::fs;
use std::path::{Path, PathBuf};
use tree_label::{compile_pattern, label_by_pattern, write_unlabeled, write_variants, Tree};

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Files of `dir` with extension `ext`, sorted by name.
fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == ext) && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Runs the work of one phase for one unit.
pub struct StepContext<'a> {
    pub config: &'a PipelineConfig,
    pub adapters: &'a AdapterSet,
}

impl StepContext<'_> {
    pub fn run(&self, phase: Phase, unit: &UnitPaths) -> Result<()> {
        match phase {
            Phase::Validate => bail!("validation is run once for the whole run"),
            Phase::Align => self.align(unit, &unit.pep()),
            Phase::CodonAlign => self.codon_align(unit),
            Phase::Tree => self.tree(unit),
            Phase::Label => self.label(unit),
            Phase::Fit => self.fit(unit),
        }
    }

    /// Align the peptides of `pep` into `<unit>.pep.msa`.
    fn align(&self, unit: &UnitPaths, pep: &Path) -> Result<()> {
        let aligned = unit.aligner_output();
        let invocation = Invocation::new([
            "+F".to_string(),
            format!("-d={}", pep.display()),
            format!("-o={}", unit.aligner_prefix().display()),
        ])
        .inputs([pep.to_path_buf()])
        .outputs([aligned.clone()])
        .cwd(&unit.dir);
        invoke_checked(self.adapters.aligner.as_ref(), &invocation)?;
        fs::rename(&aligned, unit.pep_msa())
            .with_context(|| format!("renaming {}", aligned.display()))?;
        Ok(())
    }

    /// Build the codon alignments of `nuc` against the peptide alignment and
    /// return the length of the gap-free PAML alignment.
    fn codon_map(&self, unit: &UnitPaths, nuc: &Path) -> Result<usize> {
        let msa = unit.pep_msa();
        let ordered = unit.nuc_ordered();
        reorder_to_msa(nuc, &msa, &ordered)?;
        for (format, no_gap, out) in [
            ("paml", true, unit.paml()),
            ("paml", false, unit.paml_gapped()),
            ("fasta", false, unit.codon_fasta()),
        ] {
            let mut args = vec![arg(&msa), arg(&ordered), "-output".into(), format.into()];
            if no_gap {
                args.push("-nogap".into());
            }
            let invocation = Invocation::new(args)
                .inputs([msa.clone(), ordered.clone()])
                .outputs([out.clone()])
                .stdout_to(&out)
                .cwd(&unit.dir);
            invoke_checked(self.adapters.codon_mapper.as_ref(), &invocation)?;
        }
        let (count, columns) = mfa2phy(&unit.codon_fasta(), &unit.phylip())?;
        debug!("{}: {count} sequences, {columns} columns", unit.unit);
        Ok(paml_alignment_length(&unit.paml())?)
    }

    fn codon_align(&self, unit: &UnitPaths) -> Result<()> {
        let length = self.codon_map(unit, &unit.nuc())?;
        let min = self.config.min_codon_alignment_len;
        if min == 0 || length >= min {
            return Ok(());
        }

        warn!(
            "{}: codon alignment has {length} columns, fewer than {min}; rescuing",
            unit.unit
        );
        let (nuc, pep) = (unit.nuc(), unit.pep());
        let (rescued_nuc, rescued_pep) = (unit.rescued_nuc(), unit.rescued_pep());
        let invocation = Invocation::new([&nuc, &pep, &rescued_nuc, &rescued_pep].map(|p| arg(p)))
            .inputs([nuc.clone(), pep.clone()])
            .outputs([rescued_nuc.clone(), rescued_pep.clone()])
            .cwd(&unit.dir);
        invoke_checked(self.adapters.rescuer.as_ref(), &invocation)?;

        self.align(unit, &rescued_pep)?;
        let length = self.codon_map(unit, &rescued_nuc)?;
        ensure!(
            length >= min,
            "codon alignment still has {length} columns after rescue, fewer than {min}"
        );
        info!("{}: rescued, codon alignment has {length} columns", unit.unit);
        Ok(())
    }

    fn tree(&self, unit: &UnitPaths) -> Result<()> {
        // the tree builder refuses to overwrite the results of a previous attempt
        let stale_suffix = format!(".{}", unit.unit);
        for entry in fs::read_dir(&unit.dir)? {
            let path = entry?.path();
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            if name.is_some_and(|n| n.starts_with("RAxML_") && n.ends_with(&stale_suffix)) {
                fs::remove_file(&path)?;
            }
        }

        let config = self.config;
        let seed = config.seed.to_string();
        let phylip = unit.phylip();
        let best = unit.raxml_best_tree();
        let invocation = Invocation::new([
            "-f".to_string(),
            "a".into(),
            "-x".into(),
            seed.clone(),
            "-p".into(),
            seed,
            "-#".into(),
            config.num_bootstraps.to_string(),
            "-m".into(),
            config.raxml_model.clone(),
            "-s".into(),
            arg(&phylip),
            "-n".into(),
            unit.unit.to_string(),
            "-w".into(),
            arg(&unit.dir),
        ])
        .inputs([phylip])
        .outputs([best.clone()])
        .cwd(&unit.dir);
        invoke_checked(self.adapters.tree_builder.as_ref(), &invocation)?;
        fs::copy(&best, unit.tree()).with_context(|| format!("copying {}", best.display()))?;
        Ok(())
    }

    /// Label the unit's tree and write its control files.
    fn label(&self, unit: &UnitPaths) -> Result<()> {
        let pattern = self
            .config
            .regex
            .as_deref()
            .context("no leaf name pattern configured for labeling")?;
        let pattern = compile_pattern(pattern)?;
        let tree_path = unit.tree();
        let tree = Tree::read(&tree_path)?;
        let variants = label_by_pattern(&tree, &pattern, self.config.labeling_level);
        let labeled = write_variants(&tree_path, &variants)?;
        let unlabeled = write_unlabeled(&tree_path, &tree)?;

        for stale in files_with_extension(&unit.dir, "ctl")? {
            fs::remove_file(&stale)?;
        }
        let controls = controls_for_trees(
            &self.config.models,
            self.config.generate_other,
            &labeled,
            &unlabeled,
            &unit.paml(),
        );
        ensure!(
            !controls.is_empty(),
            "no control file generated from {} labeled trees",
            labeled.len()
        );
        write_control_files(&controls)?;
        info!(
            "{}: {} labeled trees, {} control files",
            unit.unit,
            labeled.len(),
            controls.len()
        );
        Ok(())
    }

    /// Fit every control file of the unit. All fits are attempted; the step
    /// fails if any of them did.
    fn fit(&self, unit: &UnitPaths) -> Result<()> {
        let controls = files_with_extension(&unit.dir, "ctl")?;
        ensure!(!controls.is_empty(), "no control files in {}", unit.dir.display());
        let mut failed = 0;
        for ctl in &controls {
            let Some(name) = ctl.file_name() else {
                continue;
            };
            let invocation = Invocation::new([name.to_string_lossy()])
                .inputs([ctl.clone()])
                .outputs([ctl.with_extension("")])
                .cwd(&unit.dir);
            if let Err(err) = invoke_checked(self.adapters.model_fitter.as_ref(), &invocation) {
                warn!("{}: {err}", unit.unit);
                if let Some(stderr) = err.stderr() {
                    warn!("{}: {} stderr:\n{stderr}", unit.unit, name.to_string_lossy());
                }
                failed += 1;
            }
        }
        ensure!(failed == 0, "{failed} of {} model fits failed", controls.len());
        Ok(())
    }
}
