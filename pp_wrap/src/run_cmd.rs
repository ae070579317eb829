//! `phase_paml run`

use crate::utils::{absolute, parse_phase, validate_run_name};
use anyhow::{Context, Result};
use clap::{self, Parser};
use codeml::ModelId;
use log::{info, warn};
use phase_log::SqliteEventLog;
use pp_lib::{AdapterSet, Orchestrator, PipelineConfig, RunLayout, RunRequest};
use pp_types::Phase;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Run the pipeline over a directory of orthogroups, or resume a run.
#[derive(Parser, Debug, Clone)]
pub struct RunCmd {
    /// Name of the run. Reusing a name resumes that run.
    #[clap(long, short = 'n', value_parser = validate_run_name)]
    name: String,

    /// Directory with the `nuc/` and `pep/` FASTA files of every orthogroup.
    /// Required for a new run.
    #[clap(long, short = 'i', value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Directory receiving the run's artifacts.
    #[clap(long, short = 'o', value_name = "DIR")]
    output_dir: PathBuf,

    /// Event database. Defaults to phase_paml.db in the output directory.
    #[clap(long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// TOML file with pipeline settings. Flags take precedence.
    #[clap(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Start at this phase (number or name) instead of where the run stopped.
    #[clap(long, value_parser = parse_phase)]
    phase: Option<Phase>,

    /// Redo units that already succeeded.
    #[clap(long)]
    force: bool,

    /// Pattern matching the names of the foreground leaves.
    #[clap(long, short = 'r')]
    regex: Option<String>,

    /// Ancestor levels labeled above each matching leaf.
    #[clap(long)]
    labeling_level: Option<usize>,

    /// Comma-separated models to fit; see `phase_paml models`.
    #[clap(long, short = 'm', value_delimiter = ',')]
    models: Option<Vec<ModelId>>,

    /// Also fit the nested partner of every requested model.
    #[clap(long)]
    generate_other: bool,

    /// Units processed in parallel.
    #[clap(long, short = 'w')]
    workers: Option<usize>,

    /// Bootstrap replicates of the tree search.
    #[clap(long)]
    bootstraps: Option<u32>,

    /// Rescue codon alignments shorter than this.
    #[clap(long, value_name = "COLUMNS")]
    min_codon_alignment_len: Option<usize>,

    /// Symlink the inputs into the run directory instead of copying them.
    #[clap(long)]
    no_copy: bool,

    /// Try to rescue the CDS of record pairs failing the length check.
    #[clap(long)]
    fix_faulty: bool,
}

impl RunCmd {
    /// Settings from the configuration file, overridden by flags.
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(regex) = &self.regex {
            config.regex = Some(regex.clone());
        }
        if let Some(level) = self.labeling_level {
            config.labeling_level = level;
        }
        if let Some(models) = &self.models {
            config.models = models.clone();
        }
        if let Some(workers) = self.workers {
            config.num_workers = workers;
        }
        if let Some(bootstraps) = self.bootstraps {
            config.num_bootstraps = bootstraps;
        }
        if let Some(min) = self.min_codon_alignment_len {
            config.min_codon_alignment_len = min;
        }
        config.generate_other |= self.generate_other;
        config.fix_faulty |= self.fix_faulty;
        if self.no_copy {
            config.copy_inputs = false;
        }
        Ok(config)
    }

    pub fn execute(self) -> Result<ExitCode> {
        let config = self.pipeline_config()?;
        let out_dir = absolute(&self.output_dir)?;
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("creating {}", out_dir.display()))?;
        let layout = RunLayout::new(&out_dir);
        let database = match &self.database {
            Some(path) => path.clone(),
            None => layout.database(),
        };
        let log = SqliteEventLog::open(&database)?;
        info!("events are recorded in {}", database.display());

        let input_dir = self.input_dir.as_deref().map(absolute).transpose()?;
        let orchestrator = Orchestrator::new(
            config.clone(),
            Arc::new(log),
            AdapterSet::from_tools(&config.tools),
            layout,
        );
        let report = orchestrator.run(&RunRequest {
            name: self.name,
            input_dir,
            start: self.phase,
            force: self.force,
        })?;

        for phase in &report.phases {
            println!(
                "phase {} {:<12} succeeded {:>5}  failed {:>5}  skipped {:>5}  not eligible {:>5}",
                phase.phase.number(),
                phase.phase.to_string(),
                phase.succeeded.len(),
                phase.failed.len(),
                phase.skipped.len(),
                phase.blocked.len()
            );
        }
        let failed = report.failed_units();
        if !failed.is_empty() {
            warn!(
                "{} units failed; rerun `phase_paml run --name {}` to retry them",
                failed.len(),
                report.run.name
            );
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_override_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("phase_paml.toml");
        std::fs::write(&path, "regex = \"GRM.*\"\nnum_workers = 8\nmodels = [\"M0\"]\n")?;
        let cmd = RunCmd::try_parse_from([
            "run",
            "--name",
            "grm",
            "-o",
            "out",
            "--config",
            path.to_str().unwrap(),
            "--models",
            "M7,M8",
            "--workers",
            "2",
            "--no-copy",
            "--phase",
            "tree",
        ])?;
        let config = cmd.pipeline_config()?;
        assert_eq!(config.regex.as_deref(), Some("GRM.*"));
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.models, vec![ModelId::M7, ModelId::M8]);
        assert!(!config.copy_inputs);
        assert_eq!(cmd.phase, Some(Phase::Tree));
        assert!(RunCmd::try_parse_from(["run", "--name", "bad name", "-o", "out"]).is_err());
        Ok(())
    }
}
