//! Pipeline configuration.

use anyhow::{Context, Result};
use codeml::ModelId;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Executables invoked by the process adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolPaths {
    /// Peptide multiple sequence aligner.
    pub prank: PathBuf,
    /// Peptide alignment to codon alignment.
    pub pal2nal: PathBuf,
    /// Maximum likelihood tree inference.
    pub raxml: PathBuf,
    pub codeml: PathBuf,
    /// Trims a short codon alignment's inputs; called with
    /// `<nuc> <pep> <rescued nuc> <rescued pep>`.
    pub rescue: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        ToolPaths {
            prank: "prank".into(),
            pal2nal: "pal2nal.pl".into(),
            raxml: "raxmlHPC".into(),
            codeml: "codeml".into(),
            rescue: "rescue_short_alignment".into(),
        }
    }
}

/// Everything a run is parameterized by. Built once and handed to the
/// orchestrator, which never changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Bootstrap replicates of the tree search.
    pub num_bootstraps: u32,
    /// Ancestor levels labeled above each matching leaf.
    pub labeling_level: usize,
    /// Leaf name pattern selecting the foreground lineages. Required by the
    /// label phase.
    pub regex: Option<String>,
    pub models: Vec<ModelId>,
    /// Also generate the nested partner of every requested model.
    pub generate_other: bool,
    pub num_workers: usize,
    /// Codon alignments shorter than this go through the rescue tool;
    /// zero disables the check.
    pub min_codon_alignment_len: usize,
    /// Copy the inputs into the run directory rather than symlinking them.
    pub copy_inputs: bool,
    /// Try to rescue the CDS of faulty record pairs during validation.
    pub fix_faulty: bool,
    pub raxml_model: String,
    pub seed: u64,
    pub tools: ToolPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            num_bootstraps: 100,
            labeling_level: tree_label::DEFAULT_DEPTH,
            regex: None,
            models: vec![ModelId::AH1, ModelId::AH0],
            generate_other: false,
            num_workers: 1,
            min_codon_alignment_len: 0,
            copy_inputs: true,
            fix_faulty: false,
            raxml_model: "GTRGAMMA".to_string(),
            seed: 12345,
            tools: ToolPaths::default(),
        }
    }
}

fn warn_if_changed<T: PartialEq + Debug>(name: &str, default: &T, value: &T) {
    if default != value {
        warn!("using non-default {name} = {value:?}");
    }
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("parsing configuration {}", path.display()))?;
        config.warn_non_default();
        Ok(config)
    }

    /// Log every setting that differs from its default.
    pub fn warn_non_default(&self) {
        let d = PipelineConfig::default();
        warn_if_changed("num_bootstraps", &d.num_bootstraps, &self.num_bootstraps);
        warn_if_changed("labeling_level", &d.labeling_level, &self.labeling_level);
        warn_if_changed("models", &d.models, &self.models);
        warn_if_changed("generate_other", &d.generate_other, &self.generate_other);
        warn_if_changed(
            "min_codon_alignment_len",
            &d.min_codon_alignment_len,
            &self.min_codon_alignment_len,
        );
        warn_if_changed("copy_inputs", &d.copy_inputs, &self.copy_inputs);
        warn_if_changed("fix_faulty", &d.fix_faulty, &self.fix_faulty);
        warn_if_changed("raxml_model", &d.raxml_model, &self.raxml_model);
        warn_if_changed("seed", &d.seed, &self.seed);
        warn_if_changed("tools", &d.tools, &self.tools);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(PipelineConfig::from_toml("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = PipelineConfig::from_toml(
            r#"
            regex = "GRM.*"
            models = ["M7", "ah0"]
            num_workers = 4

            [tools]
            codeml = "/opt/paml/bin/codeml"
            "#,
        )
        .unwrap();
        assert_eq!(config.regex.as_deref(), Some("GRM.*"));
        assert_eq!(config.models, vec![ModelId::M7, ModelId::AH0]);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.num_bootstraps, 100);
        assert_eq!(config.tools.codeml, PathBuf::from("/opt/paml/bin/codeml"));
        assert_eq!(config.tools.prank, PathBuf::from("prank"));
    }

    #[test]
    fn test_rejects_unknown() {
        assert!(PipelineConfig::from_toml("models = [\"M3\"]").is_err());
        assert!(PipelineConfig::from_toml("bootstraps = 10").is_err());
    }

    #[test]
    fn test_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("phase_paml.toml");
        std::fs::write(&path, "seed = 7\n")?;
        assert_eq!(PipelineConfig::load(&path)?.seed, 7);
        assert!(PipelineConfig::load(&dir.path().join("missing.toml")).is_err());
        Ok(())
    }
}
