//! Standalone subcommands exposing single pipeline steps.

use anyhow::{ensure, Context, Result};
use clap::{self, Parser};
use codeml::{
    controls_for_trees, evaluate_files, summarize_dir, write_control_files, write_csv, ModelId,
    PositiveSite,
};
use fasta_pair::msa::{mfa2phy, PamlAlignment};
use itertools::Itertools;
use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tree_label::{
    compile_pattern, label_by_pattern, write_labeled_nodes, write_unlabeled, write_variants, Tree,
    DEFAULT_DEPTH,
};

/// Label the foreground branches of a tree and write its control files.
#[derive(Parser, Debug, Clone)]
pub struct LabelCmd {
    /// Newick tree file.
    tree: PathBuf,

    /// Label ancestors of the leaves whose names match this pattern.
    #[clap(long, short = 'r', conflicts_with = "nodes")]
    regex: Option<String>,

    /// Label these node ids (comma-separated) in one tree.
    #[clap(long, value_delimiter = ',')]
    nodes: Vec<usize>,

    /// Ancestor levels labeled above each matching leaf.
    #[clap(long, default_value_t = DEFAULT_DEPTH)]
    level: usize,

    /// Codon alignment. Control files are written only when given.
    #[clap(long, value_name = "PATH")]
    alignment: Option<PathBuf>,

    /// Comma-separated models of the control files.
    #[clap(long, short = 'm', value_delimiter = ',', default_values_t = [ModelId::AH1, ModelId::AH0])]
    models: Vec<ModelId>,

    /// Also write the nested partner of every requested model.
    #[clap(long)]
    generate_other: bool,

    /// Print the node id of every node and exit.
    #[clap(long)]
    print_nodes: bool,
}

impl LabelCmd {
    pub fn execute(self) -> Result<ExitCode> {
        let tree = Tree::read(&self.tree)?;
        if self.print_nodes {
            for (node_id, name) in tree.node_table() {
                println!("{node_id}\t{name}");
            }
            return Ok(ExitCode::SUCCESS);
        }

        let labeled = if let Some(regex) = &self.regex {
            let pattern = compile_pattern(regex)?;
            write_variants(&self.tree, &label_by_pattern(&tree, &pattern, self.level))?
        } else {
            ensure!(!self.nodes.is_empty(), "either --regex or --nodes is required");
            vec![write_labeled_nodes(&self.tree, &tree, &self.nodes)?]
        };
        let unlabeled = write_unlabeled(&self.tree, &tree)?;
        for path in &labeled {
            println!("{}", path.display());
        }

        if let Some(alignment) = &self.alignment {
            let controls = controls_for_trees(
                &self.models,
                self.generate_other,
                &labeled,
                &unlabeled,
                alignment,
            );
            for path in write_control_files(&controls)? {
                println!("{}", path.display());
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

/// Likelihood-ratio test between two fitted nested models.
#[derive(Parser, Debug, Clone)]
pub struct LrtCmd {
    /// Result file of the null model.
    h0: PathBuf,

    /// Result file of the alternative model.
    h1: PathBuf,
}

fn print_sites(title: &str, sites: &[PositiveSite]) {
    if sites.is_empty() {
        return;
    }
    println!("{title}");
    println!("position,residue,probability,significance");
    for site in sites {
        println!("{site}");
    }
}

impl LrtCmd {
    pub fn execute(self) -> Result<ExitCode> {
        let (fit0, fit1, lrt) = evaluate_files(&self.h0, &self.h1)?;
        println!("lnL(H0) = {}  np = {}", fit0.lnl, fit0.np);
        println!("lnL(H1) = {}  np = {}", fit1.lnl, fit1.np);
        println!(
            "2dlnL = {:.6}  df = {}  p = {:.6e}  {}",
            lrt.statistic, lrt.df, lrt.p_value, lrt.significance
        );
        print_sites("Naive Empirical Bayes (NEB)", &fit1.neb);
        print_sites("Bayes Empirical Bayes (BEB)", &fit1.beb);
        Ok(ExitCode::SUCCESS)
    }
}

/// Tabulate the likelihood-ratio tests of every nested result pair under a
/// directory.
#[derive(Parser, Debug, Clone)]
pub struct SummarizeCmd {
    /// Directory searched recursively for result files.
    dir: PathBuf,

    /// CSV output. Defaults to stdout.
    #[clap(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,
}

impl SummarizeCmd {
    pub fn execute(self) -> Result<ExitCode> {
        let summary = summarize_dir(&self.dir)?;
        for (h0, h1, err) in &summary.failures {
            warn!("{} vs {}: {err}", h0.display(), h1.display());
        }
        match &self.output {
            Some(path) => {
                let file =
                    File::create(path).with_context(|| format!("creating {}", path.display()))?;
                write_csv(&summary.rows, BufWriter::new(file))?;
                info!("{} comparisons written to {}", summary.rows.len(), path.display());
            }
            None => write_csv(&summary.rows, std::io::stdout().lock())?,
        }
        Ok(ExitCode::SUCCESS)
    }
}

/// Print the available models.
#[derive(Parser, Debug, Clone)]
pub struct ModelsCmd {}

impl ModelsCmd {
    pub fn execute(self) -> Result<ExitCode> {
        print!("{}", ModelId::help_table());
        Ok(ExitCode::SUCCESS)
    }
}

/// Convert a FASTA alignment to sequential PHYLIP.
#[derive(Parser, Debug, Clone)]
pub struct Mfa2phyCmd {
    input: PathBuf,
    output: PathBuf,
}

impl Mfa2phyCmd {
    pub fn execute(self) -> Result<ExitCode> {
        let (count, length) = mfa2phy(&self.input, &self.output)?;
        info!("{count} sequences of {length} columns written to {}", self.output.display());
        Ok(ExitCode::SUCCESS)
    }
}

/// Map positions of the gap-free codon alignment back to the gapped
/// alignment and to every input sequence.
#[derive(Parser, Debug, Clone)]
pub struct MapBackCmd {
    /// Gapped PAML alignment of the unit.
    alignment: PathBuf,

    /// 1-based positions in the gap-free alignment.
    #[clap(required = true, value_parser = clap::value_parser!(usize))]
    positions: Vec<usize>,
}

impl MapBackCmd {
    /// Mapped positions as `position,record,gapped,original` lines, all 1-based.
    fn mapped_lines(&self, alignment: &PamlAlignment) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for &position in &self.positions {
            ensure!(position > 0, "positions are 1-based");
            let mapped = alignment.map_back(position - 1).with_context(|| {
                format!(
                    "position {position} is beyond the {} gap-free columns",
                    alignment.length - alignment.gap_columns().len()
                )
            })?;
            lines.extend(mapped.into_iter().map(|m| {
                format!("{position},{},{},{}", m.record, m.gapped + 1, m.original + 1)
            }));
        }
        Ok(lines)
    }

    pub fn execute(self) -> Result<ExitCode> {
        let alignment = PamlAlignment::read(&self.alignment)?;
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "position,record,gapped,original")?;
        writeln!(out, "{}", self.mapped_lines(&alignment)?.iter().join("\n"))?;
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_label_writes_trees_and_controls() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let tree = dir.path().join("OG1.nwk");
        std::fs::write(&tree, "((GRMa:0.1,b:0.2):0.3,c:0.4);\n")?;
        let aln = dir.path().join("OG1.paml");
        std::fs::write(&aln, "")?;
        let cmd = LabelCmd::try_parse_from([
            "label",
            tree.to_str().unwrap(),
            "--regex",
            "GRM",
            "--level",
            "1",
            "--alignment",
            aln.to_str().unwrap(),
            "--models",
            "Ah1",
        ])?;
        cmd.execute()?;
        assert!(dir.path().join("OG1.nwk.nl").exists());
        let ctls: Vec<_> = std::fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "ctl"))
            .collect();
        assert_eq!(ctls.len(), 1);
        Ok(())
    }

    #[test]
    fn test_map_back_lines() -> Result<()> {
        let alignment = PamlAlignment::parse("2 6\nhuman\nAT-GCC\nmouse\nATGGCC\n")
            .map_err(anyhow::Error::msg)?;
        let cmd = MapBackCmd::try_parse_from(["map-back", "x.pamlg", "3", "4"])?;
        assert_eq!(
            cmd.mapped_lines(&alignment)?,
            vec!["3,human,4,3", "3,mouse,4,4", "4,human,5,4", "4,mouse,5,5"]
        );
        let cmd = MapBackCmd::try_parse_from(["map-back", "x.pamlg", "6"])?;
        assert!(cmd.mapped_lines(&alignment).is_err());
        Ok(())
    }
}
