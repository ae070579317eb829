//! phase_paml
#![deny(missing_docs)]

use anyhow::Result;
use clap::{self, Parser};
use pp_wrap::run_cmd::RunCmd;
use pp_wrap::status_cmd::StatusCmd;
use pp_wrap::tools_cmd::{LabelCmd, LrtCmd, MapBackCmd, Mfa2phyCmd, ModelsCmd, SummarizeCmd};
use pp_wrap::utils::{init_logging, print_error_chain};
use std::process::ExitCode;

const CMD: &str = "phase_paml";

/// Detect positive selection in orthogroups with codeml, phase by phase.
#[derive(Parser, Debug)]
#[clap(name = CMD, version)]
struct PhasePaml {
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
#[allow(clippy::large_enum_variant)]
enum SubCommand {
    /// Run the pipeline on a directory of orthogroups, or resume a run.
    #[clap(name = "run")]
    Run(RunCmd),

    /// Show the recorded state of a run.
    #[clap(name = "status")]
    Status(StatusCmd),

    /// Label the foreground branches of a tree and write control files.
    #[clap(name = "label")]
    Label(LabelCmd),

    /// Likelihood-ratio test between two codeml result files.
    #[clap(name = "lrt")]
    Lrt(LrtCmd),

    /// Summarize every nested-model comparison under a directory as CSV.
    #[clap(name = "summarize")]
    Summarize(SummarizeCmd),

    /// List the codon models that can be fitted.
    #[clap(name = "models")]
    Models(ModelsCmd),

    /// Convert a FASTA alignment to PHYLIP.
    #[clap(name = "mfa2phy")]
    Mfa2phy(Mfa2phyCmd),

    /// Map gap-free alignment positions back to the input sequences.
    #[clap(name = "map-back")]
    MapBack(MapBackCmd),
}

fn inner_main() -> Result<ExitCode> {
    let opts = PhasePaml::parse();
    init_logging();
    match opts.subcmd {
        SubCommand::Run(c) => c.execute(),
        SubCommand::Status(c) => c.execute(),
        SubCommand::Label(c) => c.execute(),
        SubCommand::Lrt(c) => c.execute(),
        SubCommand::Summarize(c) => c.execute(),
        SubCommand::Models(c) => c.execute(),
        SubCommand::Mfa2phy(c) => c.execute(),
        SubCommand::MapBack(c) => c.execute(),
    }
}

fn main() -> ExitCode {
    match inner_main() {
        Ok(exit_code) => exit_code,
        Err(err) => {
            print_error_chain(&err);
            ExitCode::FAILURE
        }
    }
}
