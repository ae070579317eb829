//! `phase_paml status`

use anyhow::{bail, Context, Result};
use clap::{self, Parser};
use phase_log::query::StatusQuery;
use phase_log::state::resume_phase;
use phase_log::{EventLog, SqliteEventLog};
use pp_lib::RunLayout;
use pp_types::{LoggedEvent, Phase, PhaseStatus, Run, UnitId};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Report the state of runs recorded in an event database.
#[derive(Parser, Debug, Clone)]
pub struct StatusCmd {
    /// Run to report on. Lists every run when omitted.
    name: Option<String>,

    /// Output directory of the run; its event database is used.
    #[clap(long, short = 'o', value_name = "DIR", conflicts_with = "database")]
    output_dir: Option<PathBuf>,

    /// Event database to read.
    #[clap(long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// List the events with this status (running, success, failed), newest first.
    #[clap(long)]
    status: Option<PhaseStatus>,

    /// List the phases still marked as running.
    #[clap(long)]
    in_flight: bool,

    /// List the units of the run.
    #[clap(long)]
    units: bool,

    /// Show the history of one unit.
    #[clap(long, value_name = "UNIT")]
    unit: Option<String>,
}

fn phase_name(number: u32) -> String {
    Phase::from_number(number).map_or_else(|| number.to_string(), |p| p.to_string())
}

fn write_events(out: &mut impl Write, events: &[LoggedEvent]) -> Result<()> {
    for logged in events {
        let event = &logged.event;
        writeln!(
            out,
            "#{}\t{}\t{}\t{}\t{}",
            logged.seq,
            event.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f"),
            event.unit.as_ref().map_or("-", UnitId::as_str),
            phase_name(event.phase),
            event.status
        )?;
    }
    Ok(())
}

impl StatusCmd {
    fn database(&self) -> Result<PathBuf> {
        match (&self.database, &self.output_dir) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(dir)) => Ok(RunLayout::new(dir).database()),
            (None, None) => bail!("either --output-dir or --database is required"),
        }
    }

    /// Write the report for the selected run, or the run list, to `out`.
    pub fn report(&self, log: &dyn EventLog, out: &mut impl Write) -> Result<()> {
        let query = StatusQuery::new(log);
        let Some(name) = &self.name else {
            for run in query.runs()? {
                writeln!(out, "{}\t{}", run.id, run.name)?;
            }
            return Ok(());
        };
        let run: Run = query
            .run(name)?
            .with_context(|| format!("no run named '{name}'"))?;

        if let Some(unit) = &self.unit {
            return write_events(out, &query.unit_events(&run, &UnitId::new(unit.as_str()))?);
        }
        if let Some(status) = self.status {
            return write_events(out, &query.events_with_status(&run, status)?);
        }
        if self.in_flight {
            for key in query.in_flight(&run)? {
                writeln!(out, "{key}")?;
            }
            return Ok(());
        }
        if self.units {
            for unit in query.units(&run)? {
                writeln!(out, "{}\t{}", unit.id, unit.metadata())?;
            }
            return Ok(());
        }

        writeln!(out, "run {} ({})", run.name, run.id)?;
        for (phase, status, count) in query.phase_summary(&run)? {
            writeln!(out, "phase {phase} {:<12} {:<8} {count:>6}", phase_name(phase), status)?;
        }
        writeln!(out, "resume at: {}", resume_phase(log, run.id)?)?;
        Ok(())
    }

    pub fn execute(self) -> Result<ExitCode> {
        let path = self.database()?;
        if !path.exists() {
            bail!("no event database at {}", path.display());
        }
        let log = SqliteEventLog::open(&path)?;
        let stdout = std::io::stdout();
        self.report(&log, &mut stdout.lock())?;
        Ok(ExitCode::SUCCESS)
    }
}
