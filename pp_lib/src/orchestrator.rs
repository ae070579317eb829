//! Drives a run through the phases, one barrier per phase.

use crate::adapter::{AdapterFailure, AdapterSet};
use crate::config::PipelineConfig;
use crate::layout::RunLayout;
use crate::stage::stage_inputs;
use crate::steps::StepContext;
use anyhow::{ensure, Context, Result};
use fasta_pair::validate_input_dir;
use log::{debug, info, warn};
use phase_log::state::{self, ResumePoint, RunState};
use phase_log::{EventLog, StorageError};
use pp_types::{Phase, PhaseEvent, PhaseStatus, Run, UnitId};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// What to run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub name: String,
    /// Directory holding `nuc/` and `pep/`. Needed to validate a new run.
    pub input_dir: Option<PathBuf>,
    /// Explicit first phase; otherwise the run resumes where it stopped.
    pub start: Option<Phase>,
    /// Redo units that already succeeded in a phase.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeeded,
    Failed,
    /// Already succeeded in this phase.
    Skipped,
    /// Did not succeed in the previous phase.
    Blocked,
}

/// Per-unit outcome of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub succeeded: Vec<UnitId>,
    pub failed: Vec<UnitId>,
    pub skipped: Vec<UnitId>,
    pub blocked: Vec<UnitId>,
}

impl PhaseReport {
    fn new(phase: Phase, outcomes: Vec<(UnitId, Outcome)>) -> Self {
        let mut report = PhaseReport {
            phase,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            blocked: Vec::new(),
        };
        for (unit, outcome) in outcomes {
            match outcome {
                Outcome::Succeeded => report.succeeded.push(unit),
                Outcome::Failed => report.failed.push(unit),
                Outcome::Skipped => report.skipped.push(unit),
                Outcome::Blocked => report.blocked.push(unit),
            }
        }
        report
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run: Run,
    /// Phases after validation that were driven, in order.
    pub phases: Vec<PhaseReport>,
}

impl RunReport {
    /// Units that failed in any phase of this invocation.
    pub fn failed_units(&self) -> Vec<&UnitId> {
        let mut units: Vec<_> = self.phases.iter().flat_map(|p| &p.failed).collect();
        units.sort();
        units.dedup();
        units
    }
}

/// Full stderr of the tool whose failure caused `err`, if any.
fn tool_stderr(err: &anyhow::Error) -> Option<&str> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<AdapterFailure>())
        .and_then(AdapterFailure::stderr)
}

pub struct Orchestrator {
    config: PipelineConfig,
    log: Arc<dyn EventLog>,
    adapters: AdapterSet,
    layout: RunLayout,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        log: Arc<dyn EventLog>,
        adapters: AdapterSet,
        layout: RunLayout,
    ) -> Self {
        Orchestrator {
            config,
            log,
            adapters,
            layout,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    fn append(
        &self,
        run: &Run,
        unit: Option<&UnitId>,
        phase: u32,
        status: PhaseStatus,
    ) -> Result<(), StorageError> {
        let seq = self
            .log
            .append(&PhaseEvent::now(run.id, unit.cloned(), phase, status))?;
        match unit {
            Some(unit) => debug!("#{seq} {}: {unit} phase {phase} {status}", run.name),
            None => debug!("#{seq} {}: phase {phase} {status}", run.name),
        }
        Ok(())
    }

    /// Whether phase 0 completed for `run`.
    fn validated(&self, run: &Run) -> Result<bool, StorageError> {
        Ok(state::latest_status(&*self.log, run.id, None, Phase::Validate.number())?
            == Some(PhaseStatus::Success))
    }

    /// Close whatever an interrupted invocation left running.
    fn close_in_flight(&self, run: &Run) -> Result<(), StorageError> {
        for key in state::in_flight(&*self.log, run.id)? {
            warn!("{}: {key} was interrupted, marking it failed", run.name);
            self.append(run, key.unit.as_ref(), key.phase, PhaseStatus::Failed)?;
        }
        Ok(())
    }

    /// Validate the inputs, register the run and its units, and stage the
    /// inputs. A pairing error aborts before anything is registered.
    fn validate(&self, request: &RunRequest) -> Result<Run> {
        let input_dir = request
            .input_dir
            .as_deref()
            .context("an input directory is required to validate a new run")?;
        let validation = validate_input_dir(input_dir)?;

        let registration = self.log.register_run(&request.name)?;
        let run = registration.run().clone();
        if registration.is_new() {
            info!("registered run '{}' ({})", run.name, run.id);
        } else {
            info!("completing validation of run '{}'", run.name);
        }
        let phase = Phase::Validate.number();
        self.append(&run, None, phase, PhaseStatus::Running)?;

        let staged = fs::create_dir_all(self.layout.root())
            .with_context(|| format!("creating {}", self.layout.root().display()))
            .and_then(|()| stage_inputs(&validation, &self.layout, &self.config));
        if let Err(err) = staged {
            self.append(&run, None, phase, PhaseStatus::Failed)?;
            return Err(err);
        }

        let units = validation.to_units(run.id);
        self.log.register_units(run.id, &units)?;
        for unit in &units {
            self.append(&run, Some(&unit.id), phase, PhaseStatus::Success)?;
        }
        self.append(&run, None, phase, PhaseStatus::Success)?;
        Ok(run)
    }

    /// Drive the run named in `request` through its remaining phases.
    ///
    /// A unit failing a phase is recorded and left behind; the other units
    /// carry on. Storage errors abort the run.
    pub fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let existing = self.log.find_run(&request.name)?;
        let validated = match &existing {
            Some(run) => {
                self.close_in_flight(run)?;
                self.validated(run)?
            }
            None => false,
        };
        let run = match existing {
            Some(run) if validated => {
                info!("run '{}' is already registered", run.name);
                run
            }
            _ => {
                ensure!(
                    request.start.map_or(true, |p| p == Phase::Validate),
                    "run '{}' has not been validated; start it at phase 0",
                    request.name
                );
                self.validate(request)?
            }
        };

        let first = match request.start {
            Some(phase) => phase,
            None => match state::resume_phase(&*self.log, run.id)? {
                ResumePoint::Phase(number) => {
                    Phase::from_number(number).with_context(|| format!("no phase {number}"))?
                }
                ResumePoint::Complete => {
                    info!("run '{}' is complete", run.name);
                    return Ok(RunReport {
                        run,
                        phases: Vec::new(),
                    });
                }
            },
        };
        let first = first.max(Phase::Align);
        info!("run '{}' starting at {first}", run.name);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_workers.max(1))
            .build()
            .context("building the worker pool")?;
        let mut phases = Vec::new();
        for phase in first.from_here() {
            phases.push(self.run_phase(&pool, &run, phase, request.force)?);
        }
        Ok(RunReport { run, phases })
    }

    /// Run `phase` for every unit and wait for all of them.
    fn run_phase(&self, pool: &ThreadPool, run: &Run, phase: Phase, force: bool) -> Result<PhaseReport> {
        let state = state::load(&*self.log, run.id)?;
        let units = self.log.units(run.id)?;
        let ctx = StepContext {
            config: &self.config,
            adapters: &self.adapters,
        };
        info!("phase {} ({phase}): {} units", phase.number(), units.len());

        let outcomes = pool.install(|| {
            units
                .par_iter()
                .map(|unit| {
                    let outcome = self.run_unit(&ctx, &state, run, phase, &unit.id, force)?;
                    Ok((unit.id.clone(), outcome))
                })
                .collect::<Result<Vec<_>, StorageError>>()
        })?;
        let report = PhaseReport::new(phase, outcomes);
        info!(
            "phase {} ({phase}): {} succeeded, {} failed, {} skipped, {} not eligible",
            phase.number(),
            report.succeeded.len(),
            report.failed.len(),
            report.skipped.len(),
            report.blocked.len()
        );
        Ok(report)
    }

    fn run_unit(
        &self,
        ctx: &StepContext<'_>,
        state: &RunState,
        run: &Run,
        phase: Phase,
        unit: &UnitId,
        force: bool,
    ) -> Result<Outcome, StorageError> {
        let number = phase.number();
        if let Some(previous) = phase.previous() {
            if !state.succeeded(unit, previous.number()) {
                debug!("{unit}: {previous} did not succeed, skipping {phase}");
                return Ok(Outcome::Blocked);
            }
        }
        if !force && state.succeeded(unit, number) {
            debug!("{unit}: {phase} already succeeded");
            return Ok(Outcome::Skipped);
        }

        self.append(run, Some(unit), number, PhaseStatus::Running)?;
        match ctx.run(phase, &self.layout.unit(unit)) {
            Ok(()) => {
                self.append(run, Some(unit), number, PhaseStatus::Success)?;
                Ok(Outcome::Succeeded)
            }
            Err(err) => {
                warn!("{unit}: {phase} failed: {err:#}");
                if let Some(stderr) = tool_stderr(&err) {
                    warn!("{unit}: {phase} stderr:\n{stderr}");
                }
                self.append(run, Some(unit), number, PhaseStatus::Failed)?;
                Ok(Outcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{invoke_checked, Adapter, AdapterOutput, Invocation, Tool};
    use fasta_pair::msa::paml_alignment_length;
    use fasta_pair::read_records;
    use phase_log::MemoryEventLog;
    use pretty_assertions::assert_eq;
    use std::ffi::OsStr;
    use std::path::Path;

    /// Stands in for every external tool. Writes plausible outputs, or exits
    /// with status 1 for the units listed in `fail`.
    struct FakeTool {
        tool: Tool,
        fail: Vec<&'static str>,
    }

    fn fasta(path: &Path) -> String {
        read_records(path)
            .unwrap()
            .iter()
            .map(|r| format!(">{}\n{}\n", r.id(), String::from_utf8_lossy(r.seq())))
            .collect()
    }

    fn doubled(path: &Path) -> String {
        read_records(path)
            .unwrap()
            .iter()
            .map(|r| {
                let seq = String::from_utf8_lossy(r.seq());
                format!(">{}\n{seq}{seq}\n", r.id())
            })
            .collect()
    }

    fn paml(path: &Path) -> String {
        let records = read_records(path).unwrap();
        let mut text = format!(" {} {}\n", records.len(), records[0].seq().len());
        for r in &records {
            text += &format!("{}\n{}\n", r.id(), String::from_utf8_lossy(r.seq()));
        }
        text
    }

    impl FakeTool {
        fn unit_dir<'a>(&self, invocation: &'a Invocation) -> Option<&'a OsStr> {
            invocation
                .outputs
                .first()
                .and_then(|p| p.parent())
                .and_then(Path::file_name)
        }
    }

    impl Adapter for FakeTool {
        fn tool(&self) -> Tool {
            self.tool
        }

        fn invoke(&self, invocation: &Invocation) -> Result<AdapterOutput, AdapterFailure> {
            let unit = self.unit_dir(invocation).unwrap();
            if self.fail.iter().any(|f| OsStr::new(f) == unit) {
                return Ok(AdapterOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "fake failure\n".into(),
                });
            }
            let (inputs, outputs) = (&invocation.inputs, &invocation.outputs);
            let written = match self.tool {
                Tool::Aligner => fasta(&inputs[0]),
                Tool::CodonMapper if invocation.args.contains(&"fasta".to_string()) => {
                    fasta(&inputs[1])
                }
                Tool::CodonMapper => paml(&inputs[1]),
                Tool::TreeBuilder => "((GRM1_x:0.1,At_x:0.2):0.05,Os_x:0.3);\n".to_string(),
                Tool::ModelFitter => "lnL(ntime:  3  np:  5):   -100.000000   +0.000000\n".into(),
                Tool::Rescuer => {
                    std::fs::write(&outputs[1], doubled(&inputs[1])).unwrap();
                    doubled(&inputs[0])
                }
            };
            std::fs::write(&outputs[0], &written).unwrap();
            Ok(AdapterOutput {
                exit_code: 0,
                stdout: written,
                stderr: String::new(),
            })
        }
    }

    fn fakes(fail: &[(Tool, &'static str)]) -> AdapterSet {
        let fake = |tool: Tool| -> Arc<dyn Adapter> {
            Arc::new(FakeTool {
                tool,
                fail: fail
                    .iter()
                    .filter(|(t, _)| *t == tool)
                    .map(|(_, unit)| *unit)
                    .collect(),
            })
        };
        AdapterSet {
            aligner: fake(Tool::Aligner),
            codon_mapper: fake(Tool::CodonMapper),
            tree_builder: fake(Tool::TreeBuilder),
            model_fitter: fake(Tool::ModelFitter),
            rescuer: fake(Tool::Rescuer),
        }
    }

    fn write_inputs(dir: &Path, units: &[&str]) {
        std::fs::create_dir_all(dir.join("nuc")).unwrap();
        std::fs::create_dir_all(dir.join("pep")).unwrap();
        for unit in units {
            let mut nuc = String::new();
            let mut pep = String::new();
            for name in ["GRM1_x", "At_x", "Os_x"] {
                nuc += &format!(">{name}\nATGAAATTT\n");
                pep += &format!(">{name}\nMKF\n");
            }
            std::fs::write(dir.join(format!("nuc/{unit}.fa")), nuc).unwrap();
            std::fs::write(dir.join(format!("pep/{unit}.fa")), pep).unwrap();
        }
    }

    struct Fixture {
        input: tempfile::TempDir,
        out: tempfile::TempDir,
        log: Arc<MemoryEventLog>,
    }

    impl Fixture {
        fn new(units: &[&str]) -> Self {
            let input = tempfile::tempdir().unwrap();
            write_inputs(input.path(), units);
            Fixture {
                input,
                out: tempfile::tempdir().unwrap(),
                log: Arc::new(MemoryEventLog::new()),
            }
        }

        fn orchestrator(&self, config: PipelineConfig, fail: &[(Tool, &'static str)]) -> Orchestrator {
            Orchestrator::new(
                config,
                self.log.clone(),
                fakes(fail),
                RunLayout::new(self.out.path()),
            )
        }

        fn request(&self) -> RunRequest {
            RunRequest {
                name: "grm".into(),
                input_dir: Some(self.input.path().to_path_buf()),
                ..Default::default()
            }
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            regex: Some("GRM1".into()),
            num_workers: 2,
            ..Default::default()
        }
    }

    fn ids(units: &[UnitId]) -> String {
        units.iter().map(UnitId::as_str).collect::<Vec<_>>().join(",")
    }

    fn statuses(log: &MemoryEventLog, run: &Run, unit: &str, phase: u32) -> Vec<PhaseStatus> {
        log.events_for(run.id, Some(&UnitId::from(unit)), Some(phase))
            .unwrap()
            .into_iter()
            .map(|e| e.event.status)
            .collect()
    }

    #[test]
    fn test_failure_is_isolated_and_resumable() {
        let fx = Fixture::new(&["OG0001", "OG0002"]);
        let orchestrator = fx.orchestrator(config(), &[(Tool::CodonMapper, "OG0002")]);
        let report = orchestrator.run(&fx.request()).unwrap();

        let summary: Vec<String> = report
            .phases
            .iter()
            .map(|p| {
                format!(
                    "{} ok={} failed={} blocked={}",
                    p.phase,
                    ids(&p.succeeded),
                    ids(&p.failed),
                    ids(&p.blocked)
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                "align ok=OG0001,OG0002 failed= blocked=",
                "codon_align ok=OG0001 failed=OG0002 blocked=",
                "tree ok=OG0001 failed= blocked=OG0002",
                "label ok=OG0001 failed= blocked=OG0002",
                "fit ok=OG0001 failed= blocked=OG0002",
            ]
        );
        assert_eq!(report.failed_units(), vec![&UnitId::from("OG0002")]);

        let run = report.run.clone();
        let log = &*fx.log;
        assert_eq!(
            state::resume_phase(log, run.id).unwrap(),
            ResumePoint::Phase(2)
        );
        assert!(state::in_flight(log, run.id).unwrap().is_empty());

        // GRM1_x has two ancestors, each labeled tree gets Ah1 and Ah0
        let og1 = orchestrator.layout().unit(&"OG0001".into());
        for name in ["OG0001.nwk.5", "OG0001.nwk.4", "OG0001.nwk.nl", "OG0001.nwk.5.Ah1", "OG0001.nwk.4.Ah0"] {
            assert!(og1.dir.join(name).is_file(), "{name}");
        }
        let controls = std::fs::read_dir(&og1.dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|x| x == "ctl")
            })
            .count();
        assert_eq!(controls, 4);

        // a crash left OG0002 running in phase 2; the next invocation closes it
        log.append(&PhaseEvent::now(run.id, Some("OG0002".into()), 2, PhaseStatus::Running))
            .unwrap();
        let orchestrator = fx.orchestrator(config(), &[]);
        let report = orchestrator.run(&fx.request()).unwrap();
        assert_eq!(report.phases[0].phase, Phase::CodonAlign);
        assert_eq!(report.phases[0].skipped, vec![UnitId::from("OG0001")]);
        assert_eq!(report.phases[0].succeeded, vec![UnitId::from("OG0002")]);
        assert!(report.failed_units().is_empty());
        use PhaseStatus::*;
        assert_eq!(
            statuses(log, &run, "OG0002", 2),
            vec![Running, Failed, Running, Failed, Running, Success]
        );
        assert_eq!(
            state::resume_phase(log, run.id).unwrap(),
            ResumePoint::Complete
        );

        // nothing left to do, and the run was never registered twice
        let report = orchestrator.run(&fx.request()).unwrap();
        assert!(report.phases.is_empty());
        assert_eq!(log.runs().unwrap().len(), 1);
        assert_eq!(log.units(run.id).unwrap().len(), 2);
        assert_eq!(statuses(log, &run, "OG0001", 0), vec![Success]);
    }

    #[test]
    fn test_explicit_start_and_forced_rerun() {
        let fx = Fixture::new(&["OG0001", "OG0002"]);
        let orchestrator = fx.orchestrator(config(), &[]);
        let report = orchestrator.run(&fx.request()).unwrap();
        assert!(report.failed_units().is_empty());
        let run = report.run.clone();
        let log = &*fx.log;
        let all = vec![UnitId::from("OG0001"), UnitId::from("OG0002")];
        use PhaseStatus::*;

        // an explicit start phase is honored, completed units are left alone
        let request = RunRequest {
            start: Some(Phase::Label),
            ..fx.request()
        };
        let report = orchestrator.run(&request).unwrap();
        let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
        assert_eq!(phases, vec![Phase::Label, Phase::Fit]);
        for phase in &report.phases {
            assert_eq!(phase.skipped, all);
            assert!(phase.succeeded.is_empty());
        }
        assert_eq!(statuses(log, &run, "OG0001", 4), vec![Running, Success]);

        // forcing redoes them and records new attempts
        let request = RunRequest {
            start: Some(Phase::Label),
            force: true,
            ..fx.request()
        };
        let report = orchestrator.run(&request).unwrap();
        assert_eq!(report.phases.len(), 2);
        for phase in &report.phases {
            assert_eq!(phase.succeeded, all);
            assert!(phase.skipped.is_empty());
        }
        for phase in [4, 5] {
            for unit in ["OG0001", "OG0002"] {
                assert_eq!(
                    statuses(log, &run, unit, phase),
                    vec![Running, Success, Running, Success]
                );
            }
        }
        assert_eq!(statuses(log, &run, "OG0001", 3), vec![Running, Success]);
        assert_eq!(
            state::resume_phase(log, run.id).unwrap(),
            ResumePoint::Complete
        );
    }

    #[test]
    fn test_tool_stderr_through_context() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("OG0001").join("RAxML_bestTree.OG0001");
        let fake = FakeTool {
            tool: Tool::TreeBuilder,
            fail: vec!["OG0001"],
        };
        let err = invoke_checked(&fake, &Invocation::new(["-n", "OG0001"]).outputs([out]))
            .unwrap_err();
        let err = anyhow::Error::from(err).context("building the tree");
        assert_eq!(tool_stderr(&err), Some("fake failure"));
        assert_eq!(tool_stderr(&anyhow::anyhow!("no pattern configured")), None);
    }

    #[test]
    fn test_pairing_error_registers_nothing() {
        let fx = Fixture::new(&["OG0001"]);
        std::fs::remove_file(fx.input.path().join("pep/OG0001.fa")).unwrap();
        let orchestrator = fx.orchestrator(config(), &[]);
        assert!(orchestrator.run(&fx.request()).is_err());
        assert!(fx.log.runs().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_run_needs_validation() {
        let fx = Fixture::new(&["OG0001"]);
        let orchestrator = fx.orchestrator(config(), &[]);
        let request = RunRequest {
            start: Some(Phase::Tree),
            ..fx.request()
        };
        assert!(orchestrator.run(&request).is_err());
        assert!(fx.log.runs().unwrap().is_empty());
    }

    #[test]
    fn test_short_alignment_is_rescued() {
        let fx = Fixture::new(&["OG0001"]);
        let config = PipelineConfig {
            min_codon_alignment_len: 12,
            ..config()
        };
        let report = fx.orchestrator(config.clone(), &[]).run(&fx.request()).unwrap();
        assert!(report.failed_units().is_empty());
        let og1 = RunLayout::new(fx.out.path()).unit(&"OG0001".into());
        assert!(og1.rescued_nuc().is_file());
        assert_eq!(paml_alignment_length(&og1.paml()).unwrap(), 18);

        // a unit that stays short after rescue fails the codon alignment phase
        let fx = Fixture::new(&["OG0001"]);
        let config = PipelineConfig {
            min_codon_alignment_len: 30,
            ..config
        };
        let report = fx.orchestrator(config, &[]).run(&fx.request()).unwrap();
        assert_eq!(report.phases[1].failed, vec![UnitId::from("OG0001")]);
    }

    #[test]
    fn test_missing_pattern_fails_label_phase() {
        let fx = Fixture::new(&["OG0001"]);
        let config = PipelineConfig {
            regex: None,
            ..config()
        };
        let report = fx.orchestrator(config, &[]).run(&fx.request()).unwrap();
        assert_eq!(report.phases[3].phase, Phase::Label);
        assert_eq!(report.phases[3].failed, vec![UnitId::from("OG0001")]);
    }
}
