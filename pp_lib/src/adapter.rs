//! External tools behind one invocation contract.
//!
//! An invocation names its input and output artifacts. It succeeds when the
//! tool exits with status zero and every declared output exists afterwards.

use crate::config::ToolPaths;
use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use strum_macros::Display;
use thiserror::Error;

/// The external tools of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Tool {
    Aligner,
    CodonMapper,
    TreeBuilder,
    ModelFitter,
    Rescuer,
}

/// One call of an external tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    /// Working directory of the process.
    pub cwd: Option<PathBuf>,
    /// File receiving the captured standard output.
    pub stdout_to: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn inputs(mut self, inputs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn outputs(mut self, outputs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    pub fn cwd(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn stdout_to(mut self, path: &Path) -> Self {
        self.stdout_to = Some(path.to_path_buf());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))?;
        if let Some(out) = &self.stdout_to {
            write!(f, " > {}", out.display())?;
        }
        Ok(())
    }
}

/// What a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterOutput {
    /// `-1` when the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum AdapterFailure {
    #[error("{tool}: input {} does not exist", path.display())]
    MissingInput { tool: Tool, path: PathBuf },

    #[error("{tool}: cannot run {}", program.display())]
    Spawn {
        tool: Tool,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool}: exit code {exit_code}: {}", last_line(stderr))]
    ExitCode {
        tool: Tool,
        exit_code: i32,
        stderr: String,
    },

    #[error("{tool}: expected output {} was not written", path.display())]
    MissingOutput { tool: Tool, path: PathBuf },

    #[error("{tool}: cannot remove stale output {}", path.display())]
    StaleOutput {
        tool: Tool,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool}: cannot save standard output to {}", path.display())]
    Stdout {
        tool: Tool,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AdapterFailure {
    /// Everything the tool wrote to stderr before exiting with an error.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            AdapterFailure::ExitCode { stderr, .. } if !stderr.trim().is_empty() => {
                Some(stderr.trim_end())
            }
            _ => None,
        }
    }
}

fn last_line(text: &str) -> &str {
    text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("")
}

/// Capability to run one external tool.
pub trait Adapter: Send + Sync {
    fn tool(&self) -> Tool;

    /// Run the tool. A non-zero exit code is reported in the output, not as
    /// an error.
    fn invoke(&self, invocation: &Invocation) -> Result<AdapterOutput, AdapterFailure>;
}

/// Invoke `adapter` and hold it to the contract: exit code zero and every
/// declared output present. Outputs left by an earlier attempt are removed
/// first.
pub fn invoke_checked(
    adapter: &dyn Adapter,
    invocation: &Invocation,
) -> Result<AdapterOutput, AdapterFailure> {
    let tool = adapter.tool();
    if let Some(path) = invocation.inputs.iter().find(|p| !p.exists()) {
        return Err(AdapterFailure::MissingInput {
            tool,
            path: path.clone(),
        });
    }
    for path in invocation.outputs.iter().filter(|p| p.exists()) {
        std::fs::remove_file(path).map_err(|source| AdapterFailure::StaleOutput {
            tool,
            path: path.clone(),
            source,
        })?;
    }
    debug!("{tool}: {invocation}");
    let output = adapter.invoke(invocation)?;
    if output.exit_code != 0 {
        return Err(AdapterFailure::ExitCode {
            tool,
            exit_code: output.exit_code,
            stderr: output.stderr,
        });
    }
    if let Some(path) = invocation.outputs.iter().find(|p| !p.exists()) {
        return Err(AdapterFailure::MissingOutput {
            tool,
            path: path.clone(),
        });
    }
    Ok(output)
}

/// Runs an executable as a child process and waits for it.
#[derive(Debug, Clone)]
pub struct ProcessAdapter {
    tool: Tool,
    program: PathBuf,
}

impl ProcessAdapter {
    pub fn new(tool: Tool, program: impl Into<PathBuf>) -> Self {
        ProcessAdapter {
            tool,
            program: program.into(),
        }
    }
}

impl Adapter for ProcessAdapter {
    fn tool(&self) -> Tool {
        self.tool
    }

    fn invoke(&self, invocation: &Invocation) -> Result<AdapterOutput, AdapterFailure> {
        let mut command = Command::new(&self.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }
        let output = command.output().map_err(|source| AdapterFailure::Spawn {
            tool: self.tool,
            program: self.program.clone(),
            source,
        })?;
        if let Some(path) = &invocation.stdout_to {
            std::fs::write(path, &output.stdout).map_err(|source| AdapterFailure::Stdout {
                tool: self.tool,
                path: path.clone(),
                source,
            })?;
        }
        Ok(AdapterOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// One adapter per external tool.
#[derive(Clone)]
pub struct AdapterSet {
    pub aligner: Arc<dyn Adapter>,
    pub codon_mapper: Arc<dyn Adapter>,
    pub tree_builder: Arc<dyn Adapter>,
    pub model_fitter: Arc<dyn Adapter>,
    pub rescuer: Arc<dyn Adapter>,
}

impl AdapterSet {
    /// Process adapters for the configured executables.
    pub fn from_tools(tools: &ToolPaths) -> Self {
        AdapterSet {
            aligner: Arc::new(ProcessAdapter::new(Tool::Aligner, &tools.prank)),
            codon_mapper: Arc::new(ProcessAdapter::new(Tool::CodonMapper, &tools.pal2nal)),
            tree_builder: Arc::new(ProcessAdapter::new(Tool::TreeBuilder, &tools.raxml)),
            model_fitter: Arc::new(ProcessAdapter::new(Tool::ModelFitter, &tools.codeml)),
            rescuer: Arc::new(ProcessAdapter::new(Tool::Rescuer, &tools.rescue)),
        }
    }
}
