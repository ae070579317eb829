//! pp_lib
//!
//! Runs the phases of the pipeline over every unit of a run: validation and
//! staging, peptide alignment, codon alignment, tree inference, labeling and
//! model fitting. External tools sit behind [`adapter::Adapter`]; progress is
//! recorded in a [`phase_log::EventLog`].

pub mod adapter;
pub mod config;
pub mod layout;
pub mod orchestrator;
mod stage;
mod steps;

pub use adapter::{Adapter, AdapterFailure, AdapterOutput, AdapterSet, Invocation, Tool};
pub use config::{PipelineConfig, ToolPaths};
pub use layout::{RunLayout, UnitPaths};
pub use orchestrator::{Orchestrator, PhaseReport, RunReport, RunRequest};
