//! pp_wrap
//!
//! Command line front end of the phasePAML pipeline.

pub mod run_cmd;
pub mod status_cmd;
pub mod tools_cmd;
pub mod utils;
