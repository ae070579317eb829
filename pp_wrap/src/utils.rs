use anyhow::{bail, ensure, Result};
use chrono::Local;
use itertools::Itertools;
use log::LevelFilter;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Convert an io::error to a string and strip "(os error 4)" from the end.
fn io_error_to_string(err: &std::io::Error) -> String {
    let s = err.to_string();
    s.strip_suffix(&format!(" (os error {})", err.raw_os_error().unwrap_or(0)))
        .unwrap_or(&s)
        .to_string()
}

/// Print an error chain.
pub fn print_error_chain(err: &anyhow::Error) {
    let error_chain = err.chain().join("\n\tCaused by: ");
    if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
        let io_err_str = io_error_to_string(io_err);
        match err.chain().len() {
            1 => eprintln!("ERROR: {io_err_str}"),
            2 => eprintln!("ERROR: {io_err_str}: {err}"),
            _ => eprintln!("ERROR: {error_chain}"),
        };
    } else {
        eprintln!("ERROR: {error_chain}");
    };
}

/// Install the logger: `2024-01-31T12:00:00 [INFO] - message` on stderr,
/// `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

/// Parse and validate an identifier, for use with Clap's value_parser.
/// A valid identifier contains only letters, digits, underscores, and dashes.
pub fn validate_ascii_identifier(id: &str) -> Result<String> {
    ensure!(
        id.chars()
            .all(|c| matches!(c, '0'..='9' | 'A'..='Z' | 'a'..='z' | '_' | '-')),
        "must contain only letters, digits, underscores, and dashes."
    );
    Ok(String::from(id))
}

/// Max allowed length of a run name.
const MAX_NAME_LEN: usize = 64;

/// Parse and validate the --name argument, for use with Clap's value_parser.
pub fn validate_run_name(name: &str) -> Result<String> {
    ensure!(!name.is_empty(), "The run name must not be empty.");
    ensure!(
        name.len() <= MAX_NAME_LEN,
        "The run name must be {MAX_NAME_LEN} characters or less."
    );
    validate_ascii_identifier(name)
}

/// Parse a phase given by number (`2`) or by name (`codon_align`).
pub fn parse_phase(s: &str) -> Result<pp_types::Phase> {
    if let Ok(number) = s.parse::<u32>() {
        match pp_types::Phase::from_number(number) {
            Some(phase) => return Ok(phase),
            None => bail!("phase must be between 0 and {}", pp_types::Phase::LAST.number()),
        }
    }
    match s.parse() {
        Ok(phase) => Ok(phase),
        Err(_) => bail!(
            "unknown phase '{s}', expected a number or one of: {}",
            pp_types::Phase::ALL.iter().join(", ")
        ),
    }
}

/// `path` made absolute against the working directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::env::current_dir()?.join(path))
}
