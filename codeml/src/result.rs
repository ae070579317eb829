//! Parsing of codeml result files.

use crate::MalformedFitError;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::path::Path;

lazy_static! {
    // lnL(ntime: 47  np: 51): -23761.923333      +0.000000
    static ref LNL: Regex = Regex::new(
        r"lnL\(ntime:[ \t]*([0-9]+)[ \t]+np:[ \t]*([0-9]+)\):[ \t]*(-?[0-9]+(?:\.[0-9]*)?)"
    )
    .unwrap();
    static ref KAPPA: Regex = Regex::new(r"kappa \(ts/tv\)[ \t]*=[ \t]*([0-9.]+)").unwrap();
    static ref TREE_LENGTH: Regex = Regex::new(r"tree length[ \t]*=[ \t]*([0-9.]+)").unwrap();
}

/// A site reported under an empirical Bayes analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct PositiveSite {
    /// 1-based alignment position.
    pub position: usize,
    pub residue: String,
    /// Posterior probability of belonging to the omega > 1 class.
    pub probability: f64,
    /// Number of `*` codeml printed next to the probability.
    pub stars: usize,
}

impl PositiveSite {
    pub fn significance(&self) -> &'static str {
        match self.stars {
            0 => "not significant",
            1 => "*",
            _ => "**",
        }
    }
}

impl fmt::Display for PositiveSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.position,
            self.residue,
            self.probability,
            self.significance()
        )
    }
}

/// The parts of a codeml result used downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub lnl: f64,
    pub np: u32,
    pub ntime: u32,
    pub kappa: Option<f64>,
    pub tree_length: Option<f64>,
    /// Naive Empirical Bayes sites.
    pub neb: Vec<PositiveSite>,
    /// Bayes Empirical Bayes sites.
    pub beb: Vec<PositiveSite>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Neb,
    Beb,
}

fn parse_site(line: &str) -> Option<PositiveSite> {
    let mut fields = line.split_whitespace();
    let position = fields.next()?.parse().ok()?;
    let residue = fields.next()?.to_string();
    let prob = fields.next()?;
    let stars = prob.matches('*').count();
    let probability = prob.trim_end_matches('*').parse().ok()?;
    Some(PositiveSite {
        position,
        residue,
        probability,
        stars,
    })
}

impl FitResult {
    pub fn read(path: &Path) -> Result<FitResult, MalformedFitError> {
        let text = std::fs::read_to_string(path).map_err(|source| MalformedFitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        FitResult::parse(&text).ok_or_else(|| MalformedFitError::MissingLikelihood {
            path: path.to_path_buf(),
        })
    }

    /// Parse a result text. Returns `None` without a complete `lnL` line.
    pub fn parse(text: &str) -> Option<FitResult> {
        let caps = LNL.captures(text)?;
        let ntime = caps[1].parse().ok()?;
        let np = caps[2].parse().ok()?;
        let lnl = caps[3].parse().ok()?;
        let kappa = KAPPA.captures(text).and_then(|c| c[1].parse().ok());
        let tree_length = TREE_LENGTH.captures(text).and_then(|c| c[1].parse().ok());

        let mut neb = Vec::new();
        let mut beb = Vec::new();
        let mut section = Section::None;
        for line in text.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("Naive Empirical Bayes") {
                section = Section::Neb;
            } else if trimmed.starts_with("Bayes Empirical Bayes") {
                section = Section::Beb;
            } else if trimmed.starts_with("The grid") {
                section = Section::None;
            } else if let Some(site) = parse_site(trimmed) {
                match section {
                    Section::Neb => neb.push(site),
                    Section::Beb => beb.push(site),
                    Section::None => {}
                }
            }
        }
        Some(FitResult {
            lnl,
            np,
            ntime,
            kappa,
            tree_length,
            neb,
            beb,
        })
    }
}
