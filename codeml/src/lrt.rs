//! Likelihood-ratio test between a null (H0) and an alternative (H1) fit.

use crate::result::FitResult;
use crate::{LrtError, MalformedFitError};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::path::Path;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum Significance {
    #[strum(to_string = "not significant")]
    NotSignificant,
    #[strum(to_string = "*")]
    P05,
    #[strum(to_string = "**")]
    P01,
    #[strum(to_string = "***")]
    P001,
}

impl Significance {
    pub fn from_p_value(p: f64) -> Self {
        if p < 0.001 {
            Significance::P001
        } else if p < 0.01 {
            Significance::P01
        } else if p < 0.05 {
            Significance::P05
        } else {
            Significance::NotSignificant
        }
    }

    pub fn stars(self) -> usize {
        match self {
            Significance::NotSignificant => 0,
            Significance::P05 => 1,
            Significance::P01 => 2,
            Significance::P001 => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LrtResult {
    pub statistic: f64,
    pub df: u32,
    pub p_value: f64,
    pub significance: Significance,
}

/// Compare two fits: `2 (lnL1 - lnL0)` against a chi-squared distribution
/// with `np1 - np0` degrees of freedom.
pub fn likelihood_ratio_test(h0: &FitResult, h1: &FitResult) -> Result<LrtResult, LrtError> {
    lrt_from_values(h0.lnl, h0.np, h1.lnl, h1.np)
}

pub fn lrt_from_values(lnl_h0: f64, np_h0: u32, lnl_h1: f64, np_h1: u32) -> Result<LrtResult, LrtError> {
    if np_h1 <= np_h0 {
        return Err(LrtError::NotNested { np_h0, np_h1 });
    }
    let df = np_h1 - np_h0;
    let statistic = 2.0 * (lnl_h1 - lnl_h0);
    let chi2 = ChiSquared::new(f64::from(df)).map_err(|e| LrtError::Distribution(e.to_string()))?;
    // a negative statistic means H1 fit worse than H0; its p-value is 1
    let p_value = 1.0 - chi2.cdf(statistic.max(0.0));
    Ok(LrtResult {
        statistic,
        df,
        p_value,
        significance: Significance::from_p_value(p_value),
    })
}

/// Read both result files and test them.
pub fn evaluate_files(
    h0: &Path,
    h1: &Path,
) -> Result<(FitResult, FitResult, LrtResult), LrtError> {
    let fit0 = FitResult::read(h0)?;
    let fit1 = FitResult::read(h1)?;
    let lrt = likelihood_ratio_test(&fit0, &fit1)?;
    Ok((fit0, fit1, lrt))
}

impl From<MalformedFitError> for LrtError {
    fn from(err: MalformedFitError) -> Self {
        LrtError::Malformed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::tests::result_text;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_two_stars() {
        let lrt = lrt_from_values(-100.0, 2, -95.0, 3).unwrap();
        assert_eq!(lrt.statistic, 10.0);
        assert_eq!(lrt.df, 1);
        assert!(lrt.p_value < 0.01 && lrt.p_value > 0.001, "{}", lrt.p_value);
        assert_eq!(lrt.significance, Significance::P01);
        assert_eq!(lrt.significance.to_string(), "**");
    }

    #[test]
    fn test_tiers() {
        assert_eq!(Significance::from_p_value(0.2), Significance::NotSignificant);
        assert_eq!(Significance::from_p_value(0.04), Significance::P05);
        assert_eq!(Significance::from_p_value(0.0099), Significance::P01);
        assert_eq!(Significance::from_p_value(0.0001), Significance::P001);
        assert_eq!(Significance::P001.stars(), 3);
        assert_eq!(Significance::NotSignificant.to_string(), "not significant");
    }

    #[test]
    fn test_worse_alternative() {
        let lrt = lrt_from_values(-95.0, 2, -100.0, 3).unwrap();
        assert_eq!(lrt.p_value, 1.0);
        assert_eq!(lrt.significance, Significance::NotSignificant);
        assert!(matches!(
            lrt_from_values(-95.0, 3, -90.0, 3),
            Err(LrtError::NotNested { .. })
        ));
    }

    #[test]
    fn test_evaluate_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let h0 = dir.path().join("OG1.nwk.5.Ah0");
        let h1 = dir.path().join("OG1.nwk.5.Ah1");
        std::fs::write(&h0, result_text(-1000.0, 10))?;
        std::fs::write(&h1, result_text(-990.0, 11))?;
        let (_, fit1, lrt) = evaluate_files(&h0, &h1)?;
        assert_eq!(lrt.statistic, 20.0);
        assert_eq!(lrt.significance, Significance::P001);
        assert_eq!(fit1.beb.len(), 2);

        std::fs::write(&h1, "no likelihood here")?;
        assert!(matches!(
            evaluate_files(&h0, &h1),
            Err(LrtError::Malformed(MalformedFitError::MissingLikelihood { .. }))
        ));
        Ok(())
    }
}
