use super::distributions::two_tailed_critical_value;
use crate::error::{AnalyzerError, Result};

pub const DEFAULT_ALPHA_LEVEL: f64 = 0.05;
pub const DEFAULT_MARGIN_OF_ERROR: f64 = 0.01;

/// Worst-case proportion, maximizes p(1 - p).
const CONSERVATIVE_PROPORTION: f64 = 0.5;

/// Above this sampling fraction the finite-population correction kicks in.
const FINITE_CORRECTION_FRACTION: f64 = 0.05;

/// Sample size needed to estimate a proportion in a population of the given
/// size within `accepted_margin_of_error` at confidence `1 - alpha_level`.
///
/// The result is always in `1..=population`.
pub fn sample_size(population: u64, alpha_level: f64, accepted_margin_of_error: f64) -> Result<u64> {
    if population == 0 {
        return Err(AnalyzerError::invalid("population must be positive"));
    }
    check_alpha(alpha_level)?;
    if !(accepted_margin_of_error > 0.0 && accepted_margin_of_error < 1.0) {
        return Err(AnalyzerError::invalid(format!(
            "margin of error must be in (0, 1), got {accepted_margin_of_error}"
        )));
    }

    let t = two_tailed_critical_value(alpha_level);
    let p = CONSERVATIVE_PROPORTION;
    let n0 = t * t * p * (1.0 - p) / (accepted_margin_of_error * accepted_margin_of_error);

    let population_f = population as f64;
    let n = if n0 / population_f > FINITE_CORRECTION_FRACTION {
        n0 / (1.0 + (n0 - 1.0) / population_f)
    } else {
        n0
    };

    Ok((n.ceil() as u64).clamp(1, population))
}

/// Margin of error of a proportion `p` estimated from `n` observations out of
/// a population of size `population` (which may be `f64::INFINITY`), at
/// critical value `t`.
///
/// Uses the unbiased standard error, the `1 - n/N` finite-population factor
/// and a `1/(2n)` continuity correction. Fewer than two observations carry
/// no spread estimate, so the margin is infinite.
pub fn margin_of_error(p: f64, n: u64, population: f64, t: f64) -> f64 {
    if n < 2 {
        return f64::INFINITY;
    }
    let n = n as f64;
    let finite_correction = 1.0 - n / population;
    t * (p * (1.0 - p) / (n - 1.0) * finite_correction).sqrt() + 0.5 / n
}

pub(crate) fn check_alpha(alpha_level: f64) -> Result<()> {
    if alpha_level > 0.0 && alpha_level < 1.0 {
        Ok(())
    } else {
        Err(AnalyzerError::invalid(format!(
            "alpha level must be in (0, 1), got {alpha_level}"
        )))
    }
}
