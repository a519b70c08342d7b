use super::aggregate::{dfname_from_path, sentiment_counts};
use super::distributions::chi_squared_survival;
use crate::error::{AnalyzerError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Subpopulation sizes keyed by prediction file name prefix, e.g.
/// `{"javascript": 200, "c": 100}` for `javascript_*.csv` and `c_*.csv`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct PopulationWeights(HashMap<String, f64>);

impl PopulationWeights {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Subpopulation size for `key`. Sizes must be positive and finite.
    pub fn get(&self, key: &str) -> Result<f64> {
        let weight = self
            .0
            .get(key)
            .copied()
            .ok_or_else(|| AnalyzerError::MissingWeight(key.to_string()))?;
        if !(weight.is_finite() && weight > 0.0) {
            return Err(AnalyzerError::invalid(format!(
                "population size for {key} must be positive, got {weight}"
            )));
        }
        Ok(weight)
    }

    /// Subpopulation for a prediction file, looked up by its name prefix.
    pub fn for_file(&self, path: &Path) -> Result<f64> {
        self.get(&dfname_from_path(path))
    }
}

impl FromIterator<(String, f64)> for PopulationWeights {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChiSquaredOutcome {
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
    /// True when homogeneity is not rejected at the requested confidence,
    /// i.e. the samples look drawn from the same label distribution.
    pub not_rejected: bool,
}

/// Chi-squared test over the label counts of several prediction files.
///
/// With `weights`, each file's counts are rescaled to sum to its
/// subpopulation size before the test.
pub fn chi_squared_test(
    prediction_files: &[PathBuf],
    confidence_level: f64,
    weights: Option<&PopulationWeights>,
) -> Result<ChiSquaredOutcome> {
    if prediction_files.len() < 2 {
        return Err(AnalyzerError::invalid(format!(
            "need at least 2 prediction files, got {}",
            prediction_files.len()
        )));
    }
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(AnalyzerError::invalid(format!(
            "confidence level must be in (0, 1), got {confidence_level}"
        )));
    }

    let mut table = Vec::with_capacity(prediction_files.len());
    for path in prediction_files {
        let counts = sentiment_counts(path)?;
        let observed = counts.as_array().map(|c| c as f64);
        let row = match weights {
            Some(weights) => {
                let scale = weights.for_file(path)? / counts.total() as f64;
                observed.map(|c| c * scale)
            }
            None => observed,
        };
        table.push(row.to_vec());
    }

    let (statistic, degrees_of_freedom) = contingency_statistic(&table);
    let p_value = chi_squared_survival(statistic, degrees_of_freedom);
    debug!("chi2={statistic} df={degrees_of_freedom} p={p_value}");

    Ok(ChiSquaredOutcome {
        statistic,
        degrees_of_freedom,
        p_value,
        not_rejected: p_value > 1.0 - confidence_level,
    })
}

/// Whether the prediction files are statistically indistinguishable at the
/// given confidence level. Identical inputs always yield `true`.
pub fn independent(
    prediction_files: &[PathBuf],
    confidence_level: f64,
    weights: Option<&PopulationWeights>,
) -> Result<bool> {
    Ok(chi_squared_test(prediction_files, confidence_level, weights)?.not_rejected)
}

/// Pearson statistic and degrees of freedom of a rows x labels table.
/// Label columns that are empty in every row carry no information and are
/// dropped.
fn contingency_statistic(table: &[Vec<f64>]) -> (f64, usize) {
    let width = table.first().map_or(0, Vec::len);
    let columns: Vec<usize> = (0..width)
        .filter(|&j| table.iter().any(|row| row[j] > 0.0))
        .collect();

    let row_totals: Vec<f64> = table
        .iter()
        .map(|row| columns.iter().map(|&j| row[j]).sum())
        .collect();
    let column_totals: Vec<f64> = columns
        .iter()
        .map(|&j| table.iter().map(|row| row[j]).sum())
        .collect();
    let grand_total: f64 = row_totals.iter().sum();

    let mut statistic = 0.0;
    for (row, row_total) in table.iter().zip(&row_totals) {
        for (&j, column_total) in columns.iter().zip(&column_totals) {
            let expected = row_total * column_total / grand_total;
            statistic += (row[j] - expected).powi(2) / expected;
        }
    }

    let df = (table.len() - 1) * columns.len().saturating_sub(1);
    (statistic, df)
}
