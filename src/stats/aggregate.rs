use super::distributions::two_tailed_critical_value;
use super::estimate::{check_alpha, margin_of_error};
use crate::error::{AnalyzerError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use strum::{Display, EnumIter, IntoEnumIterator};

pub const PREDICTED_COLUMN: &str = "Predicted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum Sentiment {
    Negative = -1,
    Neutral = 0,
    Positive = 1,
}

impl Sentiment {
    pub fn label(self) -> i8 {
        self as i8
    }

    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            -1 => Some(Self::Negative),
            0 => Some(Self::Neutral),
            1 => Some(Self::Positive),
            _ => None,
        }
    }

    fn index(self) -> usize {
        (self.label() + 1) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionRow {
    pub id: Option<i64>,
    pub sentiment: Sentiment,
}

/// Observed count per label, indexed Negative, Neutral, Positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SentimentCounts([u64; 3]);

impl SentimentCounts {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a PredictionRow>) -> Self {
        let mut counts = Self::default();
        for row in rows {
            counts.0[row.sentiment.index()] += 1;
        }
        counts
    }

    pub fn get(&self, sentiment: Sentiment) -> u64 {
        self.0[sentiment.index()]
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn as_array(&self) -> [u64; 3] {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelStats {
    pub sentiment: Sentiment,
    pub count: u64,
    pub probability: f64,
    pub margin_of_error: f64,
}

impl LabelStats {
    pub fn lower(&self) -> f64 {
        self.probability - self.margin_of_error
    }

    pub fn upper(&self) -> f64 {
        self.probability + self.margin_of_error
    }
}

/// Per-label estimates for one prediction file.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationStats {
    pub name: String,
    pub total: u64,
    pub alpha_level: f64,
    pub population: f64,
    labels: [LabelStats; 3],
}

impl PopulationStats {
    pub fn get(&self, sentiment: Sentiment) -> &LabelStats {
        &self.labels[sentiment.index()]
    }

    /// Labels in Negative, Neutral, Positive order.
    pub fn labels(&self) -> &[LabelStats] {
        &self.labels
    }
}

impl fmt::Display for PopulationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} (n={}, confidence={:.0}%)",
            self.name,
            self.total,
            (1.0 - self.alpha_level) * 100.0
        )?;
        writeln!(
            f,
            "{:<10} {:>8} {:>16} {:>16}",
            "sentiment", "count", "probability", "margin_of_error"
        )?;
        for stats in &self.labels {
            writeln!(
                f,
                "{:<10} {:>8} {:>16.6} {:>16.6}",
                stats.sentiment.to_string(),
                stats.count,
                stats.probability,
                stats.margin_of_error
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PredictionRecord {
    #[serde(rename = "Predicted")]
    predicted: i64,
    #[serde(alias = "Row", alias = "Id", alias = "id", default)]
    row: Option<i64>,
}

/// Read a classifier output file: a header row naming a `Predicted` column,
/// then one row per classified document. The row id is taken from a `Row`
/// or `id` column when there is one.
pub fn read_predictions(path: &Path) -> Result<Vec<PredictionRow>> {
    let malformed = |line: u64, reason: String| AnalyzerError::MalformedPrediction {
        path: path.to_path_buf(),
        line: line as usize,
        reason,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(AnalyzerError::EmptyPredictionFile(path.to_path_buf()));
    }
    if !headers.iter().any(|h| h == PREDICTED_COLUMN) {
        return Err(malformed(1, format!("no '{PREDICTED_COLUMN}' column in header")));
    }

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        let line = record.position().map_or(0, |p| p.line());
        let parsed: PredictionRecord = record
            .deserialize(Some(&headers))
            .map_err(|e| malformed(line, e.to_string()))?;
        let sentiment = Sentiment::from_label(parsed.predicted).ok_or_else(|| {
            malformed(line, format!("label {} not in {{-1, 0, 1}}", parsed.predicted))
        })?;
        rows.push(PredictionRow {
            id: parsed.row,
            sentiment,
        });
    }

    Ok(rows)
}

pub fn sentiment_counts(path: &Path) -> Result<SentimentCounts> {
    let rows = read_predictions(path)?;
    if rows.is_empty() {
        return Err(AnalyzerError::EmptyPredictionFile(path.to_path_buf()));
    }
    Ok(SentimentCounts::from_rows(&rows))
}

/// Per-label probabilities and margins of error, treating labels as drawn
/// from an unbounded population.
pub fn aggregate(path: &Path, alpha_level: f64) -> Result<PopulationStats> {
    aggregate_with_population(path, alpha_level, f64::INFINITY)
}

/// Like [`aggregate`], with the finite-population correction applied for a
/// subpopulation of the given size.
pub fn aggregate_with_population(
    path: &Path,
    alpha_level: f64,
    population: f64,
) -> Result<PopulationStats> {
    check_alpha(alpha_level)?;
    let counts = sentiment_counts(path)?;
    let total = counts.total();
    if population < total as f64 {
        return Err(AnalyzerError::invalid(format!(
            "subpopulation of {population} is smaller than the {total} predictions in {}",
            path.display()
        )));
    }

    let t = two_tailed_critical_value(alpha_level);
    let labels = Sentiment::iter()
        .map(|sentiment| {
            let count = counts.get(sentiment);
            let probability = count as f64 / total as f64;
            LabelStats {
                sentiment,
                count,
                probability,
                margin_of_error: margin_of_error(probability, total, population, t),
            }
        })
        .collect::<Vec<_>>();

    Ok(PopulationStats {
        name: dfname_from_path(path),
        total,
        alpha_level,
        population,
        labels: [labels[0], labels[1], labels[2]],
    })
}

/// Short series name for a prediction file: the file name up to the first
/// underscore, e.g. `python_comments_predictions.csv` -> `python`.
pub fn dfname_from_path(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name
        .split_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or_else(|| file_name.clone());
    stem.split('_').next().unwrap_or_default().to_string()
}
