use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("tag '{tag}' not part of considered tags: {vocabulary:?}")]
    UnsupportedTag { tag: String, vocabulary: Vec<String> },

    #[error("query returned no results (model: {model}, post type: {post_type}, tag: {tag})")]
    EmptyPopulation {
        model: String,
        post_type: String,
        tag: String,
    },

    #[error("cannot draw {requested} elements from a population of {available}")]
    InsufficientPopulation { requested: usize, available: usize },

    #[error("prediction file {} has no data rows", .0.display())]
    EmptyPredictionFile(PathBuf),

    #[error("no subpopulation weight for key '{0}'")]
    MissingWeight(String),

    #[error("{}:{line}: {reason}", path.display())]
    MalformedPrediction {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("migration error: {0}")]
    Migration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plot error: {0}")]
    Plot(String),
}

impl AnalyzerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}
