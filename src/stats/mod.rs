pub mod aggregate;
pub mod distributions;
pub mod estimate;
pub mod independence;
pub mod plot;

pub use aggregate::{
    aggregate, aggregate_with_population, dfname_from_path, read_predictions, sentiment_counts,
    LabelStats, PopulationStats, PredictionRow, Sentiment, SentimentCounts,
};
pub use distributions::{chi_squared_survival, normal_quantile, two_tailed_critical_value};
pub use estimate::{margin_of_error, sample_size, DEFAULT_ALPHA_LEVEL, DEFAULT_MARGIN_OF_ERROR};
pub use independence::{chi_squared_test, independent, ChiSquaredOutcome, PopulationWeights};
pub use plot::{render, PlotOptions};
