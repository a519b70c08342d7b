pub mod classify;
pub mod db;
pub mod error;
pub mod migrate;
pub mod sampling;
pub mod sanitize;
pub mod schema;
pub mod settings;
pub mod stats;
pub mod utils;

pub use error::{AnalyzerError, Result};
