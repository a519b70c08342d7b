use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

static SETTINGS: OnceLock<Settings> = OnceLock::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: Database,
    pub sampling: Sampling,
    pub ingest: Ingest,
    pub classify: Classify,
    pub plot: Plot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sampling {
    pub alpha_level: f64,
    pub margin_of_error: f64,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingest {
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classify {
    pub rows_per_file: usize,
    pub script_path: String,
    pub directory_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plot {
    pub width: u32,
    pub height: u32,
    pub bar_width: f64,
    pub alpha_level: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: Database {
                url: "analyzer.db".to_string(),
                pool_size: 5,
            },
            sampling: Sampling {
                alpha_level: 0.05,
                margin_of_error: 0.01,
                languages: vec![
                    "javascript".into(),
                    "c".into(),
                    "c++".into(),
                    "sql".into(),
                    "python".into(),
                    "php".into(),
                    "java".into(),
                    "c#".into(),
                ],
            },
            ingest: Ingest { batch_size: 1000 },
            classify: Classify {
                rows_per_file: 1000,
                script_path: "ClassificationTask/classificationTask.sh".to_string(),
                directory_marker: "senti4sd".to_string(),
            },
            plot: Plot {
                width: 1024,
                height: 768,
                bar_width: 0.5,
                alpha_level: 0.05,
            },
        }
    }
}

impl Settings {
    pub fn load() -> &'static Settings {
        SETTINGS.get_or_init(Self::load_from_files)
    }

    fn load_from_files() -> Settings {
        let default_path = Path::new("settings.default.ron");
        let override_path = Path::new("settings.ron");

        let mut settings = if default_path.exists() {
            fs::read_to_string(default_path)
                .ok()
                .and_then(|content| ron::from_str(&content).ok())
                .unwrap_or_default()
        } else {
            Settings::default()
        };

        if override_path.exists() {
            match fs::read_to_string(override_path)
                .map_err(|e| e.to_string())
                .and_then(|content| ron::from_str::<Settings>(&content).map_err(|e| e.to_string()))
            {
                Ok(overrides) => settings = overrides,
                Err(e) => tracing::warn!("ignoring {}: {e}", override_path.display()),
            }
        }

        settings
    }
}

pub fn settings() -> &'static Settings {
    Settings::load()
}
