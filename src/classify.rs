use crate::error::{AnalyzerError, Result};
use crate::utils::{log_classifiers_found, log_classify_failed, log_classify_progress, log_concatenating};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    /// Maximum rows per subfile handed to one classifier run.
    pub rows_per_file: usize,
    /// Script location relative to each classifier directory.
    pub script_path: PathBuf,
    /// Classifier directories are the ones whose name contains this marker.
    pub directory_marker: String,
}

impl ClassifyOptions {
    pub fn from_settings() -> Self {
        let s = &crate::settings::settings().classify;
        Self {
            rows_per_file: s.rows_per_file,
            script_path: PathBuf::from(&s.script_path),
            directory_marker: s.directory_marker.clone(),
        }
    }
}

/// One copy of the external classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    pub script: PathBuf,
}

impl Classifier {
    fn workdir(&self) -> &Path {
        self.script.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Classifier copies directly under `pool_root`, sorted by path.
pub fn find_classifiers(pool_root: &Path, options: &ClassifyOptions) -> Result<Vec<Classifier>> {
    let marker = options.directory_marker.to_lowercase();
    let mut classifiers = Vec::new();
    for entry in fs::read_dir(pool_root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.contains(&marker) && entry.file_type()?.is_dir() {
            classifiers.push(Classifier {
                script: entry.path().join(&options.script_path),
            });
        }
    }
    if classifiers.is_empty() {
        return Err(AnalyzerError::Classification(format!(
            "no classifiers found in {}",
            pool_root.display()
        )));
    }
    classifiers.sort_by(|a, b| a.script.cmp(&b.script));
    Ok(classifiers)
}

/// Split `input` into files of at most `rows_per_file` lines inside `dir`.
pub fn split_file(rows_per_file: usize, input: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    if rows_per_file == 0 {
        return Err(AnalyzerError::invalid("at least 1 row per file is required"));
    }

    let mut parts = Vec::new();
    let mut writer: Option<BufWriter<File>> = None;
    let mut rows = 0;
    for line in BufReader::new(File::open(input)?).lines() {
        let line = line?;
        if rows % rows_per_file == 0 {
            if let Some(mut done) = writer.take() {
                done.flush()?;
            }
            let path = dir.join(format!("part_{:05}.csv", parts.len()));
            writer = Some(BufWriter::new(File::create(&path)?));
            parts.push(path);
        }
        if let Some(w) = writer.as_mut() {
            writeln!(w, "{line}")?;
        }
        rows += 1;
    }
    if let Some(mut done) = writer {
        done.flush()?;
    }
    Ok(parts)
}

/// Join partial prediction files into `output`, keeping only the header of
/// the first one.
pub fn concatenate_predictions(parts: &[PathBuf], output: &Path) -> Result<()> {
    if parts.is_empty() {
        return Err(AnalyzerError::invalid("no partial predictions to concatenate"));
    }
    log_concatenating(parts.len(), output);

    let mut writer = csv::Writer::from_path(output)?;
    for (i, part) in parts.iter().enumerate() {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(part)?;
        if i == 0 {
            writer.write_record(reader.headers()?)?;
        }
        for record in reader.records() {
            writer.write_record(&record?)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Classify every row of `input` and write the predictions to `output`.
///
/// The input is split into subfiles which are classified in waves of one
/// subfile per classifier. A wave always runs to completion; if any of its
/// tasks failed, all failures are reported together and no further wave is
/// started.
pub async fn classify_sentiment(
    input: &Path,
    output: &Path,
    pool_root: &Path,
    options: &ClassifyOptions,
) -> Result<()> {
    if options.rows_per_file == 0 {
        return Err(AnalyzerError::invalid("at least 1 row per file is required"));
    }
    if !input.is_file() {
        return Err(AnalyzerError::invalid(format!(
            "file {} does not exist",
            input.display()
        )));
    }
    let input = fs::canonicalize(input)?;
    let classifiers = find_classifiers(pool_root, options)?;
    log_classifiers_found(&classifiers);

    let workdir = tempfile::tempdir()?;
    let sources = split_file(options.rows_per_file, &input, workdir.path())?;
    if sources.is_empty() {
        return Err(AnalyzerError::invalid(format!("{} has no rows", input.display())));
    }
    let jobs: Vec<(PathBuf, PathBuf)> = sources
        .iter()
        .map(|src| (src.clone(), src.with_extension("predictions.csv")))
        .collect();

    let mut classified = 0;
    for wave in jobs.chunks(classifiers.len()) {
        let mut tasks = JoinSet::new();
        for (classifier, (src, dst)) in classifiers.iter().zip(wave) {
            tasks.spawn(run_classifier(classifier.clone(), src.clone(), dst.clone()));
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(e.to_string()),
                Err(e) => failures.push(format!("classifier task aborted: {e}")),
            }
        }
        if !failures.is_empty() {
            for failure in &failures {
                log_classify_failed(failure);
            }
            return Err(AnalyzerError::Classification(failures.join("; ")));
        }

        classified += wave.len();
        log_classify_progress(classified, jobs.len());
    }

    let outputs: Vec<PathBuf> = jobs.into_iter().map(|(_, dst)| dst).collect();
    concatenate_predictions(&outputs, output)
}

async fn run_classifier(classifier: Classifier, input: PathBuf, output: PathBuf) -> Result<()> {
    let script_name = classifier
        .script
        .file_name()
        .ok_or_else(|| AnalyzerError::invalid("classifier script has no file name"))?;
    let out_name = output
        .file_name()
        .ok_or_else(|| AnalyzerError::invalid("prediction file has no file name"))?;
    let workdir = classifier.workdir();
    debug!("running {} on {}", classifier.script.display(), input.display());

    // the script must run from its own directory
    let status = Command::new("bash")
        .arg(script_name)
        .arg(&input)
        .arg(out_name)
        .current_dir(workdir)
        .status()
        .await?;
    if !status.success() {
        error!("{} exited with {status}", classifier.script.display());
        return Err(AnalyzerError::Classification(format!(
            "classifying {} failed ({status})",
            input.display()
        )));
    }

    let produced = workdir.join(out_name);
    if tokio::fs::rename(&produced, &output).await.is_err() {
        tokio::fs::copy(&produced, &output).await?;
        tokio::fs::remove_file(&produced).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FAKE_CLASSIFIER: &str = r#"#!/bin/bash
{
  echo "Row,Predicted"
  n=0
  while IFS= read -r line; do
    n=$((n + 1))
    echo "$n,$(( ${#line} % 3 - 1 ))"
  done < "$1"
} > "$2"
"#;

    fn options(rows_per_file: usize) -> ClassifyOptions {
        ClassifyOptions {
            rows_per_file,
            script_path: PathBuf::from("ClassificationTask/classificationTask.sh"),
            directory_marker: "senti4sd".to_string(),
        }
    }

    fn install_classifier(pool: &Path, name: &str, body: &str) {
        let dir = pool.join(name).join("ClassificationTask");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("classificationTask.sh"), body).unwrap();
    }

    fn write_rows(dir: &TempDir, rows: usize) -> PathBuf {
        let path = dir.path().join("sample.csv");
        let text: String = (0..rows).map(|i| format!("document number {i}\n")).collect();
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_split_file_uneven() {
        let dir = TempDir::new().unwrap();
        let input = write_rows(&dir, 5);
        let parts_dir = dir.path().join("parts");
        fs::create_dir(&parts_dir).unwrap();

        let parts = split_file(2, &input, &parts_dir).unwrap();

        assert_eq!(parts.len(), 3);
        let lines: Vec<usize> = parts
            .iter()
            .map(|p| fs::read_to_string(p).unwrap().lines().count())
            .collect();
        assert_eq!(lines, vec![2, 2, 1]);
        assert_eq!(fs::read_to_string(&parts[2]).unwrap(), "document number 4\n");
    }

    #[test]
    fn test_split_file_rejects_zero_rows() {
        let dir = TempDir::new().unwrap();
        let input = write_rows(&dir, 1);
        assert!(matches!(
            split_file(0, &input, dir.path()),
            Err(AnalyzerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_concatenate_keeps_first_header_only() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, "Row,Predicted\n1,0\n2,1\n").unwrap();
        fs::write(&b, "Row,Predicted\n1,-1\n").unwrap();
        let out = dir.path().join("out.csv");

        concatenate_predictions(&[a, b], &out).unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "Row,Predicted\n1,0\n2,1\n1,-1\n");
    }

    #[test]
    fn test_concatenate_skips_quoted_headers() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, "Row,Predicted\n1,0\n").unwrap();
        fs::write(&b, "\"Row\",\"Predicted\"\n\"2\",\"1\"\n").unwrap();
        let out = dir.path().join("out.csv");

        concatenate_predictions(&[a, b], &out).unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "Row,Predicted\n1,0\n2,1\n");
    }

    #[test]
    fn test_find_classifiers_by_marker() {
        let pool = TempDir::new().unwrap();
        install_classifier(pool.path(), "Senti4SD-1", FAKE_CLASSIFIER);
        install_classifier(pool.path(), "senti4sd_2", FAKE_CLASSIFIER);
        fs::create_dir(pool.path().join("other")).unwrap();
        fs::write(pool.path().join("senti4sd.txt"), "not a directory").unwrap();

        let found = find_classifiers(pool.path(), &options(10)).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].script.ends_with("Senti4SD-1/ClassificationTask/classificationTask.sh"));

        let empty = TempDir::new().unwrap();
        assert!(matches!(
            find_classifiers(empty.path(), &options(10)),
            Err(AnalyzerError::Classification(_))
        ));
    }

    #[tokio::test]
    async fn test_classify_in_several_waves() {
        let pool = TempDir::new().unwrap();
        install_classifier(pool.path(), "senti4sd-a", FAKE_CLASSIFIER);
        install_classifier(pool.path(), "senti4sd-b", FAKE_CLASSIFIER);
        let dir = TempDir::new().unwrap();
        let input = write_rows(&dir, 7);
        let output = dir.path().join("predictions.csv");

        classify_sentiment(&input, &output, pool.path(), &options(2)).await.unwrap();

        let content = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Row,Predicted");
        assert_eq!(lines.len(), 8);
        assert_eq!(lines.iter().filter(|l| l.contains("Predicted")).count(), 1);
        let predictions = crate::stats::read_predictions(&output).unwrap();
        assert_eq!(predictions.len(), 7);
    }

    #[tokio::test]
    async fn test_classify_fails_the_wave() {
        let pool = TempDir::new().unwrap();
        install_classifier(pool.path(), "senti4sd-ok", FAKE_CLASSIFIER);
        install_classifier(pool.path(), "senti4sd-broken", "#!/bin/bash\nexit 3\n");
        let dir = TempDir::new().unwrap();
        let input = write_rows(&dir, 4);
        let output = dir.path().join("predictions.csv");

        let result = classify_sentiment(&input, &output, pool.path(), &options(1)).await;

        assert!(matches!(result, Err(AnalyzerError::Classification(_))));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_classify_validates_arguments() {
        let pool = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let input = write_rows(&dir, 2);
        let output = dir.path().join("out.csv");

        assert!(matches!(
            classify_sentiment(&input, &output, pool.path(), &options(0)).await,
            Err(AnalyzerError::InvalidParameter(_))
        ));
        assert!(matches!(
            classify_sentiment(&dir.path().join("missing.csv"), &output, pool.path(), &options(5)).await,
            Err(AnalyzerError::InvalidParameter(_))
        ));
    }
}
