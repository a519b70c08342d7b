pub mod partition;
pub mod sampler;

pub use partition::{ids_by_model, ids_by_partition, MemoryStore, TagVocabulary};
pub use sampler::RandomSampler;

use crate::db::{Model, PostType};
use crate::error::{AnalyzerError, Result};
use crate::utils::{log_sample_estimated, log_sample_matches, log_sample_query};
use rand::Rng;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// The sanitized text of a post or comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: i32,
    pub text: String,
}

/// Read access to stored documents, in the shape the partition queries need.
/// Relationships are returned as plain id indexes and joined in memory.
pub trait DocumentStore {
    fn post_ids(&mut self, post_type: Option<PostType>) -> Result<Vec<i32>>;
    fn comment_ids(&mut self) -> Result<Vec<i32>>;
    /// `(question id, tags)` for every question with tags.
    fn question_tags(&mut self) -> Result<Vec<(i32, String)>>;
    /// `(answer id, parent question id)`.
    fn answer_parents(&mut self) -> Result<Vec<(i32, i32)>>;
    /// `(comment id, post id)`.
    fn comment_posts(&mut self) -> Result<Vec<(i32, i32)>>;
    /// Documents with the given ids. Ids that do not exist are skipped.
    fn fetch_documents(&mut self, model: Model, ids: &[i32]) -> Result<Vec<Document>>;
}

#[derive(Debug, Clone, Copy)]
pub struct SampleRequest<'a> {
    pub model: Model,
    pub post_type: Option<PostType>,
    pub tag: Option<&'a str>,
    pub size: Option<usize>,
}

/// Draw a random sample of documents from one partition, in sampling order.
pub fn generate_sample<R: Rng>(
    store: &mut dyn DocumentStore,
    vocabulary: &TagVocabulary,
    request: &SampleRequest<'_>,
    sampler: &mut RandomSampler<R>,
) -> Result<Vec<Document>> {
    log_sample_query(request.model, request.post_type, request.tag);
    let ids = ids_by_partition(store, vocabulary, request.model, request.post_type, request.tag)?;
    if ids.is_empty() {
        return Err(AnalyzerError::EmptyPopulation {
            model: request.model.to_string(),
            post_type: request.post_type.map_or("-".to_string(), |t| t.to_string()),
            tag: request.tag.unwrap_or("-").to_string(),
        });
    }
    log_sample_matches(ids.len());

    let selected = sampler.sample(&ids, request.size)?;
    if request.size.is_none() {
        log_sample_estimated(selected.len());
    }

    let mut by_id: HashMap<i32, Document> = store
        .fetch_documents(request.model, &selected)?
        .into_iter()
        .map(|doc| (doc.id, doc))
        .collect();
    Ok(selected.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// Write one document text per line to `outpath` and the matching ids, in the
/// same order, to `<outpath>.index`. Returns the index file path.
pub fn write_sample_and_index_files(outpath: &Path, documents: &[Document]) -> Result<PathBuf> {
    let mut index_path = outpath.as_os_str().to_owned();
    index_path.push(".index");
    let index_path = PathBuf::from(index_path);

    let mut texts = BufWriter::new(File::create(outpath)?);
    let mut index = BufWriter::new(File::create(&index_path)?);
    for doc in documents {
        writeln!(texts, "{}", doc.text)?;
        writeln!(index, "{}", doc.id)?;
    }
    texts.flush()?;
    index.flush()?;
    Ok(index_path)
}

#[cfg(test)]
mod tests {
    use super::partition::tests::{fixture, languages};
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_generate_sample_returns_partition_documents() {
        let mut store = fixture();
        let mut sampler = RandomSampler::seeded(51234);
        let request = SampleRequest {
            model: Model::Post,
            post_type: Some(PostType::Answer),
            tag: Some("python"),
            size: Some(2),
        };
        let mut docs = generate_sample(&mut store, &languages(), &request, &mut sampler).unwrap();
        docs.sort_by_key(|d| d.id);
        assert_eq!(
            docs,
            vec![
                Document { id: 11, text: "a11".into() },
                Document { id: 12, text: "a12".into() },
            ]
        );
    }

    #[test]
    fn test_generate_sample_on_empty_partition() {
        let mut store = fixture();
        let request = SampleRequest {
            model: Model::Comment,
            post_type: None,
            tag: Some("php"),
            size: None,
        };
        let result = generate_sample(&mut store, &languages(), &request, &mut RandomSampler::seeded(1));
        match result {
            Err(AnalyzerError::EmptyPopulation { model, tag, .. }) => {
                assert_eq!(model, "Comment");
                assert_eq!(tag, "php");
            }
            other => panic!("expected empty population, got {other:?}"),
        }
    }

    #[test]
    fn test_generate_sample_without_size_takes_small_partition_whole() {
        let mut store = fixture();
        let request = SampleRequest {
            model: Model::Comment,
            post_type: None,
            tag: None,
            size: None,
        };
        let docs = generate_sample(&mut store, &languages(), &request, &mut RandomSampler::seeded(2)).unwrap();
        assert_eq!(docs.len(), 6);
    }

    #[test]
    fn test_write_sample_and_index_files() {
        let dir = TempDir::new().unwrap();
        let outpath = dir.path().join("out.csv");
        let docs = vec![
            Document { id: 42, text: "first text".into() },
            Document { id: 7, text: "second".into() },
        ];

        let index_path = write_sample_and_index_files(&outpath, &docs).unwrap();

        assert_eq!(index_path, dir.path().join("out.csv.index"));
        assert_eq!(fs::read_to_string(&outpath).unwrap(), "first text\nsecond\n");
        assert_eq!(fs::read_to_string(&index_path).unwrap(), "42\n7\n");
    }
}
