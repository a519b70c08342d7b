use super::{Document, DocumentStore};
use crate::db::{Model, PostType};
use crate::error::{AnalyzerError, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Fixed set of tags that partition the corpus. A document belongs to the
/// partition of tag `T` only if `T` is the single vocabulary tag it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagVocabulary {
    tags: BTreeSet<String>,
}

impl TagVocabulary {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_settings() -> Self {
        Self::new(crate::settings::settings().sampling.languages.iter().cloned())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn check(&self, tag: &str) -> Result<()> {
        if self.contains(tag) {
            Ok(())
        } else {
            Err(AnalyzerError::UnsupportedTag {
                tag: tag.to_string(),
                vocabulary: self.tags.iter().cloned().collect(),
            })
        }
    }

    /// Whether a serialized tag string such as `<python><django>` carries
    /// `tag` and no other vocabulary tag.
    pub fn matches_exclusively(&self, tags: &str, tag: &str) -> bool {
        let carries = |t: &str| tags.contains(&format!("<{t}>"));
        carries(tag) && self.tags.iter().filter(|t| *t != tag).all(|t| !carries(t))
    }
}

/// Ids of the documents in a `{model, post type, tag}` partition, sorted
/// ascending.
///
/// - no tag: every post (optionally of one type) or every comment
/// - questions: the exclusive-tag rule applied to their own tags
/// - answers: the rule applied to the parent question
/// - comments: union of comments on matching questions and answers
///
/// A tagged post query without a post type selects questions, since only
/// questions carry tags. The post type is ignored for comments.
pub fn ids_by_partition(
    store: &mut dyn DocumentStore,
    vocabulary: &TagVocabulary,
    model: Model,
    post_type: Option<PostType>,
    tag: Option<&str>,
) -> Result<Vec<i32>> {
    let Some(tag) = tag else {
        return ids_by_model(store, model, post_type);
    };
    vocabulary.check(tag)?;

    let questions: HashSet<i32> = store
        .question_tags()?
        .into_iter()
        .filter(|(_, tags)| vocabulary.matches_exclusively(tags, tag))
        .map(|(id, _)| id)
        .collect();
    debug!("{} questions tagged exclusively <{tag}>", questions.len());

    let mut ids: Vec<i32> = match (model, post_type) {
        (Model::Post, Some(PostType::Answer)) => answers_of(store, &questions)?.into_iter().collect(),
        (Model::Post, _) => questions.into_iter().collect(),
        (Model::Comment, _) => {
            let answers = answers_of(store, &questions)?;
            store
                .comment_posts()?
                .into_iter()
                .filter(|(_, post)| questions.contains(post) || answers.contains(post))
                .map(|(id, _)| id)
                .collect()
        }
    };
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

/// Unfiltered partition; the post type applies to posts only.
pub fn ids_by_model(
    store: &mut dyn DocumentStore,
    model: Model,
    post_type: Option<PostType>,
) -> Result<Vec<i32>> {
    match model {
        Model::Post => store.post_ids(post_type),
        Model::Comment => store.comment_ids(),
    }
}

fn answers_of(store: &mut dyn DocumentStore, questions: &HashSet<i32>) -> Result<HashSet<i32>> {
    Ok(store
        .answer_parents()?
        .into_iter()
        .filter(|(_, parent)| questions.contains(parent))
        .map(|(id, _)| id)
        .collect())
}

#[derive(Debug, Clone)]
struct StoredPost {
    text: String,
    post_type: PostType,
    tags: Option<String>,
    parent_id: Option<i32>,
}

/// In-memory [`DocumentStore`], handy for tests and small fixtures.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    posts: HashMap<i32, StoredPost>,
    comments: HashMap<i32, (i32, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_question(&mut self, id: i32, tags: &str, text: &str) -> &mut Self {
        self.posts.insert(
            id,
            StoredPost {
                text: text.to_string(),
                post_type: PostType::Question,
                tags: Some(tags.to_string()),
                parent_id: None,
            },
        );
        self
    }

    pub fn add_answer(&mut self, id: i32, parent_id: i32, text: &str) -> &mut Self {
        self.posts.insert(
            id,
            StoredPost {
                text: text.to_string(),
                post_type: PostType::Answer,
                tags: None,
                parent_id: Some(parent_id),
            },
        );
        self
    }

    pub fn add_comment(&mut self, id: i32, post_id: i32, text: &str) -> &mut Self {
        self.comments.insert(id, (post_id, text.to_string()));
        self
    }
}

fn sorted<T: Ord>(mut items: Vec<T>) -> Vec<T> {
    items.sort();
    items
}

impl DocumentStore for MemoryStore {
    fn post_ids(&mut self, post_type: Option<PostType>) -> Result<Vec<i32>> {
        Ok(sorted(
            self.posts
                .iter()
                .filter(|(_, p)| post_type.map_or(true, |t| p.post_type == t))
                .map(|(id, _)| *id)
                .collect(),
        ))
    }

    fn comment_ids(&mut self) -> Result<Vec<i32>> {
        Ok(sorted(self.comments.keys().copied().collect()))
    }

    fn question_tags(&mut self) -> Result<Vec<(i32, String)>> {
        Ok(sorted(
            self.posts
                .iter()
                .filter(|(_, p)| p.post_type == PostType::Question)
                .filter_map(|(id, p)| p.tags.clone().map(|t| (*id, t)))
                .collect(),
        ))
    }

    fn answer_parents(&mut self) -> Result<Vec<(i32, i32)>> {
        Ok(sorted(
            self.posts
                .iter()
                .filter(|(_, p)| p.post_type == PostType::Answer)
                .filter_map(|(id, p)| p.parent_id.map(|parent| (*id, parent)))
                .collect(),
        ))
    }

    fn comment_posts(&mut self) -> Result<Vec<(i32, i32)>> {
        Ok(sorted(
            self.comments
                .iter()
                .map(|(id, (post, _))| (*id, *post))
                .collect(),
        ))
    }

    fn fetch_documents(&mut self, model: Model, ids: &[i32]) -> Result<Vec<Document>> {
        let documents = ids
            .iter()
            .filter_map(|id| {
                let text = match model {
                    Model::Post => self.posts.get(id).map(|p| p.text.clone()),
                    Model::Comment => self.comments.get(id).map(|(_, t)| t.clone()),
                };
                text.map(|text| Document { id: *id, text })
            })
            .collect();
        Ok(documents)
    }
}
