use crate::db::{insert_comments, insert_posts, post_ids, NewComment, NewPost, PostType};
use crate::error::{AnalyzerError, Result};
use crate::sanitize::{sanitize_comment, sanitize_post};
use crate::utils::{log_fill_known_ids, log_fill_progress, log_fill_start};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::sqlite::SqliteConnection;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

const DUMP_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, Copy, Default)]
pub struct FillSources<'a> {
    pub questions: Option<&'a Path>,
    pub answers: Option<&'a Path>,
    pub comments: Option<&'a Path>,
}

impl FillSources<'_> {
    pub fn is_empty(&self) -> bool {
        self.questions.is_none() && self.answers.is_none() && self.comments.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillReport {
    pub questions: usize,
    pub answers: usize,
    pub comments: usize,
}

type XmlRow = HashMap<String, String>;

/// Parse a dump timestamp (`2008-07-31T21:42:52.667`) or a plain date
/// (`2008-07-31`, midnight) into Unix seconds.
pub fn parse_creation_date(value: &str) -> Result<i64> {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, DUMP_DATE_FORMAT) {
        return Ok(datetime.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc().timestamp())
        .ok_or_else(|| AnalyzerError::invalid(format!("unrecognized date '{value}'")))
}

/// Load questions, then answers, then comments from the dump files that are
/// given. Answers are kept only when their question is stored and comments
/// only when their post is, so the order matters.
///
/// `created_after` (Unix seconds) drops every row created before it.
pub fn fill_database(
    conn: &mut SqliteConnection,
    sources: FillSources<'_>,
    created_after: Option<i64>,
    batch_size: usize,
) -> Result<FillReport> {
    if batch_size == 0 {
        return Err(AnalyzerError::invalid("batch size must be positive"));
    }
    let mut report = FillReport::default();

    if let Some(path) = sources.questions {
        log_fill_start("questions", path);
        report.questions = migrate_rows(conn, path, created_after, batch_size, |row| {
            post_from_row(row, PostType::Question, None)
        }, insert_posts)?;
    }

    if let Some(path) = sources.answers {
        let questions: HashSet<i32> = post_ids(conn, Some(PostType::Question))?.into_iter().collect();
        log_fill_known_ids("question", questions.len());
        log_fill_start("answers", path);
        report.answers = migrate_rows(conn, path, created_after, batch_size, |row| {
            post_from_row(row, PostType::Answer, Some(&questions))
        }, insert_posts)?;
    }

    if let Some(path) = sources.comments {
        let posts: HashSet<i32> = post_ids(conn, None)?.into_iter().collect();
        log_fill_known_ids("post", posts.len());
        log_fill_start("comments", path);
        report.comments = migrate_rows(conn, path, created_after, batch_size, |row| {
            comment_from_row(row, &posts)
        }, insert_comments)?;
    }

    Ok(report)
}

fn migrate_rows<T>(
    conn: &mut SqliteConnection,
    path: &Path,
    created_after: Option<i64>,
    batch_size: usize,
    mut convert: impl FnMut(&XmlRow) -> Option<T>,
    insert: fn(&mut SqliteConnection, &[T]) -> usize,
) -> Result<usize> {
    let mut added = 0;
    let mut batch = Vec::with_capacity(batch_size);

    for_each_row(path, |row| {
        if let Some(date) = created_after {
            match row.get("CreationDate").map(|d| parse_creation_date(d)) {
                Some(Ok(created)) if created >= date => {}
                Some(Ok(_)) => return,
                _ => {
                    warn!("skipping row {:?} without a valid CreationDate", row.get("Id"));
                    return;
                }
            }
        }
        if let Some(model) = convert(row) {
            batch.push(model);
        }
        if batch.len() >= batch_size {
            added += insert(conn, &batch);
            batch.clear();
            log_fill_progress(added);
        }
    })?;

    if !batch.is_empty() {
        added += insert(conn, &batch);
        log_fill_progress(added);
    }
    Ok(added)
}

/// Stream every `<row .../>` element of a dump file as an attribute map.
fn for_each_row(path: &Path, mut visit: impl FnMut(&XmlRow)) -> Result<()> {
    let mut reader = Reader::from_reader(BufReader::new(File::open(path)?));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.name().as_ref() == b"row" => {
                visit(&row_attributes(&e)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn row_attributes(element: &BytesStart<'_>) -> Result<XmlRow> {
    let mut row = XmlRow::new();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        row.insert(key, value);
    }
    Ok(row)
}

fn int_attribute(row: &XmlRow, key: &str) -> Option<i32> {
    row.get(key).and_then(|v| v.parse().ok())
}

fn post_from_row(
    row: &XmlRow,
    target: PostType,
    question_ids: Option<&HashSet<i32>>,
) -> Option<NewPost> {
    let post_type = int_attribute(row, "PostTypeId").and_then(PostType::from_id)?;
    if post_type != target {
        return None;
    }
    let id = int_attribute(row, "Id")?;

    let parent_id = match post_type {
        PostType::Answer => {
            let parent = int_attribute(row, "ParentId")?;
            if !question_ids.is_some_and(|ids| ids.contains(&parent)) {
                debug!("skipping answer {id}, question {parent} is not stored");
                return None;
            }
            Some(parent)
        }
        PostType::Question => None,
    };

    let Some(creation_date) = row.get("CreationDate").and_then(|d| parse_creation_date(d).ok()) else {
        warn!("skipping post {id} without a valid CreationDate");
        return None;
    };

    let (title, tags) = match post_type {
        PostType::Question => (row.get("Title").cloned(), row.get("Tags").cloned()),
        PostType::Answer => (None, None),
    };

    Some(NewPost {
        id,
        title,
        text: sanitize_post(row.get("Body").map_or("", String::as_str)),
        post_type_id: post_type.id(),
        creation_date,
        tags,
        parent_id,
    })
}

fn comment_from_row(row: &XmlRow, post_ids: &HashSet<i32>) -> Option<NewComment> {
    let id = int_attribute(row, "Id")?;
    let post_id = int_attribute(row, "PostId")?;
    if !post_ids.contains(&post_id) {
        debug!("skipping comment {id}, post {post_id} is not stored");
        return None;
    }
    let Some(creation_date) = row.get("CreationDate").and_then(|d| parse_creation_date(d).ok()) else {
        warn!("skipping comment {id} without a valid CreationDate");
        return None;
    };

    Some(NewComment {
        id,
        creation_date,
        text: sanitize_comment(row.get("Text").map_or("", String::as_str)),
        post_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{comment_ids, get_comments, get_posts, test_connection};
    use std::fs;
    use tempfile::TempDir;

    const POSTS_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<posts>
  <row Id="1" PostTypeId="1" CreationDate="2008-07-31T21:42:52.667" Title="How do I loop?" Body="&lt;p&gt;Hello &lt;code&gt;x = 1&lt;/code&gt;world&lt;/p&gt;" Tags="&lt;python&gt;&lt;loops&gt;" />
  <row Id="2" PostTypeId="2" ParentId="1" CreationDate="2008-08-01T10:00:00.000" Body="&lt;p&gt;Use a &lt;b&gt;for&lt;/b&gt; loop&lt;/p&gt;" />
  <row Id="3" PostTypeId="2" ParentId="99" CreationDate="2008-08-01T11:00:00.000" Body="orphan" />
  <row Id="4" PostTypeId="5" CreationDate="2008-08-01T12:00:00.000" Body="wiki" />
  <row Id="5" PostTypeId="1" CreationDate="2010-01-01T00:00:00" Title="Later" Body="Later body" Tags="&lt;java&gt;" />
</posts>
"#;

    const COMMENTS_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<comments>
  <row Id="10" PostId="1" Score="0" Text="Nice **question** http://example.com" CreationDate="2008-08-01T12:00:00.000" UserId="7" />
  <row Id="11" PostId="2" Text="Thanks" CreationDate="2008-08-02T12:00:00.000" />
  <row Id="12" PostId="3" Text="On an orphan" CreationDate="2008-08-02T13:00:00.000" />
  <row Id="13" PostId="5" Text="`code` only" CreationDate="2010-02-01T00:00:00.000" />
</comments>
"#;

    fn write_dumps(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        let posts = dir.path().join("Posts.xml");
        let comments = dir.path().join("Comments.xml");
        fs::write(&posts, POSTS_XML).unwrap();
        fs::write(&comments, COMMENTS_XML).unwrap();
        (posts, comments)
    }

    #[test]
    fn test_fill_database() {
        let dir = TempDir::new().unwrap();
        let (posts, comments) = write_dumps(&dir);
        let mut conn = test_connection();

        let sources = FillSources {
            questions: Some(&posts),
            answers: Some(&posts),
            comments: Some(&comments),
        };
        let report = fill_database(&mut conn, sources, None, 2).unwrap();
        assert_eq!(
            report,
            FillReport {
                questions: 2,
                answers: 1,
                comments: 3
            }
        );

        let mut stored = get_posts(&mut conn, &[1, 2, 3, 4, 5]).unwrap();
        stored.sort_by_key(|p| p.id);
        let ids: Vec<i32> = stored.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 5]);

        let question = &stored[0];
        assert_eq!(question.text, "Hello world");
        assert_eq!(question.tags.as_deref(), Some("<python><loops>"));
        assert_eq!(question.title.as_deref(), Some("How do I loop?"));
        assert_eq!(question.creation_date, 1_217_540_572);

        let answer = &stored[1];
        assert_eq!(answer.text, "Use a for loop");
        assert_eq!(answer.parent_id, Some(1));
        assert_eq!(answer.post_type_id, PostType::Answer.id());
        assert!(answer.tags.is_none());

        assert_eq!(comment_ids(&mut conn).unwrap(), vec![10, 11, 13]);
        let mut texts: Vec<(i32, String)> = get_comments(&mut conn, &[10, 13])
            .unwrap()
            .into_iter()
            .map(|c| (c.id, c.text))
            .collect();
        texts.sort();
        assert_eq!(
            texts,
            vec![(10, "Nice question".to_string()), (13, "only".to_string())]
        );
    }

    #[test]
    fn test_fill_database_respects_cutoff_date() {
        let dir = TempDir::new().unwrap();
        let (posts, comments) = write_dumps(&dir);
        let mut conn = test_connection();

        let sources = FillSources {
            questions: Some(&posts),
            answers: Some(&posts),
            comments: Some(&comments),
        };
        let cutoff = parse_creation_date("2009-01-01").unwrap();
        let report = fill_database(&mut conn, sources, Some(cutoff), 1000).unwrap();

        assert_eq!(
            report,
            FillReport {
                questions: 1,
                answers: 0,
                comments: 1
            }
        );
        assert_eq!(post_ids(&mut conn, None).unwrap(), vec![5]);
        assert_eq!(comment_ids(&mut conn).unwrap(), vec![13]);
    }

    #[test]
    fn test_answers_need_stored_questions() {
        let dir = TempDir::new().unwrap();
        let (posts, _) = write_dumps(&dir);
        let mut conn = test_connection();

        let sources = FillSources {
            answers: Some(&posts),
            ..Default::default()
        };
        let report = fill_database(&mut conn, sources, None, 10).unwrap();
        assert_eq!(report.answers, 0);
        assert!(post_ids(&mut conn, None).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let mut conn = test_connection();
        assert!(matches!(
            fill_database(&mut conn, FillSources::default(), None, 0),
            Err(AnalyzerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_parse_creation_date() {
        assert_eq!(parse_creation_date("2008-07-31T21:42:52.667").unwrap(), 1_217_540_572);
        assert_eq!(parse_creation_date("2008-07-31T21:42:52").unwrap(), 1_217_540_572);
        assert_eq!(parse_creation_date("1970-01-02").unwrap(), 86_400);
        assert!(parse_creation_date("31/07/2008").is_err());
    }
}
