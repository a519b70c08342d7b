use crate::error::{AnalyzerError, Result};
use crate::sampling::{Document, DocumentStore};
use crate::schema::{comment, post};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use strum::{Display, EnumString};
use tracing::{debug, warn};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// SQLite rejects statements with more bound parameters than this.
const MAX_BOUND_IDS: usize = 500;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum PostType {
    Question = 1,
    Answer = 2,
}

impl PostType {
    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Self::Question),
            2 => Some(Self::Answer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Model {
    Post,
    Comment,
}

pub fn establish_pool(database_url: &str, max_size: u32) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Ok(Pool::builder().max_size(max_size).build(manager)?)
}

pub fn configure_connection(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute("PRAGMA busy_timeout = 2000;")?;
    conn.batch_execute("PRAGMA journal_mode = WAL;")?;
    conn.batch_execute("PRAGMA synchronous = NORMAL;")?;
    conn.batch_execute("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

pub fn setup_database(conn: &mut SqliteConnection) -> Result<()> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| AnalyzerError::Migration(e.to_string()))?;
    debug!("applied {} migration(s)", applied.len());
    Ok(())
}

pub fn teardown_database(conn: &mut SqliteConnection) -> Result<()> {
    conn.revert_all_migrations(MIGRATIONS)
        .map_err(|e| AnalyzerError::Migration(e.to_string()))?;
    Ok(())
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = post)]
pub struct Post {
    pub id: i32,
    pub title: Option<String>,
    pub text: String,
    pub post_type_id: i32,
    pub creation_date: i64,
    pub tags: Option<String>,
    pub parent_id: Option<i32>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = post)]
pub struct NewPost {
    pub id: i32,
    pub title: Option<String>,
    pub text: String,
    pub post_type_id: i32,
    pub creation_date: i64,
    pub tags: Option<String>,
    pub parent_id: Option<i32>,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = comment)]
pub struct Comment {
    pub id: i32,
    pub creation_date: i64,
    pub text: String,
    pub post_id: i32,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = comment)]
pub struct NewComment {
    pub id: i32,
    pub creation_date: i64,
    pub text: String,
    pub post_id: i32,
}

/// Insert the whole batch in one transaction. If that fails, every row is
/// committed on its own and rows that still fail are skipped.
///
/// Returns how many rows were committed.
pub fn insert_posts(conn: &mut SqliteConnection, rows: &[NewPost]) -> usize {
    commit_with_fallback(conn, rows, |c, chunk| {
        diesel::insert_into(post::table).values(chunk).execute(c)
    })
}

pub fn insert_comments(conn: &mut SqliteConnection, rows: &[NewComment]) -> usize {
    commit_with_fallback(conn, rows, |c, chunk| {
        diesel::insert_into(comment::table).values(chunk).execute(c)
    })
}

fn commit_with_fallback<T>(
    conn: &mut SqliteConnection,
    rows: &[T],
    insert: impl Fn(&mut SqliteConnection, &[T]) -> QueryResult<usize>,
) -> usize {
    if rows.is_empty() {
        return 0;
    }

    match conn.transaction(|c| insert(c, rows)) {
        Ok(count) => count,
        Err(e) => {
            warn!("batch commit of {} rows failed ({e}), committing separately", rows.len());
            let mut committed = 0;
            for row in rows.chunks(1) {
                match conn.transaction(|c| insert(c, row)) {
                    Ok(count) => committed += count,
                    Err(e) => warn!("skipping row: {e}"),
                }
            }
            committed
        }
    }
}

pub fn post_ids(conn: &mut SqliteConnection, post_type: Option<PostType>) -> QueryResult<Vec<i32>> {
    let mut query = post::table.select(post::id).into_boxed();
    if let Some(post_type) = post_type {
        query = query.filter(post::post_type_id.eq(post_type.id()));
    }
    query.order(post::id.asc()).load(conn)
}

pub fn comment_ids(conn: &mut SqliteConnection) -> QueryResult<Vec<i32>> {
    comment::table
        .select(comment::id)
        .order(comment::id.asc())
        .load(conn)
}

pub fn get_posts(conn: &mut SqliteConnection, ids: &[i32]) -> QueryResult<Vec<Post>> {
    let mut found = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_BOUND_IDS) {
        let rows: Vec<Post> = post::table
            .filter(post::id.eq_any(chunk))
            .select(Post::as_select())
            .load(conn)?;
        found.extend(rows);
    }
    Ok(found)
}

pub fn get_comments(conn: &mut SqliteConnection, ids: &[i32]) -> QueryResult<Vec<Comment>> {
    let mut found = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_BOUND_IDS) {
        let rows: Vec<Comment> = comment::table
            .filter(comment::id.eq_any(chunk))
            .select(Comment::as_select())
            .load(conn)?;
        found.extend(rows);
    }
    Ok(found)
}

/// A [`DocumentStore`] backed by an explicitly passed SQLite connection.
pub struct SqliteStore<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }
}

impl DocumentStore for SqliteStore<'_> {
    fn post_ids(&mut self, post_type: Option<PostType>) -> Result<Vec<i32>> {
        Ok(post_ids(self.conn, post_type)?)
    }

    fn comment_ids(&mut self) -> Result<Vec<i32>> {
        Ok(comment_ids(self.conn)?)
    }

    fn question_tags(&mut self) -> Result<Vec<(i32, String)>> {
        let rows: Vec<(i32, Option<String>)> = post::table
            .filter(post::post_type_id.eq(PostType::Question.id()))
            .filter(post::tags.is_not_null())
            .select((post::id, post::tags))
            .load(self.conn)?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, tags)| tags.map(|t| (id, t)))
            .collect())
    }

    fn answer_parents(&mut self) -> Result<Vec<(i32, i32)>> {
        let rows: Vec<(i32, Option<i32>)> = post::table
            .filter(post::post_type_id.eq(PostType::Answer.id()))
            .filter(post::parent_id.is_not_null())
            .select((post::id, post::parent_id))
            .load(self.conn)?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, parent)| parent.map(|p| (id, p)))
            .collect())
    }

    fn comment_posts(&mut self) -> Result<Vec<(i32, i32)>> {
        Ok(comment::table
            .select((comment::id, comment::post_id))
            .load(self.conn)?)
    }

    fn fetch_documents(&mut self, model: Model, ids: &[i32]) -> Result<Vec<Document>> {
        let documents = match model {
            Model::Post => get_posts(self.conn, ids)?
                .into_iter()
                .map(|p| Document { id: p.id, text: p.text })
                .collect(),
            Model::Comment => get_comments(self.conn, ids)?
                .into_iter()
                .map(|c| Document { id: c.id, text: c.text })
                .collect(),
        };
        Ok(documents)
    }
}

#[cfg(test)]
pub(crate) fn test_connection() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:").unwrap();
    setup_database(&mut conn).unwrap();
    conn
}
