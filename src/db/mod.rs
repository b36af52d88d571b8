pub mod models;

use async_trait::async_trait;
use models::{Faq, FaqInput, Notice, NoticeInput, Role, Timetable, TimetableInput, User};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::chat::matcher::TextMatcher;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database connection lock poisoned")]
    Poisoned,
    #[error("Record not found")]
    NotFound,
    #[error("Duplicate value for {0}")]
    Duplicate(&'static str),
    #[error("Database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Database connection still in use")]
    InUse,
}

/// Read-only view of the content tables used by the chat pipeline.
///
/// Lookups return the first record in store order (insertion order) whose
/// field satisfies the matcher; listings return the newest records first.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_faq(&self, matcher: &TextMatcher) -> Result<Option<Faq>, StoreError>;
    async fn find_notice(&self, matcher: &TextMatcher) -> Result<Option<Notice>, StoreError>;
    async fn find_timetable(&self, matcher: &TextMatcher)
        -> Result<Option<Timetable>, StoreError>;
    async fn recent_faqs(&self, limit: usize) -> Result<Vec<Faq>, StoreError>;
    async fn recent_notices(&self, limit: usize) -> Result<Vec<Notice>, StoreError>;
    async fn recent_timetables(&self, limit: usize) -> Result<Vec<Timetable>, StoreError>;
}

/// SQLite handle. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

const FAQ_COLUMNS: &str = "id, question, answer, category, created_at, updated_at";
const NOTICE_COLUMNS: &str = "id, title, description, file_url, category, created_at, updated_at";
const TIMETABLE_COLUMNS: &str =
    "id, title, course, branch, semester, file_url, created_at, updated_at";

impl Database {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).ok();
        }
        info!("Opening database at {}", db_path.display());
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Flush and close the underlying connection.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| StoreError::InUse)?
            .into_inner()
            .map_err(|_| StoreError::Poisoned)?;
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }

    /// Run blocking store work on the runtime's blocking pool.
    pub async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS faqs (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                category TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS notices (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                file_url TEXT,
                category TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS timetables (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                course TEXT,
                branch TEXT NOT NULL,
                semester TEXT NOT NULL,
                file_url TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('admin', 'faculty', 'student'))
            );
            ",
        )?;
        Ok(())
    }

    // ── FAQs ──

    pub fn list_faqs(&self) -> Result<Vec<Faq>, StoreError> {
        self.recent(
            &format!("SELECT {FAQ_COLUMNS} FROM faqs ORDER BY created_at DESC, rowid DESC"),
            None,
            faq_from_row,
        )
    }

    pub fn create_faq(
        &self,
        question: &str,
        answer: &str,
        category: Option<&str>,
    ) -> Result<Faq, StoreError> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO faqs (id, question, answer, category) VALUES (?1, ?2, ?3, ?4)",
            params![id, question, answer, category],
        )?;
        let faq = conn.query_row(
            &format!("SELECT {FAQ_COLUMNS} FROM faqs WHERE id = ?1"),
            params![id],
            faq_from_row,
        )?;
        Ok(faq)
    }

    /// Overwrite the supplied fields, leaving omitted ones untouched.
    pub fn update_faq(&self, id: &str, input: &FaqInput) -> Result<Faq, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE faqs SET question = COALESCE(?1, question), answer = COALESCE(?2, answer),
                category = COALESCE(?3, category), updated_at = datetime('now') WHERE id = ?4",
            params![input.question, input.answer, input.category, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        let faq = conn.query_row(
            &format!("SELECT {FAQ_COLUMNS} FROM faqs WHERE id = ?1"),
            params![id],
            faq_from_row,
        )?;
        Ok(faq)
    }

    pub fn delete_faq(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        match conn.execute("DELETE FROM faqs WHERE id = ?1", params![id])? {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    // ── Notices ──

    pub fn list_notices(&self) -> Result<Vec<Notice>, StoreError> {
        self.recent(
            &format!("SELECT {NOTICE_COLUMNS} FROM notices ORDER BY created_at DESC, rowid DESC"),
            None,
            notice_from_row,
        )
    }

    pub fn create_notice(
        &self,
        title: &str,
        description: &str,
        category: Option<&str>,
        file_url: Option<&str>,
    ) -> Result<Notice, StoreError> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO notices (id, title, description, category, file_url) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, title, description, category, file_url],
        )?;
        let notice = conn.query_row(
            &format!("SELECT {NOTICE_COLUMNS} FROM notices WHERE id = ?1"),
            params![id],
            notice_from_row,
        )?;
        Ok(notice)
    }

    /// Returns the notice as it was before the edit alongside the edited one,
    /// so the caller can drop a replaced attachment.
    pub fn update_notice(
        &self,
        id: &str,
        input: &NoticeInput,
    ) -> Result<(Notice, Notice), StoreError> {
        let conn = self.conn()?;
        let before = conn
            .query_row(
                &format!("SELECT {NOTICE_COLUMNS} FROM notices WHERE id = ?1"),
                params![id],
                notice_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        conn.execute(
            "UPDATE notices SET title = COALESCE(?1, title), description = COALESCE(?2, description),
                category = COALESCE(?3, category), file_url = COALESCE(?4, file_url),
                updated_at = datetime('now') WHERE id = ?5",
            params![input.title, input.description, input.category, input.file_url, id],
        )?;
        let after = conn.query_row(
            &format!("SELECT {NOTICE_COLUMNS} FROM notices WHERE id = ?1"),
            params![id],
            notice_from_row,
        )?;
        Ok((before, after))
    }

    pub fn delete_notice(&self, id: &str) -> Result<Notice, StoreError> {
        let conn = self.conn()?;
        let notice = conn
            .query_row(
                &format!("SELECT {NOTICE_COLUMNS} FROM notices WHERE id = ?1"),
                params![id],
                notice_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        conn.execute("DELETE FROM notices WHERE id = ?1", params![id])?;
        Ok(notice)
    }

    // ── Timetables ──

    pub fn list_timetables(&self) -> Result<Vec<Timetable>, StoreError> {
        self.recent(
            &format!(
                "SELECT {TIMETABLE_COLUMNS} FROM timetables ORDER BY created_at DESC, rowid DESC"
            ),
            None,
            timetable_from_row,
        )
    }

    pub fn create_timetable(
        &self,
        title: &str,
        course: Option<&str>,
        branch: &str,
        semester: &str,
        file_url: Option<&str>,
    ) -> Result<Timetable, StoreError> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO timetables (id, title, course, branch, semester, file_url)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, title, course, branch, semester, file_url],
        )?;
        let timetable = conn.query_row(
            &format!("SELECT {TIMETABLE_COLUMNS} FROM timetables WHERE id = ?1"),
            params![id],
            timetable_from_row,
        )?;
        Ok(timetable)
    }

    pub fn update_timetable(
        &self,
        id: &str,
        input: &TimetableInput,
    ) -> Result<(Timetable, Timetable), StoreError> {
        let conn = self.conn()?;
        let before = conn
            .query_row(
                &format!("SELECT {TIMETABLE_COLUMNS} FROM timetables WHERE id = ?1"),
                params![id],
                timetable_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        conn.execute(
            "UPDATE timetables SET title = COALESCE(?1, title), course = COALESCE(?2, course),
                branch = COALESCE(?3, branch), semester = COALESCE(?4, semester),
                file_url = COALESCE(?5, file_url), updated_at = datetime('now') WHERE id = ?6",
            params![
                input.title,
                input.course,
                input.branch,
                input.semester,
                input.file_url,
                id
            ],
        )?;
        let after = conn.query_row(
            &format!("SELECT {TIMETABLE_COLUMNS} FROM timetables WHERE id = ?1"),
            params![id],
            timetable_from_row,
        )?;
        Ok((before, after))
    }

    pub fn delete_timetable(&self, id: &str) -> Result<Timetable, StoreError> {
        let conn = self.conn()?;
        let timetable = conn
            .query_row(
                &format!("SELECT {TIMETABLE_COLUMNS} FROM timetables WHERE id = ?1"),
                params![id],
                timetable_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        conn.execute("DELETE FROM timetables WHERE id = ?1", params![id])?;
        Ok(timetable)
    }

    // ── Users ──

    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, StoreError> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        let inserted = conn.execute(
            "INSERT INTO users (id, username, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
            params![id, username, password_hash, role.as_str()],
        );
        match inserted {
            Ok(_) => Ok(User {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                role,
            }),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Duplicate("username"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
                params![username],
                |row| {
                    let role: String = row.get(3)?;
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        role: role.parse().map_err(|e: String| {
                            rusqlite::Error::FromSqlConversionFailure(
                                3,
                                rusqlite::types::Type::Text,
                                e.into(),
                            )
                        })?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    // ── Shared query helpers ──

    fn recent<T>(
        &self,
        sql: &str,
        limit: Option<usize>,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StoreError> {
        let conn = self.conn()?;
        let sql = match limit {
            Some(limit) => format!("{sql} LIMIT {limit}"),
            None => sql.to_string(),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], map)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Scan a table in insertion order and return the first row whose `field`
    /// satisfies the matcher.
    fn first_matching<T>(
        &self,
        sql: &str,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
        field: fn(&T) -> &str,
        matcher: &TextMatcher,
    ) -> Result<Option<T>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], map)?;
        for row in rows {
            let record = row?;
            if matcher.is_match(field(&record)) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ContentStore for Database {
    async fn find_faq(&self, matcher: &TextMatcher) -> Result<Option<Faq>, StoreError> {
        let matcher = matcher.clone();
        let found = self
            .call(move |db| {
                db.first_matching(
                    &format!("SELECT {FAQ_COLUMNS} FROM faqs ORDER BY rowid ASC"),
                    faq_from_row,
                    faq_question,
                    &matcher,
                )
            })
            .await?;
        debug!(matched = found.is_some(), "FAQ lookup");
        Ok(found)
    }

    async fn find_notice(&self, matcher: &TextMatcher) -> Result<Option<Notice>, StoreError> {
        let matcher = matcher.clone();
        self.call(move |db| {
            db.first_matching(
                &format!("SELECT {NOTICE_COLUMNS} FROM notices ORDER BY rowid ASC"),
                notice_from_row,
                notice_title,
                &matcher,
            )
        })
        .await
    }

    async fn find_timetable(
        &self,
        matcher: &TextMatcher,
    ) -> Result<Option<Timetable>, StoreError> {
        let matcher = matcher.clone();
        self.call(move |db| {
            db.first_matching(
                &format!("SELECT {TIMETABLE_COLUMNS} FROM timetables ORDER BY rowid ASC"),
                timetable_from_row,
                timetable_title,
                &matcher,
            )
        })
        .await
    }

    async fn recent_faqs(&self, limit: usize) -> Result<Vec<Faq>, StoreError> {
        self.call(move |db| {
            db.recent(
                &format!("SELECT {FAQ_COLUMNS} FROM faqs ORDER BY created_at DESC, rowid DESC"),
                Some(limit),
                faq_from_row,
            )
        })
        .await
    }

    async fn recent_notices(&self, limit: usize) -> Result<Vec<Notice>, StoreError> {
        self.call(move |db| {
            db.recent(
                &format!(
                    "SELECT {NOTICE_COLUMNS} FROM notices ORDER BY created_at DESC, rowid DESC"
                ),
                Some(limit),
                notice_from_row,
            )
        })
        .await
    }

    async fn recent_timetables(&self, limit: usize) -> Result<Vec<Timetable>, StoreError> {
        self.call(move |db| {
            db.recent(
                &format!(
                    "SELECT {TIMETABLE_COLUMNS} FROM timetables ORDER BY created_at DESC, rowid DESC"
                ),
                Some(limit),
                timetable_from_row,
            )
        })
        .await
    }
}

fn faq_question(faq: &Faq) -> &str {
    &faq.question
}

fn notice_title(notice: &Notice) -> &str {
    &notice.title
}

fn timetable_title(timetable: &Timetable) -> &str {
    &timetable.title
}

fn faq_from_row(row: &Row<'_>) -> rusqlite::Result<Faq> {
    Ok(Faq {
        id: row.get(0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
        category: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn notice_from_row(row: &Row<'_>) -> rusqlite::Result<Notice> {
    Ok(Notice {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        file_url: row.get(3)?,
        category: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn timetable_from_row(row: &Row<'_>) -> rusqlite::Result<Timetable> {
    Ok(Timetable {
        id: row.get(0)?,
        title: row.get(1)?,
        course: row.get(2)?,
        branch: row.get(3)?,
        semester: row.get(4)?,
        file_url: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
