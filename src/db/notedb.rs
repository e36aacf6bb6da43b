use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

// Global database instance
static DB: OnceCell<Arc<NoteDb>> = OnceCell::const_new();

/// Initialize the global database connection
///
/// # Arguments
/// * `database_url` - PostgreSQL connection string
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error
pub async fn init_db(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = NoteDb::new(database_url).await?;
    db.init_schema().await?;
    DB.set(Arc::new(db))
        .map_err(|_| "Database already initialized")?;
    Ok(())
}

/// Get the global database instance
pub fn get_db() -> Option<Arc<NoteDb>> {
    DB.get().cloned()
}

/// Note row from the database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NoteRow {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

/// Access-list row of a note
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NoteShareRow {
    pub note_id: Uuid,
    pub subject: String,
    pub role: String,
    pub invited_at: DateTime<Utc>,
}

/// A note together with its access list
#[derive(Debug, Clone)]
pub struct NoteRecord {
    pub note: NoteRow,
    pub shares: Vec<NoteShareRow>,
}

/// Owner and (possibly absent) share role for one subject on one note
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NoteAccessRow {
    pub owner: String,
    pub role: Option<String>,
}

/// Database connection pool
pub struct NoteDb {
    pool: PgPool,
}

impl NoteDb {
    /// Create a new database connection pool
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn _pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables if they do not exist yet
    pub async fn init_schema(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                title TEXT NOT NULL DEFAULT 'Untitled',
                content TEXT NOT NULL DEFAULT '',
                owner TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS note_shares (
                note_id UUID NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                subject TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('viewer', 'editor')),
                invited_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (note_id, subject)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema initialized");
        Ok(())
    }

    /// Insert a new note owned by `owner`
    pub async fn create_note(
        &self,
        owner: &str,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<NoteRow, SqlxError> {
        sqlx::query_as::<_, NoteRow>(
            r#"
            INSERT INTO notes (title, content, owner)
            VALUES (COALESCE($1, 'Untitled'), COALESCE($2, ''), $3)
            RETURNING *
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(owner)
        .fetch_one(&self.pool)
        .await
    }

    /// Load one note with its access list; None if missing or soft-deleted
    pub async fn load_note(&self, note_id: Uuid) -> Result<Option<NoteRecord>, SqlxError> {
        let note = sqlx::query_as::<_, NoteRow>(
            "SELECT * FROM notes WHERE id = $1 AND deleted = FALSE",
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;

        let note = match note {
            Some(note) => note,
            None => return Ok(None),
        };

        let shares = sqlx::query_as::<_, NoteShareRow>(
            "SELECT * FROM note_shares WHERE note_id = $1 ORDER BY invited_at",
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(NoteRecord { note, shares }))
    }

    /// Notes owned by `subject`, most recently updated first
    pub async fn list_owned(&self, subject: &str) -> Result<Vec<NoteRow>, SqlxError> {
        sqlx::query_as::<_, NoteRow>(
            "SELECT * FROM notes WHERE owner = $1 AND deleted = FALSE ORDER BY updated_at DESC",
        )
        .bind(subject)
        .fetch_all(&self.pool)
        .await
    }

    /// Notes shared with `subject`, most recently updated first
    pub async fn list_shared(&self, subject: &str) -> Result<Vec<NoteRow>, SqlxError> {
        sqlx::query_as::<_, NoteRow>(
            r#"
            SELECT n.* FROM notes n
            JOIN note_shares s ON s.note_id = n.id
            WHERE s.subject = $1 AND n.deleted = FALSE
            ORDER BY n.updated_at DESC
            "#,
        )
        .bind(subject)
        .fetch_all(&self.pool)
        .await
    }

    /// Owner and share role of `subject` for one note; None if the note is
    /// missing or soft-deleted
    pub async fn access_for(
        &self,
        note_id: Uuid,
        subject: &str,
    ) -> Result<Option<NoteAccessRow>, SqlxError> {
        sqlx::query_as::<_, NoteAccessRow>(
            r#"
            SELECT n.owner, s.role
            FROM notes n
            LEFT JOIN note_shares s ON s.note_id = n.id AND s.subject = $2
            WHERE n.id = $1 AND n.deleted = FALSE
            "#,
        )
        .bind(note_id)
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
    }

    /// Current content of a note; None if missing or soft-deleted
    pub async fn load_content(&self, note_id: Uuid) -> Result<Option<String>, SqlxError> {
        let content: Option<(String,)> = sqlx::query_as(
            "SELECT content FROM notes WHERE id = $1 AND deleted = FALSE",
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(content.map(|(c,)| c))
    }

    /// Patch title and/or content; None if the note is missing or soft-deleted
    pub async fn update_note(
        &self,
        note_id: Uuid,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<Option<NoteRow>, SqlxError> {
        sqlx::query_as::<_, NoteRow>(
            r#"
            UPDATE notes
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                updated_at = NOW()
            WHERE id = $1 AND deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(note_id)
        .bind(title)
        .bind(content)
        .fetch_optional(&self.pool)
        .await
    }

    /// Overwrite a note's content (last write wins); returns affected rows
    pub async fn replace_content(&self, note_id: Uuid, content: &str) -> Result<u64, SqlxError> {
        let result = sqlx::query(
            "UPDATE notes SET content = $2, updated_at = NOW() WHERE id = $1 AND deleted = FALSE",
        )
        .bind(note_id)
        .bind(content)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark a note deleted; returns affected rows
    pub async fn soft_delete(&self, note_id: Uuid) -> Result<u64, SqlxError> {
        let result = sqlx::query(
            "UPDATE notes SET deleted = TRUE, updated_at = NOW() WHERE id = $1 AND deleted = FALSE",
        )
        .bind(note_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert or replace the share entry for `subject` on `note_id`
    pub async fn upsert_share(
        &self,
        note_id: Uuid,
        subject: &str,
        role: &str,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            INSERT INTO note_shares (note_id, subject, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (note_id, subject) DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(note_id)
        .bind(subject)
        .bind(role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
