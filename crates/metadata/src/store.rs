//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::FileRow;
use crate::repos::FileRepo;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FileRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        // SQLite permits one writer at a time; a single connection serializes
        // access instead of surfacing lock errors under request concurrency.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        Self::with_pool(pool, query_timeout_secs).await
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> MetadataResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // The database lives only as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        Self::with_pool(pool, None).await
    }

    async fn with_pool(pool: Pool<Sqlite>, query_timeout_secs: Option<u64>) -> MetadataResult<Self> {
        let query_timeout_secs = query_timeout_secs.unwrap_or(600);
        let store = Self {
            pool,
            query_timeout: Duration::from_secs(query_timeout_secs),
        };
        store.migrate().await?;

        tracing::debug!(
            query_timeout_secs,
            "SQLite query timeout is advisory only; slow queries are logged, not cancelled"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run `query`, warning when it outlives the configured timeout.
    async fn timed<T>(
        &self,
        op: &'static str,
        query: impl Future<Output = MetadataResult<T>>,
    ) -> MetadataResult<T> {
        let started = Instant::now();
        let result = query.await;
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                op,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_secs = self.query_timeout.as_secs(),
                "Slow metadata query"
            );
        }
        result
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl FileRepo for SqliteStore {
    async fn insert_file(&self, row: &FileRow) -> MetadataResult<()> {
        let result = self
            .timed("insert_file", async {
                sqlx::query(
                    r#"
                    INSERT INTO files (
                        bucket, file_id, original_name, stored_name, content_type,
                        length, chunk_size, chunk_count, sha256, uploaded_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&row.bucket)
                .bind(row.file_id)
                .bind(&row.original_name)
                .bind(&row.stored_name)
                .bind(&row.content_type)
                .bind(row.length)
                .bind(row.chunk_size)
                .bind(row.chunk_count)
                .bind(&row.sha256)
                .bind(row.uploaded_at)
                .execute(&self.pool)
                .await
                .map_err(MetadataError::from)
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(MetadataError::Database(sqlx::Error::Database(db_err)))
                if db_err.is_unique_violation() =>
            {
                Err(MetadataError::AlreadyExists(format!(
                    "file {} in bucket {}",
                    row.file_id, row.bucket
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_file(&self, bucket: &str, file_id: Uuid) -> MetadataResult<Option<FileRow>> {
        self.timed("get_file", async {
            let row = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE bucket = ? AND file_id = ?",
            )
            .bind(bucket)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
        .await
    }

    async fn list_files(&self, bucket: &str) -> MetadataResult<Vec<FileRow>> {
        let mut rows = self
            .timed("list_files", async {
                let rows = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE bucket = ?")
                    .bind(bucket)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(rows)
            })
            .await?;

        // Timestamps are stored as text; order on the decoded values.
        rows.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        Ok(rows)
    }

    async fn delete_file(&self, bucket: &str, file_id: Uuid) -> MetadataResult<bool> {
        self.timed("delete_file", async {
            let result = sqlx::query("DELETE FROM files WHERE bucket = ? AND file_id = ?")
                .bind(bucket)
                .bind(file_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    bucket TEXT NOT NULL,
    file_id BLOB NOT NULL,
    original_name TEXT NOT NULL,
    stored_name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    length INTEGER NOT NULL CHECK (length >= 0),
    chunk_size INTEGER NOT NULL CHECK (chunk_size > 0),
    chunk_count INTEGER NOT NULL CHECK (chunk_count >= 0),
    sha256 TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,
    PRIMARY KEY (bucket, file_id)
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_files_stored_name ON files(bucket, stored_name);
"#;
