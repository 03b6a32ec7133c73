//! Repository metadata and its persistent store.
//!
//! The pipeline reads the URL, branch and sync policy of a record and mutates only the status,
//! hash, timestamp, error and namespace fields.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use repograph_index::CodeNamespace;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::StoreError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    #[default]
    Pending,
    Cloning,
    Uploading,
    ScanningNamespaces,
    ParsingFiles,
    GeneratingGraph,
    Indexing,
    Completed,
    Error,
}

impl ScanStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Cloning => "CLONING",
            Self::Uploading => "UPLOADING",
            Self::ScanningNamespaces => "SCANNING_NAMESPACES",
            Self::ParsingFiles => "PARSING_FILES",
            Self::GeneratingGraph => "GENERATING_GRAPH",
            Self::Indexing => "INDEXING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        }
    }

    /// Progress percent implied by the status alone.
    #[must_use]
    pub fn percent(self) -> u8 {
        match self {
            Self::Pending | Self::Error => 0,
            Self::Cloning => 10,
            Self::Uploading => 25,
            Self::ScanningNamespaces => 40,
            Self::ParsingFiles => 55,
            Self::GeneratingGraph => 75,
            Self::Indexing => 90,
            Self::Completed => 100,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Waiting to be indexed",
            Self::Cloning => "Cloning repository",
            Self::Uploading => "Uploading checkout to mirror",
            Self::ScanningNamespaces => "Detecting code modules",
            Self::ParsingFiles => "Extracting symbols",
            Self::GeneratingGraph => "Writing knowledge graph",
            Self::Indexing => "Notifying search index",
            Self::Completed => "Indexing complete",
            Self::Error => "Indexing failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => Self::Pending,
            "CLONING" => Self::Cloning,
            "UPLOADING" => Self::Uploading,
            "SCANNING_NAMESPACES" => Self::ScanningNamespaces,
            "PARSING_FILES" => Self::ParsingFiles,
            "GENERATING_GRAPH" => Self::GeneratingGraph,
            "INDEXING" => Self::Indexing,
            "COMPLETED" => Self::Completed,
            "ERROR" => Self::Error,
            other => return Err(format!("unknown scan status: {other}")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub url: String,
    /// `None` means the provider's default branch.
    pub branch: Option<String>,
    pub status: ScanStatus,
    pub last_indexed_sha: Option<String>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_index_error: Option<String>,
    pub last_synced_sha: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_enabled: bool,
    pub sync_interval_minutes: u32,
    pub namespaces: Vec<CodeNamespace>,
}

impl Repository {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            branch: None,
            status: ScanStatus::Pending,
            last_indexed_sha: None,
            last_indexed_at: None,
            last_index_error: None,
            last_synced_sha: None,
            last_synced_at: None,
            sync_enabled: true,
            sync_interval_minutes: 15,
            namespaces: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    #[must_use]
    pub fn with_sync(mut self, enabled: bool, interval_minutes: u32) -> Self {
        self.sync_enabled = enabled;
        self.sync_interval_minutes = interval_minutes;
        self
    }
}

/// Key-based access to repository records.
pub trait RepositoryStore: Send + Sync {
    fn insert(&self, repo: &Repository) -> BoxFuture<'_, StoreResult<()>>;

    fn get(&self, id: &str) -> BoxFuture<'_, StoreResult<Option<Repository>>>;

    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<Repository>>>;

    fn list_sync_enabled(&self) -> BoxFuture<'_, StoreResult<Vec<Repository>>>;

    /// Returns whether a record was removed.
    fn delete(&self, id: &str) -> BoxFuture<'_, StoreResult<bool>>;

    fn set_status(&self, id: &str, status: ScanStatus) -> BoxFuture<'_, StoreResult<()>>;

    /// Status `ERROR` plus the error message.
    fn mark_failed(&self, id: &str, message: &str) -> BoxFuture<'_, StoreResult<()>>;

    /// Status `COMPLETED`, new indexed hash and timestamp, prior error cleared.
    fn mark_indexed(
        &self,
        id: &str,
        sha: &str,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<()>>;

    fn set_namespaces(
        &self,
        id: &str,
        namespaces: &[CodeNamespace],
    ) -> BoxFuture<'_, StoreResult<()>>;

    /// New remote hash observed: record it and flip status to `PENDING`.
    fn record_sync(&self, id: &str, sha: &str, at: DateTime<Utc>)
    -> BoxFuture<'_, StoreResult<()>>;
}

type RepositoryRow = (
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    i64,
    String,
);

const SELECT_COLUMNS: &str = "SELECT id, url, branch, status, last_indexed_sha, last_indexed_at, \
     last_index_error, last_synced_sha, last_synced_at, sync_enabled, sync_interval_minutes, \
     namespaces FROM repositories";

fn parse_time(id: &str, column: &'static str, raw: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Corrupt {
                id: id.to_owned(),
                column,
                message: e.to_string(),
            })
    })
    .transpose()
}

fn from_row(row: RepositoryRow) -> StoreResult<Repository> {
    let (
        id,
        url,
        branch,
        status,
        last_indexed_sha,
        last_indexed_at,
        last_index_error,
        last_synced_sha,
        last_synced_at,
        sync_enabled,
        sync_interval_minutes,
        namespaces,
    ) = row;
    let status = status.parse().map_err(|message| StoreError::Corrupt {
        id: id.clone(),
        column: "status",
        message,
    })?;
    Ok(Repository {
        last_indexed_at: parse_time(&id, "last_indexed_at", last_indexed_at)?,
        last_synced_at: parse_time(&id, "last_synced_at", last_synced_at)?,
        namespaces: serde_json::from_str(&namespaces)?,
        sync_interval_minutes: u32::try_from(sync_interval_minutes).unwrap_or(u32::MAX),
        id,
        url,
        branch,
        status,
        last_indexed_sha,
        last_index_error,
        last_synced_sha,
        sync_enabled,
    })
}

fn expect_updated(id: &str, result: &sqlx::sqlite::SqliteQueryResult) -> StoreResult<()> {
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(id.to_owned()));
    }
    Ok(())
}

/// `SQLite`-backed [`RepositoryStore`].
#[derive(Debug, Clone)]
pub struct SqliteRepositoryStore {
    pool: SqlitePool,
}

impl SqliteRepositoryStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `path` and initialize the schema. `:memory:` opens a
    /// private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot be created.
    pub async fn open(path: &str) -> StoreResult<Self> {
        let (url, max_connections) = if path == ":memory:" {
            ("sqlite::memory:".to_owned(), 1)
        } else {
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
            }
            (format!("sqlite:{path}?mode=rwc"), 5)
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// Create the `repositories` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn init(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS repositories (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                branch TEXT,
                status TEXT NOT NULL DEFAULT 'PENDING',
                last_indexed_sha TEXT,
                last_indexed_at TEXT,
                last_index_error TEXT,
                last_synced_sha TEXT,
                last_synced_at TEXT,
                sync_enabled INTEGER NOT NULL DEFAULT 1,
                sync_interval_minutes INTEGER NOT NULL DEFAULT 15,
                namespaces TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch(&self, filter: &str, id: Option<&str>) -> StoreResult<Vec<Repository>> {
        let sql = format!("{SELECT_COLUMNS} {filter} ORDER BY id");
        let mut query = sqlx::query_as::<_, RepositoryRow>(&sql);
        if let Some(id) = id {
            query = query.bind(id.to_owned());
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }
}

impl RepositoryStore for SqliteRepositoryStore {
    fn insert(&self, repo: &Repository) -> BoxFuture<'_, StoreResult<()>> {
        let repo = repo.clone();
        Box::pin(async move {
            let namespaces = serde_json::to_string(&repo.namespaces)?;
            let result = sqlx::query(
                "INSERT INTO repositories (id, url, branch, status, last_indexed_sha, \
                 last_indexed_at, last_index_error, last_synced_sha, last_synced_at, \
                 sync_enabled, sync_interval_minutes, namespaces) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(&repo.id)
            .bind(&repo.url)
            .bind(&repo.branch)
            .bind(repo.status.as_str())
            .bind(&repo.last_indexed_sha)
            .bind(repo.last_indexed_at.map(|t| t.to_rfc3339()))
            .bind(&repo.last_index_error)
            .bind(&repo.last_synced_sha)
            .bind(repo.last_synced_at.map(|t| t.to_rfc3339()))
            .bind(repo.sync_enabled)
            .bind(i64::from(repo.sync_interval_minutes))
            .bind(namespaces)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::AlreadyExists(repo.id));
            }
            Ok(())
        })
    }

    fn get(&self, id: &str) -> BoxFuture<'_, StoreResult<Option<Repository>>> {
        let id = id.to_owned();
        Box::pin(async move {
            Ok(self
                .fetch("WHERE id = ?", Some(&id))
                .await?
                .into_iter()
                .next())
        })
    }

    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<Repository>>> {
        Box::pin(async move { self.fetch("", None).await })
    }

    fn list_sync_enabled(&self) -> BoxFuture<'_, StoreResult<Vec<Repository>>> {
        Box::pin(async move { self.fetch("WHERE sync_enabled = 1", None).await })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StoreResult<bool>> {
        let id = id.to_owned();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM repositories WHERE id = ?")
                .bind(&id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn set_status(&self, id: &str, status: ScanStatus) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_owned();
        Box::pin(async move {
            let result = sqlx::query("UPDATE repositories SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(&id)
                .execute(&self.pool)
                .await?;
            expect_updated(&id, &result)
        })
    }

    fn mark_failed(&self, id: &str, message: &str) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_owned();
        let message = message.to_owned();
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE repositories SET status = 'ERROR', last_index_error = ? WHERE id = ?",
            )
            .bind(&message)
            .bind(&id)
            .execute(&self.pool)
            .await?;
            expect_updated(&id, &result)
        })
    }

    fn mark_indexed(
        &self,
        id: &str,
        sha: &str,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_owned();
        let sha = sha.to_owned();
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE repositories SET status = 'COMPLETED', last_indexed_sha = ?, \
                 last_indexed_at = ?, last_index_error = NULL WHERE id = ?",
            )
            .bind(&sha)
            .bind(at.to_rfc3339())
            .bind(&id)
            .execute(&self.pool)
            .await?;
            expect_updated(&id, &result)
        })
    }

    fn set_namespaces(
        &self,
        id: &str,
        namespaces: &[CodeNamespace],
    ) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_owned();
        let encoded = serde_json::to_string(namespaces);
        Box::pin(async move {
            let result = sqlx::query("UPDATE repositories SET namespaces = ? WHERE id = ?")
                .bind(encoded?)
                .bind(&id)
                .execute(&self.pool)
                .await?;
            expect_updated(&id, &result)
        })
    }

    fn record_sync(
        &self,
        id: &str,
        sha: &str,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.to_owned();
        let sha = sha.to_owned();
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE repositories SET last_synced_sha = ?, last_synced_at = ?, \
                 status = 'PENDING' WHERE id = ?",
            )
            .bind(&sha)
            .bind(at.to_rfc3339())
            .bind(&id)
            .execute(&self.pool)
            .await?;
            expect_updated(&id, &result)
        })
    }
}
