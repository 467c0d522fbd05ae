//! # Umbra storage
//!
//! SQLite persistence behind the resolver: blocked domains, subscribed
//! source URLs, and the query history. One pool with a single
//! connection serializes writers; every insert is conflict-ignoring so
//! re-ingesting a hostfile is idempotent.
//!
//! Iteration over domains and sources is keyset-paginated (`id > last
//! ORDER BY id LIMIT 100`) because both tables reach tens of thousands
//! of rows and offset pagination would rescan them quadratically.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Rows fetched per iteration chunk.
const CHUNK_SIZE: i64 = 100;

/// How often the history trim runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database file could not be opened.
    #[error("unable to open database {path}: {source}")]
    Open {
        /// Path that failed to open.
        path: String,
        /// Driver error.
        source: sqlx::Error,
    },

    /// Schema migration failed.
    #[error("unable to migrate database: {0}")]
    Migrate(#[source] sqlx::Error),

    /// Any other statement failed.
    #[error("storage query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// A query history row ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    /// Queried domain.
    pub domain: String,
    /// Query type mnemonic (`A`, `AAAA`, ...).
    pub qtype: String,
    /// Outcome: `cached`, `blocked`, `failed`, or `resolved`.
    pub status: String,
    /// Client host address.
    pub client_addr: String,
}

const MIGRATION: &str = "
CREATE TABLE IF NOT EXISTS domains (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  domain TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS domains_domain_ux
ON domains (domain);

CREATE TABLE IF NOT EXISTS sources (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  url TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS sources_url_ux
ON sources (url);

CREATE TABLE IF NOT EXISTS history (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  domain TEXT,
  type TEXT,
  status TEXT,
  client_addr TEXT,
  created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
";

/// The persistent store.
pub struct Store {
    pool: SqlitePool,
    history_size: i64,
}

impl Store {
    /// Opens (creating if needed) the database file at `path`.
    ///
    /// The pool is limited to one connection; SQLite has a single
    /// writer anyway and the callers expect serialized statements.
    pub async fn open(path: &str, history_size: u32) -> Result<Self> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(|source| StoreError::Open {
                path: path.to_string(),
                source,
            })?;

        Ok(Self::from_pool(pool, history_size))
    }

    /// Opens an in-memory database.
    pub async fn open_in_memory(history_size: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|source| StoreError::Open {
                path: ":memory:".to_string(),
                source,
            })?;

        Ok(Self::from_pool(pool, history_size))
    }

    fn from_pool(pool: SqlitePool, history_size: u32) -> Self {
        Self {
            pool,
            history_size: i64::from(history_size),
        }
    }

    /// Creates the schema. Safe to run on every start.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Migrate)?;
        Ok(())
    }

    /// Bulk-inserts domains, ignoring ones already present.
    pub async fn add_domains(&self, domains: &[String]) -> Result<()> {
        if domains.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO domains (domain) ");
        builder.push_values(domains, |mut row, domain| {
            row.push_bind(domain);
        });
        builder.push(" ON CONFLICT DO NOTHING");

        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Inserts a source URL, ignoring it if already present.
    pub async fn add_source(&self, url: &str) -> Result<()> {
        sqlx::query("INSERT INTO sources (url) VALUES (?) ON CONFLICT (url) DO NOTHING")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bulk-inserts history rows.
    pub async fn add_history_records(&self, records: &[HistoryRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO history (domain, type, status, client_addr) ");
        builder.push_values(records, |mut row, record| {
            row.push_bind(&record.domain)
                .push_bind(&record.qtype)
                .push_bind(&record.status)
                .push_bind(&record.client_addr);
        });

        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Calls `f` once per stored domain, in insertion order.
    pub async fn for_each_domain(&self, mut f: impl FnMut(&str)) -> Result<()> {
        self.for_each_row("SELECT id, domain FROM domains WHERE id > ? ORDER BY id LIMIT ?", &mut f)
            .await
    }

    /// Calls `f` once per stored source URL, in insertion order.
    pub async fn for_each_source(&self, mut f: impl FnMut(&str)) -> Result<()> {
        self.for_each_row("SELECT id, url FROM sources WHERE id > ? ORDER BY id LIMIT ?", &mut f)
            .await
    }

    async fn for_each_row(&self, query: &str, f: &mut impl FnMut(&str)) -> Result<()> {
        let mut last_id = 0i64;

        loop {
            let rows: Vec<(i64, String)> = sqlx::query_as(query)
                .bind(last_id)
                .bind(CHUNK_SIZE)
                .fetch_all(&self.pool)
                .await?;

            let handled = rows.len() as i64;
            for (id, value) in rows {
                f(&value);
                last_id = id;
            }

            if handled < CHUNK_SIZE {
                return Ok(());
            }
        }
    }

    /// Deletes all history rows older than the newest `skip` rows.
    pub async fn cleanup(&self, skip: i64) -> Result<()> {
        let boundary: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM history ORDER BY id DESC LIMIT 1 OFFSET ?")
                .bind(skip)
                .fetch_optional(&self.pool)
                .await?;

        // Fewer rows than the cap: nothing to trim.
        let Some((id,)) = boundary else {
            return Ok(());
        };

        sqlx::query("DELETE FROM history WHERE id < ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts stored history rows.
    pub async fn history_len(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Spawns the periodic history trim; runs every five minutes until
    /// `shutdown` fires, keeping only the newest `history_size` rows.
    pub fn run_periodic_cleanup(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("running periodic history cleanup");
                        if let Err(error) = store.cleanup(store.history_size).await {
                            error!(error = %error, "unable to clean up history");
                        }
                    }
                    _ = shutdown.recv() => return,
                }
            }
        })
    }
}
