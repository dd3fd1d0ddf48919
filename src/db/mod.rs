use sqlx::{
    Row,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use log::warn;
use std::str::FromStr;
use std::time::Duration;

use crate::models::Tallies;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The `poll_votes` table: one counter row per (poll, option).
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and creates the table. An in-memory URL lives only as
    /// long as its connection, so it is held to one connection that never
    /// idles out; otherwise each pooled connection would see its own empty
    /// database.
    pub async fn new(db_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let in_memory = is_memory_url(db_url);

        // Concurrent writers wait on the busy timeout instead of failing fast.
        let mut options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            if max_connections > 1 {
                warn!(
                    "{} is in-memory; using 1 connection instead of {}",
                    db_url, max_connections
                );
            }
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            pool_options = pool_options.max_connections(max_connections.max(1));
        }

        let pool = pool_options.connect_with(options).await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        // One counter per (poll, option); the unique pair is what the upserts
        // below conflict on
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_votes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_name TEXT NOT NULL,
                option_name TEXT NOT NULL,
                vote_count INTEGER NOT NULL DEFAULT 0 CHECK (vote_count >= 0),
                UNIQUE (poll_name, option_name)
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Inserts zero rows for missing (poll, option) pairs. Existing rows,
    /// including ones being incremented concurrently, are left alone.
    pub async fn ensure_poll(&self, poll_name: &str, options: &[String]) -> Result<(), sqlx::Error> {
        // All options of a poll appear together or not at all
        let mut tx = self.pool.begin().await?;

        for option in options {
            sqlx::query(
                r#"
                INSERT INTO poll_votes (poll_name, option_name, vote_count)
                VALUES (?, ?, 0)
                ON CONFLICT(poll_name, option_name) DO NOTHING
                "#,
            )
            .bind(poll_name)
            .bind(option)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Adds one vote in a single statement; the row is created if absent.
    pub async fn increment(&self, poll_name: &str, option_name: &str) -> Result<(), sqlx::Error> {
        // SQLite applies the +1 under its write lock, so racing voters can't
        // read the same count and overwrite each other
        sqlx::query(
            r#"
            INSERT INTO poll_votes (poll_name, option_name, vote_count)
            VALUES (?, ?, 1)
            ON CONFLICT(poll_name, option_name)
            DO UPDATE SET vote_count = vote_count + 1
            "#,
        )
        .bind(poll_name)
        .bind(option_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stored counts for one poll; an unknown poll comes back empty.
    pub async fn get_tallies(&self, poll_name: &str) -> Result<Tallies, sqlx::Error> {
        let tallies = sqlx::query(
            r#"
            SELECT option_name, vote_count
            FROM poll_votes
            WHERE poll_name = ?
            ORDER BY option_name
            "#,
        )
        .bind(poll_name)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            // The CHECK constraint keeps counts non-negative
            let count = row.get::<i64, _>("vote_count");
            (row.get::<String, _>("option_name"), count.max(0) as u64)
        })
        .collect();

        Ok(tallies)
    }
}

fn is_memory_url(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}
