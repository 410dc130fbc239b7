//! SQLite connection pool and schema.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const CREATE_APPOINTMENTS: &str = "CREATE TABLE IF NOT EXISTS appointments (
    id INTEGER PRIMARY KEY,
    location_id INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    notified_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
)";

/// Makes `record` idempotent and race-free across concurrent writers.
const IDENTITY_INDEX: &str = "idx_appointments_identity";

/// Open (creating if missing) the database at `database_url` and apply the
/// schema.
///
/// `sqlite::memory:` gets a single connection so every query sees the same
/// in-memory database.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = database_url.contains(":memory:");

    let mut options = SqliteConnectOptions::from_str(database_url)?
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
    if in_memory {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_options.connect_with(options).await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Bring the `appointments` table up to date.
///
/// Databases written by the older tool have a bare
/// `(id, location_id, start_time)` table with nullable columns, no
/// `notified_at` and possibly duplicate rows. Those are upgraded in place.
async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(CREATE_APPOINTMENTS).execute(&mut *tx).await?;

    let (has_notified_at,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM pragma_table_info('appointments') WHERE name = 'notified_at'",
    )
    .fetch_one(&mut *tx)
    .await?;

    if has_notified_at == 0 {
        tracing::info!("Adding notified_at to an older appointments table");
        sqlx::query("ALTER TABLE appointments ADD COLUMN notified_at TEXT")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE appointments
             SET notified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE notified_at IS NULL",
        )
        .execute(&mut *tx)
        .await?;
    }

    let (has_index,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?",
    )
    .bind(IDENTITY_INDEX)
    .fetch_one(&mut *tx)
    .await?;

    if has_index == 0 {
        let incomplete = sqlx::query(
            "DELETE FROM appointments WHERE location_id IS NULL OR start_time IS NULL",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let duplicates = sqlx::query(
            "DELETE FROM appointments
             WHERE id NOT IN (
                 SELECT MIN(id) FROM appointments GROUP BY location_id, start_time
             )",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if incomplete + duplicates > 0 {
            tracing::info!(incomplete, duplicates, "Removed unusable appointment rows");
        }

        sqlx::query(&format!(
            "CREATE UNIQUE INDEX {} ON appointments (location_id, start_time)",
            IDENTITY_INDEX
        ))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::debug!("Database schema up to date");
    Ok(())
}
