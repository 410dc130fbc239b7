//! Durable dedup store on SQLite.
//!
//! All SQLite read/write logic lives here. The scheduler consults
//! [`SqliteDedupStore::recorded_at`] before filtering a location's slots and
//! calls [`SqliteDedupStore::record`] for every slot it reported.
//!
//! Start times are stored as `YYYY-MM-DDTHH:MM:SS` text so the table stays
//! readable by external tooling between runs.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::slots::SlotKey;
use crate::store::DedupStore;

const STORED_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const NOTIFIED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A persisted notification marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub key: SlotKey,
    pub notified_at: String,
}

/// Repository for reading and writing dedup records to SQLite.
#[derive(Debug, Clone)]
pub struct SqliteDedupStore {
    pool: SqlitePool,
}

impl SqliteDedupStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent records first. `limit` is clamped to 1..=1000.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<NotificationRecord>, StoreError> {
        let limit = limit.clamp(1, 1000);

        let rows = sqlx::query(
            "SELECT location_id, start_time, notified_at
             FROM appointments
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .filter_map(|row| {
                use sqlx::Row;
                let location_id: i64 = row.try_get("location_id").ok()?;
                let start_time: String = row.try_get("start_time").ok()?;
                let notified_at: Option<String> = row.try_get("notified_at").ok()?;

                Some(NotificationRecord {
                    key: SlotKey {
                        location_id: u32::try_from(location_id).ok()?,
                        start_time: parse_stored(&start_time)?,
                    },
                    notified_at: notified_at.unwrap_or_default(),
                })
            })
            .collect();

        Ok(records)
    }
}

fn format_stored(time: &NaiveDateTime) -> String {
    time.format(STORED_TIME_FORMAT).to_string()
}

fn parse_stored(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, STORED_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .ok()
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    async fn contains(&self, key: &SlotKey) -> Result<bool, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM appointments WHERE location_id = ? AND start_time = ?",
        )
        .bind(i64::from(key.location_id))
        .bind(format_stored(&key.start_time))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 > 0)
    }

    async fn record(&self, key: &SlotKey) -> Result<bool, StoreError> {
        // Explicit: tables upgraded from the older tool have no column default.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO appointments (location_id, start_time, notified_at)
             VALUES (?, ?, ?)",
        )
        .bind(i64::from(key.location_id))
        .bind(format_stored(&key.start_time))
        .bind(Utc::now().format(NOTIFIED_AT_FORMAT).to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn recorded_at(&self, location_id: u32) -> Result<HashSet<SlotKey>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT start_time FROM appointments WHERE location_id = ?")
                .bind(i64::from(location_id))
                .fetch_all(&self.pool)
                .await?;

        let keys = rows
            .into_iter()
            .filter_map(|(start_time,)| {
                let parsed = parse_stored(&start_time);
                if parsed.is_none() {
                    tracing::warn!(location_id, start_time = %start_time, "Ignoring unreadable dedup record");
                }
                parsed
            })
            .map(|start_time| SlotKey {
                location_id,
                start_time,
            })
            .collect();

        Ok(keys)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM appointments")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.max(0) as u64)
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM appointments")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::db::create_pool;

    async fn make_store() -> SqliteDedupStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        SqliteDedupStore::new(pool)
    }

    fn key(location_id: u32, s: &str) -> SlotKey {
        SlotKey {
            location_id,
            start_time: NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap(),
        }
    }

    #[tokio::test]
    async fn cold_store_contains_nothing() {
        let store = make_store().await;
        assert!(!store.contains(&key(5140, "2024-03-01T08:00")).await.unwrap());
        assert!(store.recorded_at(5140).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_then_contains() {
        let store = make_store().await;
        let k = key(5140, "2024-03-01T08:00");

        assert!(store.record(&k).await.unwrap());

        assert!(store.contains(&k).await.unwrap());
        assert!(!store.contains(&key(5140, "2024-03-01T08:15")).await.unwrap());
        assert!(!store.contains(&key(5141, "2024-03-01T08:00")).await.unwrap());
    }

    #[tokio::test]
    async fn record_twice_is_a_noop() {
        let store = make_store().await;
        let k = key(5140, "2024-03-01T08:00");

        assert!(store.record(&k).await.unwrap());
        assert!(!store.record(&k).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recorded_at_returns_only_that_location() {
        let store = make_store().await;
        store.record(&key(1, "2024-03-01T08:00")).await.unwrap();
        store.record(&key(1, "2024-03-02T08:00")).await.unwrap();
        store.record(&key(2, "2024-03-01T08:00")).await.unwrap();

        let keys = store.recorded_at(1).await.unwrap();

        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&key(1, "2024-03-02T08:00")));
    }

    #[tokio::test]
    async fn database_left_by_older_tool_is_upgraded_and_usable() {
        use std::str::FromStr;

        use sqlx::sqlite::SqliteConnectOptions;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ttp.db").display());

        {
            let options = SqliteConnectOptions::from_str(&url)
                .unwrap()
                .create_if_missing(true);
            let legacy = SqlitePool::connect_with(options).await.unwrap();
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS appointments
                 (id INTEGER PRIMARY KEY, location_id INTEGER, start_time TEXT)",
            )
            .execute(&legacy)
            .await
            .unwrap();
            for start_time in ["2024-03-01T08:00:00", "2024-03-01T08:00:00", "2024-03-02T10:30:00"] {
                sqlx::query("INSERT INTO appointments (location_id, start_time) VALUES (?, ?)")
                    .bind(5140_i64)
                    .bind(start_time)
                    .execute(&legacy)
                    .await
                    .unwrap();
            }
            legacy.close().await;
        }

        let store = SqliteDedupStore::new(create_pool(&url).await.unwrap());

        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.contains(&key(5140, "2024-03-01T08:00")).await.unwrap());
        assert!(!store.record(&key(5140, "2024-03-02T10:30")).await.unwrap());

        assert!(store.record(&key(5140, "2024-03-03T07:45")).await.unwrap());
        let history = store.list_recent(10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].key, key(5140, "2024-03-03T07:45"));
        assert!(history.iter().all(|record| record.notified_at.ends_with('Z')));
    }

    #[tokio::test]
    async fn rows_written_by_older_tooling_are_understood() {
        let store = make_store().await;
        sqlx::query("INSERT INTO appointments (location_id, start_time) VALUES (?, ?)")
            .bind(7_i64)
            .bind("2024-03-01T08:00:00")
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store.contains(&key(7, "2024-03-01T08:00")).await.unwrap());
        assert_eq!(store.recorded_at(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_recent_newest_first_with_timestamp() {
        let store = make_store().await;
        store.record(&key(1, "2024-03-01T08:00")).await.unwrap();
        store.record(&key(1, "2024-03-01T09:00")).await.unwrap();

        let records = store.list_recent(10).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, key(1, "2024-03-01T09:00"));
        assert!(!records[0].notified_at.is_empty());
    }

    #[tokio::test]
    async fn clear_empties_table() {
        let store = make_store().await;
        store.record(&key(1, "2024-03-01T08:00")).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn records_survive_reopening_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ttp.db").display());
        let k = key(5140, "2024-03-01T08:00");

        {
            let store = SqliteDedupStore::new(create_pool(&url).await.unwrap());
            store.record(&k).await.unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteDedupStore::new(create_pool(&url).await.unwrap());
        assert!(reopened.contains(&k).await.unwrap());
    }
}
