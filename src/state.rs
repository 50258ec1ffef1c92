// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The State Store: a durable, process-external key→string map holding
//! one watermark per `(source_table, target_index)` pair.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::ProjectorError;
use crate::model::Watermark;
use crate::retry::{with_retry, RetryPolicy};

/// Key grammar: `{table}.{index}.{field}`.
fn key(table: &str, index: &str, field: &str) -> String {
    format!("{table}.{index}.{field}")
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str, default: &str) -> Result<String, ProjectorError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ProjectorError>;
}

/// Reads the watermark for `(table, index)`, defaulting to the epoch /
/// zero-uuid pair when either key is absent. Each `get` goes through the
/// shared retry helper, same as the Extractor/IdMapper/Denormalizer: a
/// transient Redis blip is retried with backoff rather than failing the
/// turn outright.
pub async fn read_watermark(
    store: &dyn StateStore,
    policy: &RetryPolicy,
    table: &str,
    index: &str,
) -> Result<Watermark, ProjectorError> {
    let default = Watermark::default();
    let updated_at_key = key(table, index, "updated_at");
    let updated_at_default = default.updated_at.to_rfc3339();
    let last_id_key = key(table, index, "last_id");
    let last_id_default = default.last_id.to_string();

    let updated_at_raw = with_retry(policy, "state.get_updated_at", || {
        store.get(&updated_at_key, &updated_at_default)
    })
    .await?;
    let last_id_raw = with_retry(policy, "state.get_last_id", || {
        store.get(&last_id_key, &last_id_default)
    })
    .await?;

    let updated_at = DateTime::parse_from_rfc3339(&updated_at_raw)
        .map_err(|e| ProjectorError::StateUnavailable(anyhow::anyhow!("corrupt watermark timestamp: {e}")))?
        .with_timezone(&Utc);
    let last_id = Uuid::parse_str(&last_id_raw)
        .map_err(|e| ProjectorError::StateUnavailable(anyhow::anyhow!("corrupt watermark id: {e}")))?;

    Ok(Watermark { updated_at, last_id })
}

/// Persists a new watermark for `(table, index)`. Writes `last_id` before
/// `updated_at`: see DESIGN.md for why that order is the safe one when the
/// two writes are not atomic. Each `set` goes through the shared retry
/// helper, same as `read_watermark`.
pub async fn write_watermark(
    store: &dyn StateStore,
    policy: &RetryPolicy,
    table: &str,
    index: &str,
    watermark: &Watermark,
) -> Result<(), ProjectorError> {
    let last_id_key = key(table, index, "last_id");
    let last_id_value = watermark.last_id.to_string();
    with_retry(policy, "state.set_last_id", || store.set(&last_id_key, &last_id_value)).await?;

    let updated_at_key = key(table, index, "updated_at");
    let updated_at_value = watermark.updated_at.to_rfc3339();
    with_retry(policy, "state.set_updated_at", || {
        store.set(&updated_at_key, &updated_at_value)
    })
    .await?;
    Ok(())
}

/// Production `StateStore` backed by Redis. `ConnectionManager` is an
/// auto-reconnecting multiplexed connection, so a single instance is cloned
/// and shared across pipelines rather than opened per call.
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl RedisStateStore {
    pub async fn connect(redis_url: &str) -> Result<Self, ProjectorError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| ProjectorError::Config(format!("invalid --redis-host: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| ProjectorError::StateUnavailable(e.into()))?;
        Ok(RedisStateStore { conn })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str, default: &str) -> Result<String, ProjectorError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| ProjectorError::StateUnavailable(e.into()))?;
        Ok(value.unwrap_or_else(|| default.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ProjectorError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| ProjectorError::StateUnavailable(e.into()))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory `StateStore` for pipeline tests. `fail_next_get` lets a
    /// test simulate an outage on the next call.
    #[derive(Default)]
    pub struct FakeStateStore {
        entries: Mutex<HashMap<String, String>>,
        pub fail_next_get: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl StateStore for FakeStateStore {
        async fn get(&self, key: &str, default: &str) -> Result<String, ProjectorError> {
            if self
                .fail_next_get
                .swap(false, std::sync::atomic::Ordering::SeqCst)
            {
                return Err(ProjectorError::StateUnavailable(anyhow::anyhow!("simulated outage")));
            }
            let entries = self.entries.lock().unwrap();
            Ok(entries.get(key).cloned().unwrap_or_else(|| default.to_string()))
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), ProjectorError> {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(key.to_string(), value.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeStateStore;
    use super::*;

    #[tokio::test]
    async fn missing_keys_default_to_epoch() {
        let store = FakeStateStore::default();
        let watermark = read_watermark(&store, &RetryPolicy::default(), "film_work", "movies")
            .await
            .unwrap();
        assert_eq!(watermark, Watermark::default());
    }

    #[tokio::test]
    async fn round_trips_a_written_watermark() {
        let store = FakeStateStore::default();
        let watermark = Watermark {
            updated_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            last_id: Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap(),
        };
        write_watermark(&store, &RetryPolicy::default(), "film_work", "movies", &watermark)
            .await
            .unwrap();
        let read_back = read_watermark(&store, &RetryPolicy::default(), "film_work", "movies")
            .await
            .unwrap();
        assert_eq!(read_back, watermark);
    }

    #[tokio::test]
    async fn different_indices_over_the_same_table_do_not_clobber() {
        let store = FakeStateStore::default();
        let wm_movies = Watermark {
            updated_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            last_id: Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap(),
        };
        let wm_persons = Watermark {
            updated_at: "2024-02-02T00:00:00Z".parse().unwrap(),
            last_id: Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap(),
        };
        write_watermark(&store, &RetryPolicy::default(), "person", "movies", &wm_movies)
            .await
            .unwrap();
        write_watermark(&store, &RetryPolicy::default(), "person", "persons", &wm_persons)
            .await
            .unwrap();

        assert_eq!(
            read_watermark(&store, &RetryPolicy::default(), "person", "movies")
                .await
                .unwrap(),
            wm_movies
        );
        assert_eq!(
            read_watermark(&store, &RetryPolicy::default(), "person", "persons")
                .await
                .unwrap(),
            wm_persons
        );
    }

    #[tokio::test]
    async fn state_outage_is_retried_then_succeeds() {
        let store = FakeStateStore::default();
        store.fail_next_get.store(true, std::sync::atomic::Ordering::SeqCst);
        let watermark = read_watermark(&store, &RetryPolicy::default(), "film_work", "movies")
            .await
            .unwrap();
        assert_eq!(watermark, Watermark::default());
    }
}
