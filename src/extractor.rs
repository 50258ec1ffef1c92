// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The Extractor stage: polls one source table for rows modified since
//! the remembered watermark, bounded by a batch size.

use tracing::{debug, info};

use crate::error::ProjectorError;
use crate::model::SourceRow;
use crate::retry::{with_retry, RetryPolicy};
use crate::source::{ExtractRequest, SourceStore};

pub async fn extract(
    store: &dyn SourceStore,
    policy: &RetryPolicy,
    req: &ExtractRequest,
) -> Result<Vec<SourceRow>, ProjectorError> {
    let rows = with_retry(policy, "extractor.fetch_changes", || store.fetch_changes(req)).await?;

    if rows.is_empty() {
        debug!(table = req.table.as_str(), "no updated rows");
    } else {
        info!(
            table = req.table.as_str(),
            count = rows.len(),
            "fetched updated rows"
        );
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Watermark;
    use crate::source::fake::FakeSourceStore;
    use crate::source::{ForwardColumn, SourceTable, TimestampField};
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    fn row(ts: &str, id: &str) -> SourceRow {
        let id = Uuid::parse_str(id).unwrap();
        SourceRow {
            id,
            modified_at: ts.parse::<DateTime<Utc>>().unwrap(),
            forward_id: id,
        }
    }

    fn request(watermark: Watermark, batch_size: i64) -> ExtractRequest {
        ExtractRequest {
            table: SourceTable::FilmWork,
            timestamp_field: TimestampField::UpdatedAt,
            forward_column: ForwardColumn::Id,
            batch_size,
            watermark,
        }
    }

    #[tokio::test]
    async fn empty_source_yields_empty_batch() {
        let store = FakeSourceStore::default();
        let rows = extract(&store, &RetryPolicy::default(), &request(Watermark::default(), 1000))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn timestamp_tie_is_broken_by_id_not_lost() {
        // Two rows share updated_at, batch size 1. The first turn must
        // deliver the lexicographically-smaller id and nothing else.
        let store = FakeSourceStore::default();
        *store.rows.lock().unwrap() = vec![
            row("2024-01-01T00:00:00Z", "00000000-0000-0000-0000-000000000001"),
            row("2024-01-01T00:00:00Z", "00000000-0000-0000-0000-000000000002"),
        ];

        let first = extract(&store, &RetryPolicy::default(), &request(Watermark::default(), 1))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id.to_string(), "00000000-0000-0000-0000-000000000001");

        let watermark_after_first = Watermark {
            updated_at: first[0].modified_at,
            last_id: first[0].id,
        };
        let second = extract(&store, &RetryPolicy::default(), &request(watermark_after_first, 1))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id.to_string(), "00000000-0000-0000-0000-000000000002");
    }

    #[tokio::test]
    async fn batch_size_equal_to_remaining_rows_exits_cleanly() {
        let store = FakeSourceStore::default();
        *store.rows.lock().unwrap() = vec![
            row("2024-01-01T00:00:00Z", "00000000-0000-0000-0000-000000000001"),
            row("2024-01-02T00:00:00Z", "00000000-0000-0000-0000-000000000002"),
        ];
        let rows = extract(&store, &RetryPolicy::default(), &request(Watermark::default(), 2))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn row_at_epoch_timestamp_is_still_delivered() {
        let store = FakeSourceStore::default();
        *store.rows.lock().unwrap() = vec![row(
            "1970-01-01T00:00:00Z",
            "00000000-0000-0000-0000-000000000001",
        )];
        let rows = extract(&store, &RetryPolicy::default(), &request(Watermark::default(), 10))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn source_outage_is_retried_then_succeeds() {
        let store = FakeSourceStore::default();
        store
            .fail_fetch_once
            .store(true, std::sync::atomic::Ordering::SeqCst);
        *store.rows.lock().unwrap() = vec![row(
            "2024-01-01T00:00:00Z",
            "00000000-0000-0000-0000-000000000001",
        )];
        let rows = extract(&store, &RetryPolicy::default(), &request(Watermark::default(), 10))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
