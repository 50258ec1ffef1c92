// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The IdMapper stage: converts the Extractor's rows into the set of
//! target entity ids the Denormalizer should re-assemble.

use tracing::debug;
use uuid::Uuid;

use crate::error::ProjectorError;
use crate::model::{unique_ids, SourceRow};
use crate::retry::{with_retry, RetryPolicy};
use crate::source::{JoinColumn, JoinRequest, JoinTable, SourceStore};

#[derive(Debug, Clone)]
pub enum IdMapperConfig {
    /// Forward `SourceRow::forward_id` as-is, deduplicated.
    Direct,
    /// Join the forwarded ids through a link table to discover the actual
    /// target entity ids (e.g. a changed person's film works).
    Join {
        join_table: JoinTable,
        join_field: JoinColumn,
        select_field: JoinColumn,
    },
}

/// Maps a batch of `SourceRow`s to target entity ids. An empty result (the
/// join matched nothing) is not an error — the Extractor still owns
/// advancing the watermark once the rest of the chain completes.
pub async fn map_ids(
    store: &dyn SourceStore,
    policy: &RetryPolicy,
    config: &IdMapperConfig,
    rows: &[SourceRow],
) -> Result<Vec<Uuid>, ProjectorError> {
    match config {
        IdMapperConfig::Direct => Ok(unique_ids(rows.iter().map(|r| r.forward_id))),
        IdMapperConfig::Join {
            join_table,
            join_field,
            select_field,
        } => {
            let ids = unique_ids(rows.iter().map(|r| r.forward_id));
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let req = JoinRequest {
                join_table: *join_table,
                join_field: *join_field,
                select_field: *select_field,
                ids,
            };
            let mapped = with_retry(policy, "id_mapper.map_ids", || store.map_ids(&req)).await?;
            if mapped.is_empty() {
                debug!(join_table = join_table.as_str(), "join matched no rows");
            }
            Ok(unique_ids(mapped))
        }
    }
}
