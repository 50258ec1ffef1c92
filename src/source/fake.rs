// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`SourceStore`] used by pipeline-level tests. Holds the same
//! five tables the real schema has, plus pre-seeded denormalized rows, so
//! tests can drive a full pipeline turn without a live Postgres.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ExtractRequest, JoinRequest, SourceStore};
use crate::error::ProjectorError;
use crate::model::{DenormalizedGenre, DenormalizedMovie, DenormalizedPerson, SourceRow};

#[derive(Default)]
pub struct FakeSourceStore {
    /// Rows available to `fetch_changes`, already in `(ts, id)` order.
    pub rows: Mutex<Vec<SourceRow>>,
    /// `join_table -> (input id -> [output ids])`.
    pub joins: Mutex<HashMap<&'static str, HashMap<Uuid, Vec<Uuid>>>>,
    pub movies: Mutex<HashMap<Uuid, DenormalizedMovie>>,
    pub persons: Mutex<HashMap<Uuid, DenormalizedPerson>>,
    pub genres: Mutex<HashMap<Uuid, DenormalizedGenre>>,
    pub fail_fetch_once: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl SourceStore for FakeSourceStore {
    async fn fetch_changes(&self, req: &ExtractRequest) -> Result<Vec<SourceRow>, ProjectorError> {
        if self.fail_fetch_once.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(ProjectorError::SourceUnavailable(anyhow::anyhow!("simulated outage")));
        }
        let rows = self.rows.lock().unwrap();
        let wm = &req.watermark;
        let matching: Vec<SourceRow> = rows
            .iter()
            .filter(|r| (r.modified_at, r.id) > (wm.updated_at, wm.last_id))
            .take(req.batch_size as usize)
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn map_ids(&self, req: &JoinRequest) -> Result<Vec<Uuid>, ProjectorError> {
        let joins = self.joins.lock().unwrap();
        let Some(table) = joins.get(req.join_table.as_str()) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for id in &req.ids {
            if let Some(mapped) = table.get(id) {
                out.extend(mapped.iter().copied());
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn denormalize_movies(&self, ids: &[Uuid]) -> Result<Vec<DenormalizedMovie>, ProjectorError> {
        let movies = self.movies.lock().unwrap();
        Ok(ids.iter().filter_map(|id| movies.get(id).cloned()).collect())
    }

    async fn denormalize_persons(&self, ids: &[Uuid]) -> Result<Vec<DenormalizedPerson>, ProjectorError> {
        let persons = self.persons.lock().unwrap();
        Ok(ids.iter().filter_map(|id| persons.get(id).cloned()).collect())
    }

    async fn denormalize_genres(&self, ids: &[Uuid]) -> Result<Vec<DenormalizedGenre>, ProjectorError> {
        let genres = self.genres.lock().unwrap();
        Ok(ids.iter().filter_map(|id| genres.get(id).cloned()).collect())
    }
}
