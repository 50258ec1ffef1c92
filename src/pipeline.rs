// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A pipeline ties one source table to one destination index: Extractor →
//! IdMapper → Denormalizer → Transformer → Batcher → Loader, followed by
//! advancing the watermark if the turn made enough progress to be safe.

use tracing::{info, warn};

use crate::denormalizer::{self, DenormTarget, Denormalized};
use crate::error::ProjectorError;
use crate::id_mapper::{self, IdMapperConfig};
use crate::loader::{self, LoadReport, SearchIndex};
use crate::metrics::Metrics;
use crate::model::{DocumentBatch, SourceRow};
use crate::retry::{with_retry, RetryPolicy};
use crate::source::{ExtractRequest, ForwardColumn, SourceStore, SourceTable, TimestampField};
use crate::state::{self, StateStore};
use crate::transformer;

/// Static description of one `(source table, destination index)` pipeline.
/// Built once at startup from the fixed pipeline catalog; never constructed
/// from runtime input.
pub struct PipelineConfig {
    pub name: &'static str,
    pub source_table: SourceTable,
    pub timestamp_field: TimestampField,
    pub forward_column: ForwardColumn,
    pub id_mapper: IdMapperConfig,
    pub denorm_target: DenormTarget,
}

/// Outcome of a single pipeline turn, used by the Supervisor to decide
/// whether to log at `info` or `warn` and whether the watermark advanced.
#[derive(Debug)]
pub struct TurnReport {
    pub rows_fetched: usize,
    pub docs_indexed: usize,
    pub watermark_advanced: bool,
}

/// Runs one polling turn for a single pipeline.
///
/// A `Transform` error aborts the turn without advancing the watermark: the
/// same rows are retried on the next poll, since whatever made the document
/// invalid might be fixed by then and there is no way to skip just the bad
/// row without risking silently dropping it. A `LoadPartial` error, by
/// contrast, still allows the watermark to advance — the accepted documents
/// are already durable in the search engine, and retrying the whole batch
/// would duplicate (harmlessly, since indexing is idempotent by id) rather
/// than recover the rejected ones, which a schema mismatch would reject
/// again regardless.
pub async fn run_turn(
    config: &PipelineConfig,
    retry_policy: &RetryPolicy,
    pg_batch_size: i64,
    es_batch_size: usize,
    source: &dyn SourceStore,
    state: &dyn StateStore,
    index: &dyn SearchIndex,
    metrics: &Metrics,
) -> Result<TurnReport, ProjectorError> {
    let watermark = state::read_watermark(
        state,
        retry_policy,
        config.source_table.as_str(),
        config.denorm_target.index_name(),
    )
    .await?;

    let req = ExtractRequest {
        table: config.source_table,
        timestamp_field: config.timestamp_field,
        forward_column: config.forward_column,
        batch_size: pg_batch_size,
        watermark,
    };
    let rows = crate::extractor::extract(source, retry_policy, &req).await?;
    metrics.rows_fetched.with_label_values(&[config.name]).inc_by(rows.len() as u64);

    if rows.is_empty() {
        return Ok(TurnReport {
            rows_fetched: 0,
            docs_indexed: 0,
            watermark_advanced: false,
        });
    }

    let new_watermark = next_watermark(&rows);

    let ids = id_mapper::map_ids(source, retry_policy, &config.id_mapper, &rows).await?;
    let denormalized = denormalizer::denormalize(source, retry_policy, config.denorm_target, &ids).await?;
    let batch = transform_batch(denormalized)?;

    let mut docs_indexed = 0;
    let mut saw_partial = false;
    let mut last_partial: Option<ProjectorError> = None;

    for chunk in batch.into_chunks(es_batch_size) {
        let chunk_len = chunk.len();
        let result = with_retry(retry_policy, "loader.bulk_index", || {
            let chunk = chunk.clone();
            loader::load(index, chunk)
        })
        .await;
        match result {
            Ok(LoadReport { accepted, .. }) => docs_indexed += accepted.len(),
            Err(ProjectorError::LoadPartial { accepted, .. }) => {
                saw_partial = true;
                docs_indexed += accepted;
                warn!(pipeline = config.name, accepted, attempted = chunk_len, "bulk index partially rejected");
                last_partial = Some(ProjectorError::LoadPartial {
                    index: config.denorm_target.index_name().to_string(),
                    accepted,
                    accepted_plus_rejected: chunk_len,
                    rejected: Vec::new(),
                });
            }
            Err(other) => return Err(other),
        }
    }

    metrics.docs_indexed.with_label_values(&[config.name]).inc_by(docs_indexed as u64);

    state::write_watermark(
        state,
        retry_policy,
        config.source_table.as_str(),
        config.denorm_target.index_name(),
        &new_watermark,
    )
    .await?;

    info!(
        pipeline = config.name,
        rows = rows.len(),
        indexed = docs_indexed,
        "turn complete"
    );

    if saw_partial {
        // Surfaced for visibility; the watermark has already advanced above.
        if let Some(err) = last_partial {
            warn!(pipeline = config.name, error = %err, "turn advanced watermark despite partial load failure");
        }
    }

    Ok(TurnReport {
        rows_fetched: rows.len(),
        docs_indexed,
        watermark_advanced: true,
    })
}

fn next_watermark(rows: &[SourceRow]) -> crate::model::Watermark {
    let last = rows.last().expect("caller checked rows is non-empty");
    crate::model::Watermark {
        updated_at: last.modified_at,
        last_id: last.id,
    }
}

fn transform_batch(denormalized: Denormalized) -> Result<DocumentBatch, ProjectorError> {
    match denormalized {
        Denormalized::Movies(rows) => {
            let docs = rows
                .into_iter()
                .map(transformer::transform_movie)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DocumentBatch::Movies(docs))
        }
        Denormalized::Persons(rows) => {
            let docs = rows
                .into_iter()
                .map(transformer::transform_person)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DocumentBatch::Persons(docs))
        }
        Denormalized::Genres(rows) => {
            let docs = rows
                .into_iter()
                .map(transformer::transform_genre)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DocumentBatch::Genres(docs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fake::FakeSearchIndex;
    use crate::model::DenormalizedGenre;
    use crate::source::fake::FakeSourceStore;
    use crate::source::JoinColumn;
    use crate::state::fake::FakeStateStore;
    use uuid::Uuid;

    fn genre_pipeline() -> PipelineConfig {
        PipelineConfig {
            name: "genre_genres",
            source_table: SourceTable::Genre,
            timestamp_field: TimestampField::UpdatedAt,
            forward_column: ForwardColumn::Id,
            id_mapper: IdMapperConfig::Direct,
            denorm_target: DenormTarget::Genres,
        }
    }

    #[tokio::test]
    async fn empty_source_leaves_watermark_untouched() {
        let source = FakeSourceStore::default();
        let state = FakeStateStore::default();
        let index = FakeSearchIndex::default();
        let metrics = Metrics::new_for_test();
        let report = run_turn(
            &genre_pipeline(),
            &RetryPolicy::default(),
            1000,
            1000,
            &source,
            &state,
            &index,
            &metrics,
        )
        .await
        .unwrap();
        assert!(!report.watermark_advanced);
    }

    #[tokio::test]
    async fn full_turn_indexes_and_advances_watermark() {
        let source = FakeSourceStore::default();
        let state = FakeStateStore::default();
        let index = FakeSearchIndex::default();
        let metrics = Metrics::new_for_test();

        let id = Uuid::new_v4();
        *source.rows.lock().unwrap() = vec![crate::model::SourceRow {
            id,
            modified_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            forward_id: id,
        }];
        source.genres.lock().unwrap().insert(
            id,
            DenormalizedGenre {
                id,
                name: "Drama".into(),
                filmworks: vec![],
            },
        );

        let report = run_turn(
            &genre_pipeline(),
            &RetryPolicy::default(),
            1000,
            1000,
            &source,
            &state,
            &index,
            &metrics,
        )
        .await
        .unwrap();

        assert!(report.watermark_advanced);
        assert_eq!(report.docs_indexed, 1);
        let wm = state::read_watermark(&state, &RetryPolicy::default(), "genre", "genres")
            .await
            .unwrap();
        assert_eq!(wm.last_id, id);
    }

    #[tokio::test]
    async fn join_pipeline_fans_person_update_into_two_film_documents() {
        let source = FakeSourceStore::default();
        let state = FakeStateStore::default();
        let index = FakeSearchIndex::default();
        let metrics = Metrics::new_for_test();

        let person_id = Uuid::new_v4();
        let film_a = Uuid::new_v4();
        let film_b = Uuid::new_v4();
        *source.rows.lock().unwrap() = vec![crate::model::SourceRow {
            id: person_id,
            modified_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            forward_id: person_id,
        }];
        source.joins.lock().unwrap().insert(
            "person_film_work",
            [(person_id, vec![film_a, film_b])].into_iter().collect(),
        );
        for film in [film_a, film_b] {
            source.movies.lock().unwrap().insert(
                film,
                crate::model::DenormalizedMovie {
                    id: film,
                    title: "Film".into(),
                    description: None,
                    rating: None,
                    persons: vec![],
                    genres: vec![],
                },
            );
        }

        let pipeline = PipelineConfig {
            name: "person_movies",
            source_table: SourceTable::Person,
            timestamp_field: TimestampField::UpdatedAt,
            forward_column: ForwardColumn::Id,
            id_mapper: IdMapperConfig::Join {
                join_table: crate::source::JoinTable::PersonFilmWork,
                join_field: JoinColumn::PersonId,
                select_field: JoinColumn::FilmWorkId,
            },
            denorm_target: DenormTarget::Movies,
        };

        let report = run_turn(&pipeline, &RetryPolicy::default(), 1000, 1000, &source, &state, &index, &metrics)
            .await
            .unwrap();
        assert_eq!(report.docs_indexed, 2);
    }

    #[tokio::test]
    async fn blank_name_is_indexed_and_still_advances_watermark() {
        let source = FakeSourceStore::default();
        let state = FakeStateStore::default();
        let index = FakeSearchIndex::default();
        let metrics = Metrics::new_for_test();

        let id = Uuid::new_v4();
        *source.rows.lock().unwrap() = vec![crate::model::SourceRow {
            id,
            modified_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            forward_id: id,
        }];
        source.genres.lock().unwrap().insert(
            id,
            DenormalizedGenre {
                id,
                name: String::new(),
                filmworks: vec![],
            },
        );

        let report = run_turn(
            &genre_pipeline(),
            &RetryPolicy::default(),
            1000,
            1000,
            &source,
            &state,
            &index,
            &metrics,
        )
        .await
        .unwrap();
        assert!(report.watermark_advanced);
        assert_eq!(report.docs_indexed, 1);
        let wm = state::read_watermark(&state, &RetryPolicy::default(), "genre", "genres")
            .await
            .unwrap();
        assert_eq!(wm.last_id, id);
    }
}
