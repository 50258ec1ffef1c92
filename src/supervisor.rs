// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The Supervisor: holds the fixed catalog of seven pipelines and drives
//! them through an endless polling loop, sleeping between turns and
//! observing shutdown signals at the turn boundary rather than mid-flight.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::denormalizer::DenormTarget;
use crate::id_mapper::IdMapperConfig;
use crate::loader::SearchIndex;
use crate::metrics::Metrics;
use crate::pipeline::{self, PipelineConfig};
use crate::retry::RetryPolicy;
use crate::source::{ForwardColumn, JoinColumn, JoinTable, SourceStore, SourceTable, TimestampField};
use crate::state::StateStore;

/// The mandatory seven-row pipeline catalog. Each row is an independent
/// `(source_table, target_index)` watermark; all five source tables feed
/// `movies`, while `person` and `genre` additionally feed their own index.
pub fn catalog() -> Vec<PipelineConfig> {
    vec![
        PipelineConfig {
            name: "film_work_movies",
            source_table: SourceTable::FilmWork,
            timestamp_field: TimestampField::UpdatedAt,
            forward_column: ForwardColumn::Id,
            id_mapper: IdMapperConfig::Direct,
            denorm_target: DenormTarget::Movies,
        },
        PipelineConfig {
            name: "person_movies",
            source_table: SourceTable::Person,
            timestamp_field: TimestampField::UpdatedAt,
            forward_column: ForwardColumn::Id,
            id_mapper: IdMapperConfig::Join {
                join_table: JoinTable::PersonFilmWork,
                join_field: JoinColumn::PersonId,
                select_field: JoinColumn::FilmWorkId,
            },
            denorm_target: DenormTarget::Movies,
        },
        PipelineConfig {
            name: "genre_movies",
            source_table: SourceTable::Genre,
            timestamp_field: TimestampField::UpdatedAt,
            forward_column: ForwardColumn::Id,
            id_mapper: IdMapperConfig::Join {
                join_table: JoinTable::GenreFilmWork,
                join_field: JoinColumn::GenreId,
                select_field: JoinColumn::FilmWorkId,
            },
            denorm_target: DenormTarget::Movies,
        },
        PipelineConfig {
            name: "person_film_work_movies",
            source_table: SourceTable::PersonFilmWork,
            timestamp_field: TimestampField::CreatedAt,
            forward_column: ForwardColumn::FilmWorkId,
            id_mapper: IdMapperConfig::Direct,
            denorm_target: DenormTarget::Movies,
        },
        PipelineConfig {
            name: "genre_film_work_movies",
            source_table: SourceTable::GenreFilmWork,
            timestamp_field: TimestampField::CreatedAt,
            forward_column: ForwardColumn::FilmWorkId,
            id_mapper: IdMapperConfig::Direct,
            denorm_target: DenormTarget::Movies,
        },
        PipelineConfig {
            name: "person_persons",
            source_table: SourceTable::Person,
            timestamp_field: TimestampField::CreatedAt,
            forward_column: ForwardColumn::Id,
            id_mapper: IdMapperConfig::Join {
                join_table: JoinTable::PersonFilmWork,
                join_field: JoinColumn::PersonId,
                select_field: JoinColumn::PersonId,
            },
            denorm_target: DenormTarget::Persons,
        },
        PipelineConfig {
            name: "genre_genres",
            source_table: SourceTable::Genre,
            timestamp_field: TimestampField::CreatedAt,
            forward_column: ForwardColumn::Id,
            id_mapper: IdMapperConfig::Join {
                join_table: JoinTable::GenreFilmWork,
                join_field: JoinColumn::GenreId,
                select_field: JoinColumn::GenreId,
            },
            denorm_target: DenormTarget::Genres,
        },
    ]
}

pub struct Supervisor {
    pipelines: Vec<PipelineConfig>,
    retry_policy: RetryPolicy,
    pg_batch_size: i64,
    es_batch_size: usize,
    poll_period: Duration,
}

impl Supervisor {
    pub fn new(config: &crate::config::Config) -> Self {
        Supervisor {
            pipelines: catalog(),
            retry_policy: RetryPolicy::from_config(config),
            pg_batch_size: config.pg_batch_size,
            es_batch_size: config.es_batch_size,
            poll_period: Duration::from_secs(config.poll_period),
        }
    }

    /// Runs the polling loop until a shutdown signal is observed between
    /// turns. Never returns early on a single pipeline's error: each
    /// pipeline's failure is isolated, logged, counted, and the next
    /// pipeline in the catalog still runs this turn.
    pub async fn run(
        &self,
        source: &dyn SourceStore,
        state: &dyn StateStore,
        index: &dyn SearchIndex,
        metrics: &Metrics,
    ) {
        loop {
            for pipeline in &self.pipelines {
                match pipeline::run_turn(
                    pipeline,
                    &self.retry_policy,
                    self.pg_batch_size,
                    self.es_batch_size,
                    source,
                    state,
                    index,
                    metrics,
                )
                .await
                {
                    Ok(report) if report.rows_fetched > 0 => {
                        info!(
                            pipeline = pipeline.name,
                            rows = report.rows_fetched,
                            indexed = report.docs_indexed,
                            "turn finished"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        metrics
                            .pipeline_errors
                            .with_label_values(&[pipeline.name, error_kind(&err)])
                            .inc();
                        error!(pipeline = pipeline.name, error = %err, "pipeline turn failed, will retry next poll");
                    }
                }
            }

            if wait_for_next_turn_or_shutdown(self.poll_period).await {
                warn!("shutdown signal observed, exiting poll loop");
                return;
            }
        }
    }
}

fn error_kind(err: &crate::error::ProjectorError) -> &'static str {
    use crate::error::ProjectorError::*;
    match err {
        SourceUnavailable(_) => "source_unavailable",
        StateUnavailable(_) => "state_unavailable",
        LoadUnavailable(_) => "load_unavailable",
        LoadPartial { .. } => "load_partial",
        Transform { .. } => "transform",
        Config(_) => "config",
    }
}

/// Sleeps for `period`, racing against `SIGINT`/`SIGTERM`. Returns `true`
/// if a shutdown signal fired first.
#[cfg(unix)]
async fn wait_for_next_turn_or_shutdown(period: Duration) -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::time::sleep(period) => false,
        _ = tokio::signal::ctrl_c() => true,
        _ = sigterm.recv() => true,
    }
}

#[cfg(not(unix))]
async fn wait_for_next_turn_or_shutdown(period: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(period) => false,
        _ = tokio::signal::ctrl_c() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_one_row_per_mandatory_pipeline() {
        let rows = catalog();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows.iter().filter(|p| p.denorm_target == DenormTarget::Movies).count(), 5);
        assert_eq!(rows.iter().filter(|p| p.denorm_target == DenormTarget::Persons).count(), 1);
        assert_eq!(rows.iter().filter(|p| p.denorm_target == DenormTarget::Genres).count(), 1);
    }
}
