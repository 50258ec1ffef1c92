// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Everything that talks to the relational store: the Extractor's
//! changed-row query, the IdMapper's join query, and the Denormalizer's
//! three per-index lateral-join queries.

mod pg;
mod queries;

pub use pg::PgSourceStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ProjectorError;
use crate::model::{DenormalizedGenre, DenormalizedMovie, DenormalizedPerson, SourceRow, Watermark};

/// One of the five source tables in the pipeline catalog. A closed enum,
/// not a free-form string: the Extractor's `{table}` substitution is a
/// `match`, never user- or database-supplied text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTable {
    FilmWork,
    Person,
    Genre,
    PersonFilmWork,
    GenreFilmWork,
}

impl SourceTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTable::FilmWork => "film_work",
            SourceTable::Person => "person",
            SourceTable::Genre => "genre",
            SourceTable::PersonFilmWork => "person_film_work",
            SourceTable::GenreFilmWork => "genre_film_work",
        }
    }
}

/// Which timestamp column the Extractor orders by for a given pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampField {
    UpdatedAt,
    CreatedAt,
}

impl TimestampField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampField::UpdatedAt => "updated_at",
            TimestampField::CreatedAt => "created_at",
        }
    }
}

/// The column the Extractor forwards into `SourceRow::forward_id` — `id`
/// itself, or `film_work_id` for the two link-table pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardColumn {
    Id,
    FilmWorkId,
}

impl ForwardColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardColumn::Id => "id",
            ForwardColumn::FilmWorkId => "film_work_id",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub table: SourceTable,
    pub timestamp_field: TimestampField,
    pub forward_column: ForwardColumn,
    pub batch_size: i64,
    pub watermark: Watermark,
}

/// The two link tables the IdMapper's Join variant can query.
/// `join_field`/`select_field` name a column on that table; which
/// combinations are meaningful is fixed by the pipeline catalog in
/// `supervisor.rs`, never supplied at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTable {
    PersonFilmWork,
    GenreFilmWork,
}

impl JoinTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinTable::PersonFilmWork => "person_film_work",
            JoinTable::GenreFilmWork => "genre_film_work",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinColumn {
    PersonId,
    GenreId,
    FilmWorkId,
}

impl JoinColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinColumn::PersonId => "person_id",
            JoinColumn::GenreId => "genre_id",
            JoinColumn::FilmWorkId => "film_work_id",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub join_table: JoinTable,
    pub join_field: JoinColumn,
    pub select_field: JoinColumn,
    pub ids: Vec<Uuid>,
}

/// Everything a pipeline needs from the relational store. Implemented by
/// [`PgSourceStore`] in production and by an in-memory fake in tests, so the
/// Extractor/IdMapper/Denormalizer stages never depend on a live Postgres.
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn fetch_changes(&self, req: &ExtractRequest) -> Result<Vec<SourceRow>, ProjectorError>;
    async fn map_ids(&self, req: &JoinRequest) -> Result<Vec<Uuid>, ProjectorError>;
    async fn denormalize_movies(&self, ids: &[Uuid]) -> Result<Vec<DenormalizedMovie>, ProjectorError>;
    async fn denormalize_persons(&self, ids: &[Uuid]) -> Result<Vec<DenormalizedPerson>, ProjectorError>;
    async fn denormalize_genres(&self, ids: &[Uuid]) -> Result<Vec<DenormalizedGenre>, ProjectorError>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
