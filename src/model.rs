// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Record types that cross stage boundaries. Every stage after the
//! Extractor operates on one of these explicit types rather than an
//! untyped row; the Transformer is the single place a raw database row
//! becomes a destination `*Document`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A role a person can hold on a film work. Mirrors the `role` check
/// constraint on `person_film_work`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Actor,
    Director,
    Writer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Actor => "actor",
            Role::Director => "director",
            Role::Writer => "writer",
        };
        f.write_str(s)
    }
}

/// A row returned by the Extractor, already reduced to what downstream
/// stages need: the `(modified_at, id)` cursor pair, and the column the
/// configured `IdMapper` forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub id: Uuid,
    pub modified_at: DateTime<Utc>,
    pub forward_id: Uuid,
}

/// The persisted `(timestamp, last_id)` cursor for one `(table, index)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    pub updated_at: DateTime<Utc>,
    pub last_id: Uuid,
}

impl Default for Watermark {
    fn default() -> Self {
        Watermark {
            updated_at: DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is representable"),
            last_id: Uuid::nil(),
        }
    }
}

impl Watermark {
    /// `(timestamp, id)` is a strict total order; used by tests to assert
    /// monotonicity of the persisted cursor.
    pub fn advances_past(&self, other: &Watermark) -> bool {
        (self.updated_at, self.last_id) > (other.updated_at, other.last_id)
    }
}

// --- Denormalized rows (one struct per destination index) -----------------

#[derive(Debug, Clone)]
pub struct PersonOnFilm {
    pub id: Uuid,
    pub full_name: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct GenreRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct DenormalizedMovie {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub persons: Vec<PersonOnFilm>,
    pub genres: Vec<GenreRef>,
}

#[derive(Debug, Clone)]
pub struct PersonFilmRole {
    pub film_work_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct DenormalizedPerson {
    pub id: Uuid,
    pub full_name: String,
    pub films: Vec<PersonFilmRole>,
}

#[derive(Debug, Clone)]
pub struct FilmworkRef {
    pub id: Uuid,
    pub title: String,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DenormalizedGenre {
    pub id: Uuid,
    pub name: String,
    pub filmworks: Vec<FilmworkRef>,
}

// --- Destination documents --------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDocument {
    pub id: Uuid,
    pub imdb_rating: Option<f64>,
    pub title: String,
    pub description: Option<String>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub directors_names: Vec<String>,
    pub genres_names: Vec<String>,
    pub actors: Vec<ObjectRef>,
    pub writers: Vec<ObjectRef>,
    pub directors: Vec<ObjectRef>,
    pub genres: Vec<ObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonDocument {
    pub id: Uuid,
    pub full_name: String,
    pub roles: Vec<Role>,
    pub film_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmworkSummary {
    pub id: Uuid,
    pub title: String,
    pub imdb_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreDocument {
    pub id: Uuid,
    pub name: String,
    pub filmworks: Vec<FilmworkSummary>,
}

/// A homogeneous batch of destination documents, tagged by which index they
/// belong to. Produced by the Transformer, consumed by the Batcher/Loader.
#[derive(Debug, Clone)]
pub enum DocumentBatch {
    Movies(Vec<MovieDocument>),
    Persons(Vec<PersonDocument>),
    Genres(Vec<GenreDocument>),
}

impl DocumentBatch {
    pub fn index_name(&self) -> &'static str {
        match self {
            DocumentBatch::Movies(_) => "movies",
            DocumentBatch::Persons(_) => "persons",
            DocumentBatch::Genres(_) => "genres",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DocumentBatch::Movies(v) => v.len(),
            DocumentBatch::Persons(v) => v.len(),
            DocumentBatch::Genres(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-chunks this batch into groups of at most `size`, preserving the
    /// tag and input order.
    pub fn into_chunks(self, size: usize) -> Vec<DocumentBatch> {
        match self {
            DocumentBatch::Movies(v) => crate::batcher::batches(v, size)
                .into_iter()
                .map(DocumentBatch::Movies)
                .collect(),
            DocumentBatch::Persons(v) => crate::batcher::batches(v, size)
                .into_iter()
                .map(DocumentBatch::Persons)
                .collect(),
            DocumentBatch::Genres(v) => crate::batcher::batches(v, size)
                .into_iter()
                .map(DocumentBatch::Genres)
                .collect(),
        }
    }

    /// `(id, json body)` pairs ready for the bulk loader.
    pub fn into_bulk_items(self) -> Vec<(Uuid, serde_json::Value)> {
        fn to_items<T: Serialize>(items: Vec<T>, id_of: impl Fn(&T) -> Uuid) -> Vec<(Uuid, serde_json::Value)> {
            items
                .into_iter()
                .map(|doc| {
                    let id = id_of(&doc);
                    (id, serde_json::to_value(doc).expect("document serializes"))
                })
                .collect()
        }
        match self {
            DocumentBatch::Movies(v) => to_items(v, |d| d.id),
            DocumentBatch::Persons(v) => to_items(v, |d| d.id),
            DocumentBatch::Genres(v) => to_items(v, |d| d.id),
        }
    }
}

pub fn unique_roles(roles: impl IntoIterator<Item = Role>) -> Vec<Role> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for role in roles {
        if seen.insert(role) {
            out.push(role);
        }
    }
    out
}

pub fn unique_ids(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if seen.insert(id) {
            out.push(id);
        }
    }
    out
}
