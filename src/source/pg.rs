// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_postgres::NoTls;
use uuid::Uuid;

use super::{queries, ExtractRequest, JoinRequest, SourceStore};
use crate::error::ProjectorError;
use crate::model::{
    DenormalizedGenre, DenormalizedMovie, DenormalizedPerson, FilmworkRef, GenreRef, PersonFilmRole, PersonOnFilm,
    Role, SourceRow,
};

fn parse_role(raw: &str) -> Result<Role, ProjectorError> {
    match raw {
        "actor" => Ok(Role::Actor),
        "director" => Ok(Role::Director),
        "writer" => Ok(Role::Writer),
        other => Err(ProjectorError::SourceUnavailable(anyhow::anyhow!(
            "unexpected role value in person_film_work: {other}"
        ))),
    }
}

#[derive(Deserialize)]
struct PersonOnFilmRaw {
    id: Uuid,
    full_name: String,
    role: String,
}

#[derive(Deserialize)]
struct GenreRefRaw {
    id: Uuid,
    name: String,
}

#[derive(Deserialize)]
struct PersonFilmRoleRaw {
    film_work_id: Uuid,
    role: String,
}

#[derive(Deserialize)]
struct FilmworkRefRaw {
    id: Uuid,
    title: String,
    rating: Option<f64>,
}

/// Production [`SourceStore`], backed by a pooled `tokio-postgres`
/// connection with an idle timeout rather than one connection per call.
#[derive(Clone)]
pub struct PgSourceStore {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PgSourceStore {
    pub async fn connect(postgres_url: &str) -> Result<Self, ProjectorError> {
        let config = postgres_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| ProjectorError::Config(format!("invalid --postgres-url: {e}")))?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder()
            .max_size(16)
            .idle_timeout(Some(std::time::Duration::from_secs(60)))
            .build(manager)
            .await
            .map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;
        Ok(PgSourceStore { pool })
    }

    /// Deserializes a nullable `jsonb` array column, normalizing `NULL`
    /// from the lateral join to an empty `Vec` rather than reaching the
    /// Transformer as `None`.
    fn jsonb_array<T: for<'de> Deserialize<'de>>(
        row: &tokio_postgres::Row,
        column: &str,
    ) -> Result<Vec<T>, ProjectorError> {
        let raw: Option<serde_json::Value> = row.try_get(column).map_err(|e| {
            ProjectorError::SourceUnavailable(anyhow::anyhow!("reading column {column}: {e}"))
        })?;
        match raw {
            None => Ok(Vec::new()),
            Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                ProjectorError::SourceUnavailable(anyhow::anyhow!("decoding column {column}: {e}"))
            }),
        }
    }
}

#[async_trait]
impl SourceStore for PgSourceStore {
    async fn fetch_changes(&self, req: &ExtractRequest) -> Result<Vec<SourceRow>, ProjectorError> {
        let conn = self.pool.get().await.map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;
        let sql = queries::extract_query(req);
        let rows = conn
            .query(
                &sql,
                &[
                    &req.watermark.updated_at,
                    &req.watermark.last_id,
                    &req.batch_size,
                ],
            )
            .await
            .map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;

        rows.into_iter()
            .map(|row| {
                let id: Uuid = row.try_get("id").map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;
                let modified_at: DateTime<Utc> = row
                    .try_get(req.timestamp_field.as_str())
                    .map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;
                let forward_id: Uuid = row
                    .try_get("forward_id")
                    .map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;
                Ok(SourceRow {
                    id,
                    modified_at,
                    forward_id,
                })
            })
            .collect()
    }

    async fn map_ids(&self, req: &JoinRequest) -> Result<Vec<Uuid>, ProjectorError> {
        if req.ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.pool.get().await.map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;
        let sql = queries::join_query(req);
        let rows = conn
            .query(&sql, &[&req.ids])
            .await
            .map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;
        rows.into_iter()
            .map(|row| row.try_get::<_, Uuid>("id").map_err(|e| ProjectorError::SourceUnavailable(e.into())))
            .collect()
    }

    async fn denormalize_movies(&self, ids: &[Uuid]) -> Result<Vec<DenormalizedMovie>, ProjectorError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.pool.get().await.map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;
        let rows = conn
            .query(queries::DENORMALIZE_MOVIES, &[&ids])
            .await
            .map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;

        rows.iter()
            .map(|row| {
                let persons: Vec<PersonOnFilmRaw> = Self::jsonb_array(row, "persons")?;
                let genres: Vec<GenreRefRaw> = Self::jsonb_array(row, "genres")?;
                Ok(DenormalizedMovie {
                    id: row.try_get("id").map_err(|e| ProjectorError::SourceUnavailable(e.into()))?,
                    title: row.try_get("title").map_err(|e| ProjectorError::SourceUnavailable(e.into()))?,
                    description: row
                        .try_get("description")
                        .map_err(|e| ProjectorError::SourceUnavailable(e.into()))?,
                    rating: row.try_get("rating").map_err(|e| ProjectorError::SourceUnavailable(e.into()))?,
                    persons: persons
                        .into_iter()
                        .map(|p| {
                            Ok(PersonOnFilm {
                                id: p.id,
                                full_name: p.full_name,
                                role: parse_role(&p.role)?,
                            })
                        })
                        .collect::<Result<Vec<_>, ProjectorError>>()?,
                    genres: genres.into_iter().map(|g| GenreRef { id: g.id, name: g.name }).collect(),
                })
            })
            .collect()
    }

    async fn denormalize_persons(&self, ids: &[Uuid]) -> Result<Vec<DenormalizedPerson>, ProjectorError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.pool.get().await.map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;
        let rows = conn
            .query(queries::DENORMALIZE_PERSONS, &[&ids])
            .await
            .map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;

        rows.iter()
            .map(|row| {
                let films: Vec<PersonFilmRoleRaw> = Self::jsonb_array(row, "films")?;
                Ok(DenormalizedPerson {
                    id: row.try_get("id").map_err(|e| ProjectorError::SourceUnavailable(e.into()))?,
                    full_name: row.try_get("full_name").map_err(|e| ProjectorError::SourceUnavailable(e.into()))?,
                    films: films
                        .into_iter()
                        .map(|f| {
                            Ok(PersonFilmRole {
                                film_work_id: f.film_work_id,
                                role: parse_role(&f.role)?,
                            })
                        })
                        .collect::<Result<Vec<_>, ProjectorError>>()?,
                })
            })
            .collect()
    }

    async fn denormalize_genres(&self, ids: &[Uuid]) -> Result<Vec<DenormalizedGenre>, ProjectorError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.pool.get().await.map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;
        let rows = conn
            .query(queries::DENORMALIZE_GENRES, &[&ids])
            .await
            .map_err(|e| ProjectorError::SourceUnavailable(e.into()))?;

        rows.iter()
            .map(|row| {
                let filmworks: Vec<FilmworkRefRaw> = Self::jsonb_array(row, "filmworks")?;
                Ok(DenormalizedGenre {
                    id: row.try_get("id").map_err(|e| ProjectorError::SourceUnavailable(e.into()))?,
                    name: row.try_get("name").map_err(|e| ProjectorError::SourceUnavailable(e.into()))?,
                    filmworks: filmworks
                        .into_iter()
                        .map(|f| FilmworkRef {
                            id: f.id,
                            title: f.title,
                            rating: f.rating,
                        })
                        .collect(),
                })
            })
            .collect()
    }
}
