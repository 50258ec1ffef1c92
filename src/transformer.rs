// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The Transformer stage: pure functions reshaping a denormalized row
//! into its destination document. This is the one place an untyped
//! database row crosses into a typed document.
//!
//! Structural invariants (non-null arrays, valid roles, valid ids) are
//! already enforced by the type system before a value reaches these
//! functions, so they return `Result` for interface parity with
//! `transform_batch`'s `collect::<Result<Vec<_>, _>>()` but have no
//! reachable error path today. `title`/`full_name`/`name` being empty is
//! not rejected: the destination schema requires the field be present,
//! not non-empty, and the source daemon this was ported from accepts
//! empty strings without complaint.

use uuid::Uuid;

use crate::error::ProjectorError;
use crate::model::{
    unique_ids, unique_roles, DenormalizedGenre, DenormalizedMovie, DenormalizedPerson, FilmworkSummary,
    GenreDocument, MovieDocument, ObjectRef, PersonDocument, Role,
};

pub fn transform_movie(movie: DenormalizedMovie) -> Result<MovieDocument, ProjectorError> {
    let mut actors = Vec::new();
    let mut writers = Vec::new();
    let mut directors = Vec::new();
    let mut actors_names = Vec::new();
    let mut writers_names = Vec::new();
    let mut directors_names = Vec::new();

    for person in &movie.persons {
        let ref_ = ObjectRef {
            id: person.id,
            name: person.full_name.clone(),
        };
        match person.role {
            Role::Actor => {
                actors_names.push(person.full_name.clone());
                actors.push(ref_);
            }
            Role::Writer => {
                writers_names.push(person.full_name.clone());
                writers.push(ref_);
            }
            Role::Director => {
                directors_names.push(person.full_name.clone());
                directors.push(ref_);
            }
        }
    }

    let genres_names = movie.genres.iter().map(|g| g.name.clone()).collect();
    let genres = movie
        .genres
        .into_iter()
        .map(|g| ObjectRef { id: g.id, name: g.name })
        .collect();

    Ok(MovieDocument {
        id: movie.id,
        imdb_rating: movie.rating,
        title: movie.title,
        description: movie.description,
        actors_names,
        writers_names,
        directors_names,
        genres_names,
        actors,
        writers,
        directors,
        genres,
    })
}

pub fn transform_person(person: DenormalizedPerson) -> Result<PersonDocument, ProjectorError> {
    let film_ids: Vec<Uuid> = unique_ids(person.films.iter().map(|f| f.film_work_id));
    let roles: Vec<Role> = unique_roles(person.films.iter().map(|f| f.role));

    Ok(PersonDocument {
        id: person.id,
        full_name: person.full_name,
        roles,
        film_ids,
    })
}

pub fn transform_genre(genre: DenormalizedGenre) -> Result<GenreDocument, ProjectorError> {
    let filmworks = genre
        .filmworks
        .into_iter()
        .map(|f| FilmworkSummary {
            id: f.id,
            title: f.title,
            imdb_rating: f.rating,
        })
        .collect();

    Ok(GenreDocument {
        id: genre.id,
        name: genre.name,
        filmworks,
    })
}
