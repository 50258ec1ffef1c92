// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The Denormalizer stage: given a set of target entity ids, fetches each
//! entity together with the related rows its destination document needs,
//! in one round trip per entity kind.

use tracing::debug;
use uuid::Uuid;

use crate::error::ProjectorError;
use crate::model::{DenormalizedGenre, DenormalizedMovie, DenormalizedPerson};
use crate::retry::{with_retry, RetryPolicy};
use crate::source::SourceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenormTarget {
    Movies,
    Persons,
    Genres,
}

impl DenormTarget {
    pub fn index_name(&self) -> &'static str {
        match self {
            DenormTarget::Movies => "movies",
            DenormTarget::Persons => "persons",
            DenormTarget::Genres => "genres",
        }
    }
}

pub enum Denormalized {
    Movies(Vec<DenormalizedMovie>),
    Persons(Vec<DenormalizedPerson>),
    Genres(Vec<DenormalizedGenre>),
}

impl Denormalized {
    pub fn len(&self) -> usize {
        match self {
            Denormalized::Movies(v) => v.len(),
            Denormalized::Persons(v) => v.len(),
            Denormalized::Genres(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub async fn denormalize(
    store: &dyn SourceStore,
    policy: &RetryPolicy,
    target: DenormTarget,
    ids: &[Uuid],
) -> Result<Denormalized, ProjectorError> {
    if ids.is_empty() {
        debug!(target = target.index_name(), "no ids to denormalize");
        return Ok(match target {
            DenormTarget::Movies => Denormalized::Movies(Vec::new()),
            DenormTarget::Persons => Denormalized::Persons(Vec::new()),
            DenormTarget::Genres => Denormalized::Genres(Vec::new()),
        });
    }

    let label = match target {
        DenormTarget::Movies => "denormalizer.movies",
        DenormTarget::Persons => "denormalizer.persons",
        DenormTarget::Genres => "denormalizer.genres",
    };

    let out = match target {
        DenormTarget::Movies => {
            Denormalized::Movies(with_retry(policy, label, || store.denormalize_movies(ids)).await?)
        }
        DenormTarget::Persons => {
            Denormalized::Persons(with_retry(policy, label, || store.denormalize_persons(ids)).await?)
        }
        DenormTarget::Genres => {
            Denormalized::Genres(with_retry(policy, label, || store.denormalize_genres(ids)).await?)
        }
    };

    if out.len() < ids.len() {
        debug!(
            target = target.index_name(),
            requested = ids.len(),
            found = out.len(),
            "some ids had no matching row; entity was deleted between extraction and denormalization"
        );
    }
    Ok(out)
}
