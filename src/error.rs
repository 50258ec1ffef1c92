// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use uuid::Uuid;

/// Errors raised by any pipeline stage. The variant determines the retry
/// policy applied by [`crate::retry::with_retry`].
#[derive(Debug, thiserror::Error)]
pub enum ProjectorError {
    #[error("relational store unavailable: {0}")]
    SourceUnavailable(#[source] anyhow::Error),

    #[error("state store unavailable: {0}")]
    StateUnavailable(#[source] anyhow::Error),

    #[error("search engine unavailable: {0}")]
    LoadUnavailable(#[source] anyhow::Error),

    /// A bulk index request was accepted by the search engine but one or
    /// more items were rejected. Not `Err` in the usual sense: callers treat
    /// this as a successful turn for progress purposes.
    #[error("{accepted} of {accepted_plus_rejected} documents indexed into {index}; {} rejected", rejected.len())]
    LoadPartial {
        index: String,
        accepted: usize,
        accepted_plus_rejected: usize,
        rejected: Vec<(Uuid, String)>,
    },

    #[error("document {id} failed schema validation for index {index}: {reason}")]
    Transform {
        index: String,
        id: Uuid,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ProjectorError {
    /// Whether this error is one of the bounded-retry kinds, as opposed to
    /// a fatal error that should abort the turn immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProjectorError::SourceUnavailable(_)
                | ProjectorError::StateUnavailable(_)
                | ProjectorError::LoadUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProjectorError>;
