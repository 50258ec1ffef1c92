// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared exponential-backoff retry wrapper. Every call to an external
//! dependency (relational store, state store, search engine) goes through
//! [`with_retry`] instead of re-implementing a retry loop locally.

use std::future::Future;
use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use tracing::warn;

use crate::error::ProjectorError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_elapsed: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &crate::config::Config) -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(cfg.backoff_base_ms),
            max_delay: Duration::from_millis(cfg.backoff_max_ms),
            max_elapsed: Duration::from_secs(cfg.backoff_max_elapsed_secs),
            call_timeout: Duration::from_secs(cfg.call_timeout_secs),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            max_elapsed: Duration::from_millis(200),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Runs `op` under a per-call timeout, retrying with exponential backoff as
/// long as the returned error is [`ProjectorError::is_retryable`]. A
/// `Transform`/`Config`/`LoadPartial` error (or a timeout) is returned
/// immediately without retrying the former two; `LoadPartial` is not an
/// error path reached through this wrapper at all (it's a success value).
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, op: F) -> Result<T, ProjectorError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProjectorError>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.base_delay)
        .with_max_interval(policy.max_delay)
        .with_max_elapsed_time(Some(policy.max_elapsed))
        .build();

    retry(backoff, || {
        let fut = op();
        async {
            match tokio::time::timeout(policy.call_timeout, fut).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) if err.is_retryable() => {
                    warn!(call = label, error = %err, "retrying after transient error");
                    Err(backoff::Error::transient(err))
                }
                Ok(Err(err)) => Err(backoff::Error::permanent(err)),
                Err(_elapsed) => {
                    let err = ProjectorError::SourceUnavailable(anyhow::anyhow!(
                        "{label} timed out after {:?}",
                        policy.call_timeout
                    ));
                    warn!(call = label, "call timed out, retrying");
                    Err(backoff::Error::transient(err))
                }
            }
        }
    })
    .await
}
