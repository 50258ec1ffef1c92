// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Command-line surface. Every flag is also settable through its
//! environment variable, following the same `clap` `env` convention as
//! `sui-indexer`. `Config` is parsed once in `main` and passed down as
//! plain data — nothing downstream re-reads the environment or argv.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "search-projector",
    author,
    version,
    about = "Incremental change-propagation daemon: projects a normalized relational store into denormalized search documents."
)]
pub struct Config {
    /// URL of the PostgreSQL-compatible relational store.
    #[arg(long, env = "POSTGRES_URL", default_value = "postgresql://localhost:5432/")]
    pub postgres_url: String,

    /// URL of the Elasticsearch-compatible search engine.
    #[arg(long, env = "ELASTIC_URL", default_value = "http://localhost:9200")]
    pub elastic_url: String,

    /// Host of the Redis-compatible state store.
    #[arg(long, env = "REDIS_HOST", default_value = "localhost")]
    pub redis_host: String,

    /// Seconds to sleep between Supervisor polling turns.
    #[arg(long, env = "POLL_PERIOD", default_value_t = 2)]
    pub poll_period: u64,

    /// Source fetch batch size (the Extractor's `LIMIT`).
    #[arg(long = "pg-batch", env = "PG_BATCH", default_value_t = 1000)]
    pub pg_batch_size: i64,

    /// Bulk index batch size (the Batcher's group size).
    #[arg(long = "es-batch", env = "ES_BATCH", default_value_t = 1000)]
    pub es_batch_size: usize,

    /// Initial backoff delay, in milliseconds.
    #[arg(long, env = "BACKOFF_BASE_MS", default_value_t = 200)]
    pub backoff_base_ms: u64,

    /// Cap on a single backoff delay, in milliseconds.
    #[arg(long, env = "BACKOFF_MAX_MS", default_value_t = 30_000)]
    pub backoff_max_ms: u64,

    /// Total time a retryable error is allowed to consume before a turn
    /// aborts, in seconds.
    #[arg(long, env = "BACKOFF_MAX_ELAPSED_SECS", default_value_t = 60)]
    pub backoff_max_elapsed_secs: u64,

    /// Per-external-call timeout, in seconds.
    #[arg(long, env = "CALL_TIMEOUT_SECS", default_value_t = 10)]
    pub call_timeout_secs: u64,

    /// Port for the Prometheus metrics exporter. `0` disables it.
    #[arg(long, env = "METRICS_PORT", default_value_t = 9184)]
    pub metrics_port: u16,
}

impl Config {
    pub fn redis_url(&self) -> String {
        format!("redis://{}", self.redis_host)
    }

    pub fn validate(&self) -> Result<(), crate::error::ProjectorError> {
        if self.pg_batch_size <= 0 {
            return Err(crate::error::ProjectorError::Config(
                "--pg-batch must be positive".into(),
            ));
        }
        if self.es_batch_size == 0 {
            return Err(crate::error::ProjectorError::Config(
                "--es-batch must be positive".into(),
            ));
        }
        url::Url::parse(&self.postgres_url)
            .map_err(|e| crate::error::ProjectorError::Config(format!("invalid --postgres-url: {e}")))?;
        url::Url::parse(&self.elastic_url)
            .map_err(|e| crate::error::ProjectorError::Config(format!("invalid --elastic-url: {e}")))?;
        Ok(())
    }
}
