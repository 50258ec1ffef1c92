// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use search_projector::config::Config;
use search_projector::loader::ElasticLoader;
use search_projector::metrics::Metrics;
use search_projector::source::PgSourceStore;
use search_projector::state::RedisStateStore;
use search_projector::supervisor::Supervisor;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = Config::parse();
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        return ExitCode::from(2);
    }

    let source = match PgSourceStore::connect(&config.postgres_url).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to the relational store");
            return ExitCode::from(1);
        }
    };

    let state = match RedisStateStore::connect(&config.redis_url()).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to the state store");
            return ExitCode::from(1);
        }
    };

    let index = match ElasticLoader::new(&config.elastic_url) {
        Ok(loader) => loader,
        Err(e) => {
            tracing::error!(error = %e, "invalid search engine configuration");
            return ExitCode::from(2);
        }
    };

    let metrics = Arc::new(Metrics::new());
    if config.metrics_port != 0 {
        let metrics_for_server = metrics.clone();
        let port = config.metrics_port;
        tokio::spawn(async move { metrics_for_server.serve(port).await });
    }

    let supervisor = Supervisor::new(&config);
    supervisor.run(&source, &state, &index, metrics.as_ref()).await;

    ExitCode::SUCCESS
}
