// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Prometheus counters exported on `--metrics-port`, and the small HTTP
//! server that serves them in the text exposition format.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use tracing::{error, info};

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    pub rows_fetched: IntCounterVec,
    pub docs_indexed: IntCounterVec,
    pub pipeline_errors: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let rows_fetched = IntCounterVec::new(
            Opts::new("projector_rows_fetched_total", "Source rows fetched by the Extractor"),
            &["pipeline"],
        )
        .expect("valid metric");
        let docs_indexed = IntCounterVec::new(
            Opts::new("projector_docs_indexed_total", "Documents accepted by the search engine"),
            &["pipeline"],
        )
        .expect("valid metric");
        let pipeline_errors = IntCounterVec::new(
            Opts::new("projector_pipeline_errors_total", "Pipeline turns that ended in a fatal error"),
            &["pipeline", "kind"],
        )
        .expect("valid metric");

        registry.register(Box::new(rows_fetched.clone())).expect("unique metric name");
        registry.register(Box::new(docs_indexed.clone())).expect("unique metric name");
        registry.register(Box::new(pipeline_errors.clone())).expect("unique metric name");

        Metrics {
            registry,
            rows_fetched,
            docs_indexed,
            pipeline_errors,
        }
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn new_for_test() -> Self {
        Self::new()
    }

    /// Serves the text exposition format on `port` until the process exits.
    /// A `port` of `0` means metrics were disabled by configuration; callers
    /// check this before spawning the server.
    pub async fn serve(self: Arc<Self>, port: u16) {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let app = Router::new().route("/metrics", get(render)).with_state(self);

        info!(port, "serving metrics");
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "metrics server exited");
                }
            }
            Err(e) => error!(error = %e, port, "failed to bind metrics port"),
        }
    }
}

async fn render(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = metrics.registry.gather();
    let mut buffer = String::new();
    if let Err(e) = encoder.encode_utf8(&families, &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (StatusCode::OK, buffer)
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
