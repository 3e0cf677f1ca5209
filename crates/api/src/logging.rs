//! Tracing setup and per-request timing

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bookly_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Log method, path, status and wall time of every request
pub async fn log_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let elapsed = start.elapsed().as_secs_f64();
    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_secs = elapsed,
        "{} {} -> {} : Completed in {:.4}s",
        method,
        path,
        response.status().as_u16(),
        elapsed
    );

    response
}
