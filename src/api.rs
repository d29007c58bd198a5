//! HTTP management surface: `/healthcheck` and `/metrics`, served
//! unconditionally on a dedicated bind address alongside the GTP planes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Router, extract::State};
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;

use crate::health::HealthState;

#[derive(Clone)]
struct ApiState {
    health: Arc<HealthState>,
}

async fn healthcheck(State(state): State<ApiState>) -> impl IntoResponse {
    let report = state.health.report();

    let status = if report.is_healthy() { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };

    (status, axum::Json(report))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();

    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }

    (StatusCode::OK, buffer)
}

pub async fn start_server(bind: SocketAddr, health: Arc<HealthState>) -> anyhow::Result<()> {
    let state = ApiState { health };

    let app = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/metrics", get(metrics))
        .with_state(state);

    let listener = TcpListener::bind(bind).await?;
    log::info!("management api listening on {bind}");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::health::HealthReport;

    fn app(health: Arc<HealthState>) -> Router {
        Router::new()
            .route("/healthcheck", get(healthcheck))
            .route("/metrics", get(metrics))
            .with_state(ApiState { health })
    }

    #[tokio::test]
    async fn healthcheck_returns_500_while_a_plane_is_not_ready() {
        let health = Arc::new(HealthState::default());

        let response = app(health)
            .oneshot(Request::builder().uri("/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn healthcheck_returns_200_once_every_dependency_is_ready() {
        let health = Arc::new(HealthState::default());
        health.set_control_plane_ready(true);
        health.set_user_plane_ready(true);
        health.set_datastore_ok(true);

        let response = app(health)
            .oneshot(Request::builder().uri("/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let report: HealthReport = serde_json::from_slice(&body).unwrap();
        assert!(report.is_healthy());
    }
}
