//! API v0 endpoints.
//!
//! Version 0 signals an unstable API -- breaking changes are expected
//! while the processor is still being fitted to the fleet.

use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use tokio::sync::oneshot;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::server::SharedState;
use crate::api_client::types::HealthState;
use crate::engine::EngineCommand;

/// How long a handler waits for the engine task to reply.
const ENGINE_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(liveness))
        .routes(routes!(get_health))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/ping",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn liveness() -> &'static str {
    "OK"
}

/// Return the engine health snapshot.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Engine state projection", body = HealthState),
        (status = INTERNAL_SERVER_ERROR, description = "Engine task unavailable"),
    ),
)]
async fn get_health(State(state): State<SharedState>) -> Result<Json<HealthState>, StatusCode> {
    let (tx, rx) = oneshot::channel();
    state
        .engine_tx
        .send(EngineCommand::Snapshot { reply: tx })
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // Result layers: timeout / channel-closed.
    let Ok(Ok(snapshot)) = tokio::time::timeout(ENGINE_REPLY_TIMEOUT, rx).await else {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    };

    Ok(Json(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn health_handler_round_trips_through_engine_channel() {
        let (engine_tx, mut engine_rx) = mpsc::channel(4);
        let state = SharedState { engine_tx };

        // Fake engine task: answer one snapshot request.
        tokio::spawn(async move {
            if let Some(EngineCommand::Snapshot { reply }) = engine_rx.recv().await {
                let _ = reply.send(HealthState {
                    status: "ok".into(),
                    uptime_secs: 42,
                    ..HealthState::default()
                });
            }
        });

        let response = get_health(State(state)).await.expect("handler succeeds");
        assert_eq!(response.0.status, "ok");
        assert_eq!(response.0.uptime_secs, 42);
    }

    #[tokio::test]
    async fn health_handler_errors_when_engine_is_gone() {
        let (engine_tx, engine_rx) = mpsc::channel(4);
        drop(engine_rx);
        let state = SharedState { engine_tx };

        let result = get_health(State(state)).await;
        assert_eq!(result.err(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
