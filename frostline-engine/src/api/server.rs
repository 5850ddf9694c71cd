//! HTTP API server.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use utoipa_axum::router::OpenApiRouter;

use super::v0;
use crate::engine::EngineCommand;
use crate::tracing::prelude::*;

/// State shared with handlers: the way into the engine task.
#[derive(Clone)]
pub struct SharedState {
    pub engine_tx: mpsc::Sender<EngineCommand>,
}

/// Serve the API until cancellation.
pub async fn serve(
    port: u16,
    engine_tx: mpsc::Sender<EngineCommand>,
    cancellation: CancellationToken,
) -> Result<()> {
    let state = SharedState { engine_tx };

    let (router, _api) = OpenApiRouter::new()
        .nest("/api/v0", v0::routes())
        .split_for_parts();
    let app = router.with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancellation.cancelled().await })
        .await?;

    Ok(())
}
