//! src/api/mod.rs
//!
//! Optional HTTP surface exposing node health and the stats snapshot
//! described for monitoring tooling. Disabled entirely when a node's
//! configuration carries no `stats_api` section.

use crate::core::Core;
use crate::stats::Stats;
use axum::extract::State as AxumState;
use axum::{routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ApiServer<C: Core> {
    bind_addr: SocketAddr,
    stats: Arc<Stats<C>>,
}

impl<C: Core> ApiServer<C> {
    pub fn new(bind_addr: SocketAddr, stats: Arc<Stats<C>>) -> Self {
        Self { bind_addr, stats }
    }

    pub async fn run(self, shutdown: CancellationToken) -> crate::error::Result<()> {
        let app = Router::new()
            .route("/health", get(health))
            .route("/stats", get(stats_handler::<C>))
            .with_state(self.stats);

        tracing::info!(listen_addr = %self.bind_addr, "stats API listening");

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("stats API received shutdown signal");
            })
            .await?;

        Ok(())
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn stats_handler<C: Core>(
    AxumState(stats): AxumState<Arc<Stats<C>>>,
) -> Json<std::collections::BTreeMap<String, String>> {
    Json(stats.snapshot().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NodeState;
    use crate::stats::Counters;
    use crate::testkit::InMemoryCore;
    use crate::wire::ParticipantSet;
    use tower::ServiceExt;

    fn router() -> Router {
        let participants = ParticipantSet::new([("a".to_string(), 0)]);
        let core = Arc::new(tokio::sync::Mutex::new(InMemoryCore::new(0, participants)));
        let stats = Arc::new(Stats::new(
            0,
            core,
            Arc::new(NodeState::new()),
            Arc::new(Counters::new()),
            0,
            0.5,
        ));
        Router::new()
            .route("/health", get(health))
            .route("/stats", get(stats_handler::<InMemoryCore>))
            .with_state(stats)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = router()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_returns_json_snapshot() {
        let response = router()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/stats")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let map: std::collections::BTreeMap<String, String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(map.get("id").unwrap(), "0");
    }
}
