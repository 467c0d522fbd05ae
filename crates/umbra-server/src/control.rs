//! HTTP control and debug surface.
//!
//! One small JSON API carries the four control operations the operator
//! needs (block, unblock, add source, refresh sources) and a read-only
//! counter snapshot at `/debug/vars`.

use crate::stats::ServerStats;
use crate::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use umbra_blacklist::Blacklist;
use umbra_cache::AnswerCache;
use umbra_source::SourceProvider;

/// Shared state behind the control API.
pub struct ControlState {
    /// The live blacklist.
    pub blacklist: Arc<Blacklist>,
    /// The answer cache (for its counters).
    pub cache: Arc<AnswerCache>,
    /// The per-outcome query counters.
    pub stats: Arc<ServerStats>,
    /// Source subscriptions.
    pub sources: Arc<SourceProvider>,
}

/// The control listener.
pub struct ControlServer {
    state: Arc<ControlState>,
}

/// Body of block/unblock requests.
#[derive(Debug, Deserialize)]
pub struct DomainsRequest {
    /// Domains to add or remove.
    pub domains: Vec<String>,
}

/// Body of add-source requests.
#[derive(Debug, Deserialize)]
pub struct AddSourceRequest {
    /// The hostfile URL to subscribe to.
    pub url: String,
}

/// Count returned by block/unblock.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    /// Number of accepted inputs.
    pub count: usize,
}

impl ControlServer {
    /// Creates the server over its state.
    pub fn new(state: Arc<ControlState>) -> Self {
        Self { state }
    }

    /// Builds the router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/block", post(block))
            .route("/v1/unblock", post(unblock))
            .route("/v1/sources", post(add_source))
            .route("/v1/sources/refresh", post(refresh_sources))
            .route("/debug/vars", get(debug_vars))
            .with_state(self.state.clone())
    }

    /// Serves the API on `addr` until `shutdown` fires.
    pub async fn run(self, addr: SocketAddr, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "control listener ready");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;
        Ok(())
    }
}

async fn block(
    State(state): State<Arc<ControlState>>,
    Json(request): Json<DomainsRequest>,
) -> Json<CountResponse> {
    let count = state.blacklist.add(&request.domains);
    info!(count, "blocked domains via control api");
    Json(CountResponse { count })
}

async fn unblock(
    State(state): State<Arc<ControlState>>,
    Json(request): Json<DomainsRequest>,
) -> Json<CountResponse> {
    let count = state.blacklist.remove(&request.domains);
    info!(count, "unblocked domains via control api");
    Json(CountResponse { count })
}

async fn add_source(
    State(state): State<Arc<ControlState>>,
    Json(request): Json<AddSourceRequest>,
) -> std::result::Result<StatusCode, (StatusCode, String)> {
    match state.sources.add_source(&request.url).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(error @ umbra_source::SourceError::InvalidUrl { .. }) => {
            Err((StatusCode::BAD_REQUEST, error.to_string()))
        }
        Err(error) => {
            error!(error = %error, "unable to add source");
            Err((StatusCode::INTERNAL_SERVER_ERROR, error.to_string()))
        }
    }
}

async fn refresh_sources(
    State(state): State<Arc<ControlState>>,
) -> std::result::Result<StatusCode, (StatusCode, String)> {
    match state.sources.refresh_sources().await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(error) => {
            error!(error = %error, "unable to refresh sources");
            Err((StatusCode::INTERNAL_SERVER_ERROR, error.to_string()))
        }
    }
}

async fn debug_vars(State(state): State<Arc<ControlState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "server": state.stats.snapshot(),
        "cache": state.cache.stats(),
        "blacklist": state.blacklist.stats(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_source::Downloader;
    use umbra_store::Store;

    async fn state() -> Arc<ControlState> {
        let store = Store::open_in_memory(100).await.unwrap();
        store.migrate().await.unwrap();
        let store = Arc::new(store);

        Arc::new(ControlState {
            blacklist: Arc::new(Blacklist::new(16)),
            cache: Arc::new(AnswerCache::new()),
            stats: Arc::new(ServerStats::new()),
            sources: Arc::new(SourceProvider::new(store, Downloader::new())),
        })
    }

    async fn serve(state: Arc<ControlState>) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = ControlServer::new(state).router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn block_and_unblock_update_the_blacklist() {
        let state = state().await;
        let addr = serve(state.clone()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{addr}/v1/block"))
            .json(&serde_json::json!({"domains": ["ads.test", "tracker.test"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.json::<serde_json::Value>().await.unwrap()["count"],
            2
        );
        assert!(state.blacklist.has("ads.test"));

        client
            .post(format!("http://{addr}/v1/unblock"))
            .json(&serde_json::json!({"domains": ["ads.test"]}))
            .send()
            .await
            .unwrap();
        assert!(!state.blacklist.has("ads.test"));
        assert!(state.blacklist.has("tracker.test"));
    }

    #[tokio::test]
    async fn invalid_source_url_is_bad_request() {
        let addr = serve(state().await).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{addr}/v1/sources"))
            .json(&serde_json::json!({"url": "not a url"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn debug_vars_exposes_counters() {
        let state = state().await;
        state.stats.inc_blocked();
        state.blacklist.add(["ads.test"]);
        let addr = serve(state).await;

        let body: serde_json::Value = reqwest::get(format!("http://{addr}/debug/vars"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["server"]["blocked"], 1);
        assert_eq!(body["blacklist"]["domains"], 1);
        assert!(body["cache"]["count"].is_number());
    }
}
