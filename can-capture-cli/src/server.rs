//! Latest-snapshot HTTP endpoint
//!
//! Serves the most recently loaded set of decoded rows as a CSV download.
//! The snapshot is held in an explicitly constructed [`SnapshotStore`] that
//! the loader replaces wholesale and the handler reads wholesale.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

/// Body served while no snapshot has been loaded
pub const DEFAULT_BODY: &str = "sender,value,date_time\n";

/// Shared, mutex-protected CSV buffer
#[derive(Debug, Default)]
pub struct SnapshotStore {
    buffer: Mutex<Bytes>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a whole new snapshot
    pub fn replace(&self, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        log::debug!("Snapshot replaced: {} bytes", bytes.len());
        *self.buffer.lock().unwrap_or_else(PoisonError::into_inner) = bytes;
    }

    /// The whole current snapshot
    pub fn snapshot(&self) -> Bytes {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Build the router: `GET /` returns the snapshot, anything else is 404
pub fn router(store: Arc<SnapshotStore>) -> Router {
    Router::new()
        .route("/", get(download_snapshot))
        .fallback(not_found)
        .with_state(store)
}

async fn download_snapshot(State(store): State<Arc<SnapshotStore>>) -> impl IntoResponse {
    let mut body = store.snapshot();
    if body.is_empty() {
        body = Bytes::from_static(DEFAULT_BODY.as_bytes());
    }

    (
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=LOG.csv"),
        ],
        body,
    )
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Serve the snapshot until the process is stopped
pub async fn serve(addr: SocketAddr, store: Arc<SnapshotStore>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    log::info!("Serving snapshot on http://{}", addr);

    axum::serve(listener, router(store))
        .await
        .context("Snapshot server stopped")?;
    Ok(())
}
