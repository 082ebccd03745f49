//! HTTP surface for playback clients. Thin axum layer over
//! [`DeliveryService`]; all policy lives in the service.

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use super::{Artifact, DeliveryError, DeliveryService};

pub fn router(service: Arc<DeliveryService>) -> Router {
    Router::new()
        .route("/videos/:video_id/hls/master.m3u8", get(master))
        .route("/videos/:video_id/hls/:rung/index.m3u8", get(manifest))
        .route("/videos/:video_id/hls/:rung/:segment", get(segment))
        .with_state(service)
}

/// Bind and serve until the process is stopped.
pub async fn serve(bind: &str, service: Arc<DeliveryService>) -> io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "delivery endpoint listening");
    axum::serve(listener, router(service)).await
}

async fn master(
    State(service): State<Arc<DeliveryService>>,
    Path(video_id): Path<String>,
) -> Response {
    respond(service.master(&video_id).await)
}

async fn manifest(
    State(service): State<Arc<DeliveryService>>,
    Path((video_id, rung)): Path<(String, String)>,
) -> Response {
    respond(service.manifest(&video_id, &rung).await)
}

async fn segment(
    State(service): State<Arc<DeliveryService>>,
    Path((video_id, rung, segment)): Path<(String, String, String)>,
) -> Response {
    respond(service.segment(&video_id, &rung, &segment).await)
}

fn respond(result: Result<Artifact, DeliveryError>) -> Response {
    match result {
        Ok(artifact) => {
            let body = Body::from_stream(ReaderStream::new(artifact.file));
            (
                [
                    (header::CONTENT_TYPE, artifact.content_type.to_string()),
                    (header::CONTENT_LENGTH, artifact.len.to_string()),
                ],
                body,
            )
                .into_response()
        }
        Err(DeliveryError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            warn!(error = %err, "delivery failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
