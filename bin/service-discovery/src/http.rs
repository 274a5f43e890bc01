//! Status endpoints: health, Prometheus metrics and the current cluster view

use discovery_core::ClusterRegistry;
use discovery_watch::WatchMetrics;
use http_body_util::Full;
use hyper::{
    body::Bytes,
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::tokio::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shared state handed to every connection
pub struct AppState {
    pub registry: ClusterRegistry,
    pub metrics: WatchMetrics,
}

/// Accept HTTP connections until cancelled
pub async fn serve(listener: TcpListener, state: Arc<AppState>, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer_addr) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Error accepting HTTP connection: {}", e);
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path().to_string();
    debug!("{} {}", req.method(), path);

    if req.method() != Method::GET {
        return Ok(text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n"));
    }

    let response = match path.as_str() {
        "/healthz" => text(StatusCode::OK, "OK\n"),
        "/metrics" => match state.metrics.gather() {
            Ok(body) => with_content_type(
                Response::new(Full::new(Bytes::from(body))),
                "text/plain; version=0.0.4",
            ),
            Err(e) => {
                warn!("Failed to gather metrics: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics\n")
            }
        },
        "/clusters" => {
            let clusters = state.registry.list_clusters().await;
            match serde_json::to_vec(&clusters) {
                Ok(body) => with_content_type(
                    Response::new(Full::new(Bytes::from(body))),
                    "application/json",
                ),
                Err(e) => {
                    warn!("Failed to encode clusters: {}", e);
                    text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode clusters\n")
                }
            }
        }
        _ => text(StatusCode::NOT_FOUND, "Not Found\n"),
    };

    Ok(response)
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

fn with_content_type(mut response: Response<Full<Bytes>>, content_type: &'static str) -> Response<Full<Bytes>> {
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
