//! HTTP server for Prometheus metrics and operator actions
//!
//! - `GET /metrics`: Prometheus text format
//! - `GET /health`: liveness, with the broker connection status
//! - `POST /reset`: publish a reset to hardware and clients

use crate::bridge::Bridge;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

/// HTTP server that exposes metrics and the operator reset
pub struct MetricsServer {
    bridge: Arc<Bridge>,
    listener: TcpListener,
}

impl MetricsServer {
    pub async fn bind(bridge: Arc<Bridge>, addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { bridge, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(
        self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            "Metrics server listening on http://{}/metrics",
            self.local_addr()?
        );

        loop {
            let (stream, _) = tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                accepted = self.listener.accept() => accepted?,
            };
            let io = TokioIo::new(stream);
            let bridge = self.bridge.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let bridge = bridge.clone();
                    async move { handle_request(req, bridge).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = text_response(status, body.to_string());
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

async fn handle_request<B>(
    req: Request<B>,
    bridge: Arc<Bridge>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let encoder = TextEncoder::new();
            let metric_families = bridge.metrics().registry.gather();
            let mut buffer = Vec::new();

            match encoder.encode(&metric_families, &mut buffer) {
                Ok(_) => {
                    let mut response = text_response(StatusCode::OK, buffer);
                    if let Ok(value) = encoder.format_type().parse() {
                        response
                            .headers_mut()
                            .insert(hyper::header::CONTENT_TYPE, value);
                    }
                    response
                }
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    text_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to encode metrics",
                    )
                }
            }
        }
        (&Method::GET, "/health" | "/healthz") => json_response(
            StatusCode::OK,
            json!({
                "status": "ok",
                "broker": bridge.transport_status().as_str(),
            }),
        ),
        (&Method::POST, "/reset") => {
            let id = bridge.trigger_reset().await;
            json_response(StatusCode::ACCEPTED, json!({ "id": id }))
        }
        (_, "/metrics" | "/health" | "/healthz" | "/reset") => {
            text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}
