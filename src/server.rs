use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::checkpoint::CheckpointCoordinator;
use crate::domain::{InterceptorState, RequestSnapshot};
use crate::error::InterceptorError;
use crate::pipeline::InterceptionPipeline;
use crate::reprojection::ReprojectionEngine;
use crate::state::StateController;

/// The interceptor's public HTTP surface: the catch-all forward plus the
/// `/checkpoint`, `/reproject`, and `/state` control routes.
pub struct ControlSurface {
    pipeline: Arc<InterceptionPipeline>,
    checkpoint_coordinator: Arc<CheckpointCoordinator>,
    reprojection: Arc<ReprojectionEngine>,
    state: Arc<StateController>,
    port: u16,
}

impl ControlSurface {
    pub fn new(
        pipeline: Arc<InterceptionPipeline>,
        checkpoint_coordinator: Arc<CheckpointCoordinator>,
        reprojection: Arc<ReprojectionEngine>,
        state: Arc<StateController>,
        port: u16,
    ) -> Self {
        Self {
            pipeline,
            checkpoint_coordinator,
            reprojection,
            state,
            port,
        }
    }

    pub async fn run(&self, shutdown: Arc<Notify>) -> Result<(), String> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| format!("failed to bind control surface: {e}"))?;

        info!("control surface listening on {addr}");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let io = TokioIo::new(stream);
                            let pipeline = self.pipeline.clone();
                            let checkpoint_coordinator = self.checkpoint_coordinator.clone();
                            let reprojection = self.reprojection.clone();
                            let state = self.state.clone();

                            tokio::spawn(async move {
                                if let Err(err) = http1::Builder::new()
                                    .serve_connection(
                                        io,
                                        service_fn(move |req| {
                                            let pipeline = pipeline.clone();
                                            let checkpoint_coordinator = checkpoint_coordinator.clone();
                                            let reprojection = reprojection.clone();
                                            let state = state.clone();
                                            async move {
                                                handle_request(
                                                    pipeline,
                                                    checkpoint_coordinator,
                                                    reprojection,
                                                    state,
                                                    req,
                                                )
                                                .await
                                            }
                                        }),
                                    )
                                    .await
                                {
                                    error!("error serving connection: {err:?}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("failed to accept connection: {e}");
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("control surface shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap()
}

fn forwarded_response(forwarded: crate::forwarder::ForwardedResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(forwarded.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in &forwarded.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Full::new(Bytes::from(forwarded.body)))
        .unwrap_or_else(|_| text_response(StatusCode::BAD_GATEWAY, Bytes::new()))
}

async fn handle_request(
    pipeline: Arc<InterceptionPipeline>,
    checkpoint_coordinator: Arc<CheckpointCoordinator>,
    reprojection: Arc<ReprojectionEngine>,
    state: Arc<StateController>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    match path.as_str() {
        "/checkpoint" => {
            return Ok(match checkpoint_coordinator.checkpoint().await {
                Ok(()) => text_response(StatusCode::OK, Bytes::new()),
                Err(e) => {
                    error!("checkpoint failed: {e}");
                    text_response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
                }
            });
        }
        "/reproject" => {
            return Ok(match reprojection.reproject(0).await {
                Ok(_) => text_response(StatusCode::OK, Bytes::new()),
                Err(e) => {
                    error!("reprojection failed: {e}");
                    text_response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
                }
            });
        }
        "/state" => {
            return Ok(match method {
                Method::POST => {
                    let query = req.uri().query().unwrap_or("");
                    let requested = query
                        .split('&')
                        .find_map(|pair| pair.strip_prefix("state="));
                    let new_state = InterceptorState::parse_or_caching(requested);
                    state.transition(new_state).await;
                    text_response(StatusCode::OK, Bytes::new())
                }
                Method::GET => {
                    text_response(StatusCode::OK, Bytes::from(state.current().await.as_str()))
                }
                _ => text_response(StatusCode::METHOD_NOT_ALLOWED, Bytes::new()),
            });
        }
        _ => {}
    }

    let snapshot = match capture_snapshot(req).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            return Ok(text_response(
                StatusCode::BAD_REQUEST,
                Bytes::from(e.to_string()),
            ));
        }
    };

    match pipeline.intercept(snapshot).await {
        Ok(forwarded) => Ok(forwarded_response(forwarded)),
        Err(InterceptorError::Cancelled) => {
            Ok(text_response(StatusCode::SERVICE_UNAVAILABLE, Bytes::new()))
        }
        Err(e) => {
            error!("forward failed: {e}");
            Ok(text_response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new()))
        }
    }
}

async fn capture_snapshot(req: Request<Incoming>) -> Result<RequestSnapshot, std::io::Error> {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    let headers = req
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();

    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?
        .to_bytes()
        .to_vec();

    Ok(RequestSnapshot {
        method,
        path,
        query,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_response_carries_status() {
        let response = text_response(StatusCode::OK, Bytes::new());
        assert_eq!(response.status(), StatusCode::OK);
    }
}
