use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use interceptor::checkpoint::{CheckpointCoordinator, NullCheckpointBackend};
use interceptor::domain::{Container, InterceptorState, RequestSnapshot};
use interceptor::forwarder::Forwarder;
use interceptor::journal::{InMemoryJournal, Journal, SqliteJournal};
use interceptor::pipeline::InterceptionPipeline;
use interceptor::reprojection::ReprojectionEngine;
use interceptor::server::ControlSurface;
use interceptor::state::StateController;
use interceptor::statemanager::StateManagerClient;

/// Spins up a loopback HTTP server that counts hits and echoes the request
/// path back as the response body, standing in for the monitored container.
async fn spawn_stub_upstream() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            let io = TokioIo::new(stream);
            let hits = hits_clone.clone();
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req: Request<Incoming>| {
                            let hits = hits.clone();
                            async move {
                                hits.fetch_add(1, Ordering::SeqCst);
                                let path = req.uri().path().to_string();
                                Ok::<_, Infallible>(
                                    Response::builder()
                                        .status(StatusCode::OK)
                                        .body(Full::new(Bytes::from(path)))
                                        .unwrap(),
                                )
                            }
                        }),
                    )
                    .await;
            });
        }
    });

    (format!("http://{addr}"), hits)
}

fn snapshot(path: &str) -> RequestSnapshot {
    RequestSnapshot {
        method: "GET".to_string(),
        path: path.to_string(),
        query: None,
        headers: vec![],
        body: vec![],
    }
}

#[tokio::test]
async fn happy_path_forwards_and_marks_solved() {
    let (upstream_url, hits) = spawn_stub_upstream().await;
    let journal: Arc<dyn Journal> = Arc::new(InMemoryJournal::new());
    let state = Arc::new(StateController::new());
    let forwarder = Arc::new(Forwarder::new(upstream_url));
    let pipeline = InterceptionPipeline::new(journal.clone(), state, forwarder);

    let response = pipeline.intercept(snapshot("/hello")).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"/hello");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let all = journal.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].solved);
}

#[tokio::test]
async fn cache_then_replay_releases_buffered_request_on_reproject() {
    let (upstream_url, hits) = spawn_stub_upstream().await;
    let journal: Arc<dyn Journal> = Arc::new(InMemoryJournal::new());
    let state = Arc::new(StateController::new());
    state.transition(InterceptorState::Caching).await;
    let forwarder = Arc::new(Forwarder::new(upstream_url));
    let pipeline = Arc::new(InterceptionPipeline::new(
        journal.clone(),
        state.clone(),
        forwarder.clone(),
    ));

    let handle = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.intercept(snapshot("/buffered")).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0, "request must not reach upstream while Caching");

    state.transition(InterceptorState::Proxying).await;
    let response = tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("pipeline should unblock")
        .unwrap()
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn crash_then_reproject_replays_unsolved_requests() {
    let (upstream_url, hits) = spawn_stub_upstream().await;
    let journal: Arc<dyn Journal> = Arc::new(InMemoryJournal::new());
    let forwarder = Arc::new(Forwarder::new(upstream_url));

    // Simulate requests that were journaled before a crash, never marked
    // solved because the process died mid-forward.
    for (version, path) in [(1u64, "/a"), (2, "/b"), (3, "/c")] {
        journal
            .save(uuid::Uuid::new_v4(), version, &snapshot(path))
            .await
            .unwrap();
    }

    let engine = ReprojectionEngine::new(journal.clone(), forwarder);
    let replayed = engine.reproject(0).await.unwrap();

    assert_eq!(replayed, 3);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    let all = journal.get_all().await.unwrap();
    assert!(all.iter().all(|r| r.solved));
}

#[tokio::test]
async fn checkpoint_trigger_invokes_backend_and_state_manager() {
    let (upstream_url, _hits) = spawn_stub_upstream().await;
    let (state_manager_url, state_manager_hits) = spawn_stub_upstream().await;

    let journal: Arc<dyn Journal> = Arc::new(InMemoryJournal::new());
    let container = Container {
        id: "c1".to_string(),
        pid: 1,
        http_url: upstream_url,
        name: "app".to_string(),
    };
    let state_manager = Arc::new(StateManagerClient::new(state_manager_url));
    let coordinator = CheckpointCoordinator::new(
        container,
        Arc::new(NullCheckpointBackend),
        state_manager,
        journal,
        None,
    );

    // The stub upstream responds 200 to any path, including the
    // state-manager POST, so this exercises the full round trip without a
    // real state-manager collaborator.
    coordinator.checkpoint().await.unwrap();
    assert_eq!(state_manager_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn journal_durability_survives_reopening_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("journal.db");
    let db_path_str = db_path.to_str().unwrap();

    {
        let journal = SqliteJournal::connect(db_path_str).await.unwrap();
        journal
            .save(uuid::Uuid::new_v4(), 1, &snapshot("/persisted"))
            .await
            .unwrap();
    }

    let reopened = SqliteJournal::connect(db_path_str).await.unwrap();
    let all = reopened.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].request.as_ref().unwrap().path, "/persisted");
}

#[tokio::test]
async fn control_surface_state_route_round_trips() {
    let (upstream_url, _hits) = spawn_stub_upstream().await;
    let (state_manager_url, _sm_hits) = spawn_stub_upstream().await;

    let journal: Arc<dyn Journal> = Arc::new(InMemoryJournal::new());
    let state = Arc::new(StateController::new());
    let forwarder = Arc::new(Forwarder::new(upstream_url));
    let pipeline = Arc::new(InterceptionPipeline::new(journal.clone(), state.clone(), forwarder.clone()));
    let reprojection = Arc::new(ReprojectionEngine::new(journal.clone(), forwarder));

    let container = Container {
        id: "c1".to_string(),
        pid: 1,
        http_url: String::new(),
        name: "app".to_string(),
    };
    let coordinator = Arc::new(CheckpointCoordinator::new(
        container,
        Arc::new(NullCheckpointBackend),
        Arc::new(StateManagerClient::new(state_manager_url)),
        journal,
        None,
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let control_surface = Arc::new(ControlSurface::new(pipeline, coordinator, reprojection, state, port));
    let shutdown = Arc::new(Notify::new());
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        let _ = control_surface.run(server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = reqwest::Client::new();
    let base: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let get = client
        .get(format!("http://{base}/state"))
        .send()
        .await
        .unwrap();
    assert_eq!(get.text().await.unwrap(), "Proxying");

    client
        .post(format!("http://{base}/state?state=Caching"))
        .send()
        .await
        .unwrap();

    let get_after = client
        .get(format!("http://{base}/state"))
        .send()
        .await
        .unwrap();
    assert_eq!(get_after.text().await.unwrap(), "Caching");

    shutdown.notify_waiters();
    let _ = tokio::time::timeout(Duration::from_millis(500), handle).await;
}
