use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};
use tokio::signal;
use tokio::sync::Notify;

use interceptor::checkpoint::{
    CheckpointCoordinator, CheckpointScheduler, CriuCheckpointBackend, KubeletCheckpointBackend,
    NullCheckpointBackend,
};
use interceptor::config::{DeploymentMode, InterceptorConfig};
use interceptor::domain::Container;
use interceptor::error::InterceptorError;
use interceptor::forwarder::Forwarder;
use interceptor::journal::{InMemoryJournal, Journal, SqliteJournal};
use interceptor::pipeline::InterceptionPipeline;
use interceptor::reprojection::ReprojectionEngine;
use interceptor::server::ControlSurface;
use interceptor::state::StateController;
use interceptor::statemanager::StateManagerClient;

const CRIU_IMAGES_DIR: &str = "/var/lib/interceptor/checkpoints";
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("interceptor exited with error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), InterceptorError> {
    let yaml_path = env::var("CONFIG_FILE").ok();
    let config = InterceptorConfig::load(yaml_path.as_deref())?;

    let journal: Arc<dyn Journal> = match env::var("DATABASE_PATH").ok() {
        Some(path) => Arc::new(SqliteJournal::connect(&path).await?),
        None => Arc::new(InMemoryJournal::new()),
    };

    let shutdown = Arc::new(Notify::new());
    let state = Arc::new(StateController::with_shutdown(shutdown.clone()));
    let forwarder = Arc::new(Forwarder::new(config.container_url.clone()));
    let pipeline = Arc::new(InterceptionPipeline::new(
        journal.clone(),
        state.clone(),
        forwarder.clone(),
    ));
    let reprojection = Arc::new(ReprojectionEngine::new(journal.clone(), forwarder.clone()));

    let state_manager = Arc::new(StateManagerClient::new(config.state_manager_url.clone()));
    let container = Container {
        id: config.container_name.clone(),
        pid: config.container_pid,
        http_url: config.container_url.clone(),
        name: config.container_name.clone(),
    };

    let checkpoint_backend: Arc<dyn interceptor::checkpoint::CheckpointBackend> = match config.mode {
        DeploymentMode::Kubernetes => {
            let node_ip = config
                .kubernetes_node_ip
                .clone()
                .ok_or_else(|| InterceptorError::ConfigInvalid("KUBERNETES_NODE_IP not set".into()))?;
            Arc::new(KubeletCheckpointBackend::from_mounted_certs(node_ip, 10250)?)
        }
        DeploymentMode::Standalone => {
            if env::var("CRIU_ENABLED").is_ok() {
                Arc::new(CriuCheckpointBackend::new(CRIU_IMAGES_DIR.to_string()))
            } else {
                Arc::new(NullCheckpointBackend)
            }
        }
    };

    let checkpoint_coordinator = Arc::new(CheckpointCoordinator::new(
        container,
        checkpoint_backend,
        state_manager,
        journal.clone(),
        config.kubernetes_pod_name.clone(),
    ));

    let scheduler = match config.mode {
        DeploymentMode::Standalone => Some(CheckpointScheduler::start(
            checkpoint_coordinator.clone(),
            config.checkpointing_interval,
        )),
        DeploymentMode::Kubernetes => None,
    };

    let control_surface = Arc::new(ControlSurface::new(
        pipeline,
        checkpoint_coordinator,
        reprojection,
        state,
        config.listen_port,
    ));

    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = control_surface.run(server_shutdown).await {
            error!("control surface exited with error: {e}");
        }
    });

    wait_for_shutdown_signal().await;

    shutdown.notify_waiters();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, server_handle)
        .await
        .is_err()
    {
        error!("control surface shutdown timed out");
    }

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }

    info!("interceptor shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("received SIGINT");
            }
            _ = async {
                if let Ok(mut sigterm) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    let _ = sigterm.recv().await;
                    info!("received SIGTERM");
                }
            } => {}
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.ok();
        info!("received Ctrl+C");
    }
}
