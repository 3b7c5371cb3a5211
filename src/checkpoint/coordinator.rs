use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fnv::FnvHasher;
use log::{error, info};
use std::hash::Hasher;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::interval;

use super::CheckpointBackend;
use super::CheckpointRequest;
use crate::domain::{Container, ContainerMetadata};
use crate::error::InterceptorError;
use crate::journal::Journal;
use crate::statemanager::StateManagerClient;

/// Orchestrates one checkpoint: compute a hash for the new image, push the
/// current `ContainerMetadata` watermark to the state manager, then invoke
/// the checkpoint backend.
pub struct CheckpointCoordinator {
    container: Container,
    backend: Arc<dyn CheckpointBackend>,
    state_manager: Arc<StateManagerClient>,
    journal: Arc<dyn Journal>,
    pod_name: Option<String>,
}

impl CheckpointCoordinator {
    pub fn new(
        container: Container,
        backend: Arc<dyn CheckpointBackend>,
        state_manager: Arc<StateManagerClient>,
        journal: Arc<dyn Journal>,
        pod_name: Option<String>,
    ) -> Self {
        Self {
            container,
            backend,
            state_manager,
            journal,
            pod_name,
        }
    }

    pub async fn checkpoint(&self) -> Result<(), InterceptorError> {
        let last_solved = self.journal.get_last_request_solved().await?;
        let last_request_solved_id = last_solved
            .map(|r| r.id.to_string())
            .unwrap_or_else(|| ContainerMetadata::NO_SOLVED_REQUEST.to_string());

        let metadata = ContainerMetadata {
            last_timestamp: Utc::now(),
            last_request_solved_id,
        };

        let checkpoint_hash = Self::generate_checkpoint_hash(&self.container.name, metadata.last_timestamp);

        self.state_manager
            .insert_metadata(&checkpoint_hash, &metadata)
            .await?;

        let request = CheckpointRequest {
            container: &self.container,
            checkpoint_hash,
            pod_name: self.pod_name.clone(),
        };
        self.backend.checkpoint(&request).await
    }

    fn generate_checkpoint_hash(container_name: &str, timestamp: chrono::DateTime<Utc>) -> String {
        let mut hasher = FnvHasher::default();
        hasher.write(timestamp.to_rfc3339().as_bytes());
        hasher.write(container_name.as_bytes());
        format!("{container_name}-{:016x}", hasher.finish())
    }
}

/// Drives periodic checkpointing in standalone mode, where nothing else
/// triggers a checkpoint on a schedule. A single checkpoint failure is
/// logged and does not stop the timer; the next tick tries again.
pub struct CheckpointScheduler {
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl CheckpointScheduler {
    pub fn start(coordinator: Arc<CheckpointCoordinator>, interval_period: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let task_shutdown = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(interval_period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        info!("running scheduled checkpoint");
                        if let Err(e) = coordinator.checkpoint().await {
                            error!("scheduled checkpoint failed: {e}");
                        }
                    }
                    _ = task_shutdown.notified() => {
                        info!("checkpoint scheduler shutting down");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown,
            task: Some(task),
        }
    }

    pub async fn shutdown(mut self) {
        self.shutdown.notify_waiters();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
