mod coordinator;
mod criu;
mod kubelet;
mod null;

pub use coordinator::{CheckpointCoordinator, CheckpointScheduler};
pub use criu::CriuCheckpointBackend;
pub use kubelet::KubeletCheckpointBackend;
pub use null::NullCheckpointBackend;

use async_trait::async_trait;

use crate::domain::Container;
use crate::error::InterceptorError;

/// What a checkpoint needs beyond the container itself: an identifier for
/// the resulting image, and (in Kubernetes mode) the pod name kubelet needs
/// to address it.
pub struct CheckpointRequest<'a> {
    pub container: &'a Container,
    pub checkpoint_hash: String,
    pub pod_name: Option<String>,
}

/// A pluggable checkpoint/restore mechanism. This crate implements only the
/// narrow interface; the actual checkpoint/restore machinery (CRIU, kubelet)
/// is an external collaborator.
#[async_trait]
pub trait CheckpointBackend: Send + Sync {
    async fn checkpoint(&self, request: &CheckpointRequest<'_>) -> Result<(), InterceptorError>;
}
