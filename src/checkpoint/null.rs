use async_trait::async_trait;
use log::info;

use super::{CheckpointBackend, CheckpointRequest};
use crate::error::InterceptorError;

/// No-op backend for standalone/dev mode, where there is no real
/// checkpoint/restore machinery to call into.
pub struct NullCheckpointBackend;

#[async_trait]
impl CheckpointBackend for NullCheckpointBackend {
    async fn checkpoint(&self, request: &CheckpointRequest<'_>) -> Result<(), InterceptorError> {
        info!(
            "standalone mode: skipping checkpoint {} for container {}",
            request.checkpoint_hash, request.container.name
        );
        Ok(())
    }
}
