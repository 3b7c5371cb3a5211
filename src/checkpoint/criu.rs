use async_trait::async_trait;
use log::info;
use tokio::fs;
use tokio::process::Command;

use super::{CheckpointBackend, CheckpointRequest};
use crate::error::InterceptorError;

/// Shells out to the `criu` CLI. There is no vendored CRIU RPC binding in
/// this crate's dependency set, so the dump operation is invoked the same
/// way an operator would from a shell, one images directory per checkpoint
/// hash.
pub struct CriuCheckpointBackend {
    images_directory: String,
}

impl CriuCheckpointBackend {
    pub fn new(images_directory: String) -> Self {
        Self { images_directory }
    }
}

#[async_trait]
impl CheckpointBackend for CriuCheckpointBackend {
    async fn checkpoint(&self, request: &CheckpointRequest<'_>) -> Result<(), InterceptorError> {
        let image_dir = format!("{}/{}", self.images_directory, request.checkpoint_hash);
        fs::create_dir_all(&image_dir)
            .await
            .map_err(|e| InterceptorError::CheckpointBackendFailed(e.to_string()))?;

        info!(
            "dumping checkpoint for pid {} into {}",
            request.container.pid, image_dir
        );

        let output = Command::new("criu")
            .arg("dump")
            .arg("--images-dir")
            .arg(&image_dir)
            .arg("--tree")
            .arg(request.container.pid.to_string())
            .arg("--shell-job")
            .output()
            .await
            .map_err(|e| InterceptorError::CheckpointBackendFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(InterceptorError::CheckpointBackendFailed(format!(
                "criu dump exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(())
    }
}
