use reqwest::Client;

use crate::domain::ContainerMetadata;
use crate::error::InterceptorError;

const CONTAINERS_PATH: &str = "containers";

/// Outbound client to the external state-manager service. The state manager
/// itself is an out-of-scope collaborator; this is only the narrow contract
/// this crate needs against it.
pub struct StateManagerClient {
    client: Client,
    base_url: String,
}

impl StateManagerClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub async fn insert_metadata(
        &self,
        checkpoint_hash: &str,
        metadata: &ContainerMetadata,
    ) -> Result<(), InterceptorError> {
        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            CONTAINERS_PATH,
            checkpoint_hash
        );
        let response = self.client.post(&url).json(metadata).send().await?;
        if !response.status().is_success() {
            return Err(InterceptorError::MetadataPersistFailed(format!(
                "status code is {}",
                response.status()
            )));
        }
        Ok(())
    }

    pub async fn retrieve_metadata(
        &self,
        checkpoint_hash: &str,
    ) -> Result<ContainerMetadata, InterceptorError> {
        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            CONTAINERS_PATH,
            checkpoint_hash
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(InterceptorError::MetadataPersistFailed(format!(
                "status code is {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}
