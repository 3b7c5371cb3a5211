use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity};

use super::{CheckpointBackend, CheckpointRequest};
use crate::error::InterceptorError;

const CLIENT_CERT_PATH: &str = "/var/run/secrets/kubelet-certs/client.crt";
const CLIENT_KEY_PATH: &str = "/var/run/secrets/kubelet-certs/client.key";
const CA_BUNDLE_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Talks to the kubelet checkpoint API
/// (`POST /checkpoint/{namespace}/{pod}/{container}`) over mTLS, verifying
/// the kubelet's certificate against the in-cluster CA bundle rather than
/// skipping verification.
pub struct KubeletCheckpointBackend {
    client: Client,
    node_ip: String,
    node_port: u16,
}

impl KubeletCheckpointBackend {
    pub fn from_mounted_certs(node_ip: String, node_port: u16) -> Result<Self, InterceptorError> {
        let client_cert = std::fs::read(CLIENT_CERT_PATH)
            .map_err(|e| InterceptorError::ConfigInvalid(format!("client cert: {e}")))?;
        let client_key = std::fs::read(CLIENT_KEY_PATH)
            .map_err(|e| InterceptorError::ConfigInvalid(format!("client key: {e}")))?;
        let ca_bundle = std::fs::read(CA_BUNDLE_PATH)
            .map_err(|e| InterceptorError::ConfigInvalid(format!("ca bundle: {e}")))?;

        let mut pem = client_cert;
        pem.extend_from_slice(&client_key);
        let identity = Identity::from_pem(&pem)
            .map_err(|e| InterceptorError::ConfigInvalid(e.to_string()))?;
        let ca_cert = Certificate::from_pem(&ca_bundle)
            .map_err(|e| InterceptorError::ConfigInvalid(e.to_string()))?;

        let client = Client::builder()
            .identity(identity)
            .add_root_certificate(ca_cert)
            .build()
            .map_err(|e| InterceptorError::ConfigInvalid(e.to_string()))?;

        Ok(Self {
            client,
            node_ip,
            node_port,
        })
    }
}

#[async_trait]
impl CheckpointBackend for KubeletCheckpointBackend {
    async fn checkpoint(&self, request: &CheckpointRequest<'_>) -> Result<(), InterceptorError> {
        let pod_name = request
            .pod_name
            .as_deref()
            .ok_or_else(|| InterceptorError::ConfigInvalid("pod_name required in kubernetes mode".into()))?;

        let url = format!(
            "https://{}:{}/checkpoint/default/{}/{}",
            self.node_ip, self.node_port, pod_name, request.container.name
        );

        let response = self.client.post(&url).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InterceptorError::CheckpointBackendFailed(format!(
                "checkpoint failed with status {body}"
            )));
        }
        Ok(())
    }
}
