use reqwest::{Client, Method};

use crate::domain::RequestSnapshot;
use crate::error::InterceptorError;

/// Forwarded response: upstream status, headers, and raw body bytes, copied
/// back verbatim so the control surface can answer the original caller as if
/// it had talked to the monitored container directly.
pub struct ForwardedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Issues requests against the monitored container's upstream HTTP endpoint.
pub struct Forwarder {
    client: Client,
    container_url: String,
}

/// Request headers dropped before forwarding upstream: both are
/// connection-scoped to the inbound hop and meaningless, or actively wrong,
/// on the outbound one.
const HOP_BY_HOP_HEADERS: &[&str] = &["connection", "host"];

/// Response headers dropped when copying the upstream reply back to the
/// original caller: both describe the framing of the response body as
/// `reqwest` received it, and are recomputed fresh once the control surface
/// writes its own `Full<Bytes>` body.
const RESPONSE_HOP_BY_HOP_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection"];

impl Forwarder {
    pub fn new(container_url: String) -> Self {
        Self {
            client: Client::new(),
            container_url,
        }
    }

    pub async fn forward(&self, request: &RequestSnapshot) -> Result<ForwardedResponse, InterceptorError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| InterceptorError::ConfigInvalid(e.to_string()))?;
        let url = format!(
            "{}{}",
            self.container_url.trim_end_matches('/'),
            request.path_and_query()
        );

        let mut builder = self.client.request(method, url).body(request.body.clone());
        for (name, value) in &request.headers {
            if HOP_BY_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !RESPONSE_HOP_BY_HOP_HEADERS.contains(&name.as_str().to_ascii_lowercase().as_str()))
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(ForwardedResponse { status, headers, body })
    }
}
