use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eagerly-captured, replayable snapshot of an inbound HTTP request.
///
/// A live request holds streams and connection state that cannot outlive the
/// client's connection; this is captured once at ingress and used for every
/// subsequent forward or replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestSnapshot {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RequestSnapshot {
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }
}

/// The unit of the journal: a request plus its version and solved state.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub id: Uuid,
    pub version: u64,
    /// `None` only when persisted bytes failed to decode; the row itself is
    /// still retained so version density is never broken by a bad decode.
    pub request: Option<RequestSnapshot>,
    pub solved: bool,
    pub solved_at: Option<DateTime<Utc>>,
}

impl InterceptedRequest {
    pub fn new(id: Uuid, version: u64, request: RequestSnapshot) -> Self {
        Self {
            id,
            version,
            request: Some(request),
            solved: false,
            solved_at: None,
        }
    }
}

/// The monitored application descriptor. Immutable for the interceptor's
/// lifetime.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: String,
    pub pid: i32,
    pub http_url: String,
    pub name: String,
}

/// Sent to the state-manager on each checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub last_timestamp: DateTime<Utc>,
    pub last_request_solved_id: String,
}

impl ContainerMetadata {
    pub const NO_SOLVED_REQUEST: &'static str = "-1";
}

/// The two-valued state of the Caching/Proxying state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorState {
    Proxying,
    Caching,
}

impl Default for InterceptorState {
    fn default() -> Self {
        InterceptorState::Proxying
    }
}

impl InterceptorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterceptorState::Proxying => "Proxying",
            InterceptorState::Caching => "Caching",
        }
    }

    /// Unknown or missing values default to `Caching`, per the control
    /// surface contract.
    pub fn parse_or_caching(value: Option<&str>) -> Self {
        match value {
            Some("Proxying") => InterceptorState::Proxying,
            _ => InterceptorState::Caching,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_and_query_joins_when_present() {
        let snap = RequestSnapshot {
            method: "GET".into(),
            path: "/foo".into(),
            query: Some("a=1".into()),
            headers: vec![],
            body: vec![],
        };
        assert_eq!(snap.path_and_query(), "/foo?a=1");
    }

    #[test]
    fn path_and_query_omits_when_empty() {
        let snap = RequestSnapshot {
            method: "GET".into(),
            path: "/foo".into(),
            query: None,
            headers: vec![],
            body: vec![],
        };
        assert_eq!(snap.path_and_query(), "/foo");
    }

    #[test]
    fn state_parse_defaults_to_caching() {
        assert_eq!(
            InterceptorState::parse_or_caching(Some("bogus")),
            InterceptorState::Caching
        );
        assert_eq!(
            InterceptorState::parse_or_caching(None),
            InterceptorState::Caching
        );
        assert_eq!(
            InterceptorState::parse_or_caching(Some("Proxying")),
            InterceptorState::Proxying
        );
    }

    #[test]
    fn new_request_is_unsolved() {
        let req = InterceptedRequest::new(
            Uuid::new_v4(),
            1,
            RequestSnapshot {
                method: "GET".into(),
                path: "/".into(),
                query: None,
                headers: vec![],
                body: vec![],
            },
        );
        assert!(!req.solved);
        assert!(req.solved_at.is_none());
        assert_eq!(req.version, 1);
    }
}
