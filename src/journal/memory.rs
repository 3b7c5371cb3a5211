use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Journal;
use crate::domain::{InterceptedRequest, RequestSnapshot};
use crate::error::InterceptorError;

/// In-memory journal for standalone/dev mode. Nothing survives a restart.
pub struct InMemoryJournal {
    requests: Mutex<HashMap<Uuid, InterceptedRequest>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn save(
        &self,
        id: Uuid,
        version: u64,
        request: &RequestSnapshot,
    ) -> Result<(), InterceptorError> {
        let mut requests = self.requests.lock().await;
        requests.insert(id, InterceptedRequest::new(id, version, request.clone()));
        Ok(())
    }

    async fn set_solved(&self, id: Uuid) -> Result<(), InterceptorError> {
        let mut requests = self.requests.lock().await;
        let req = requests
            .get_mut(&id)
            .ok_or_else(|| InterceptorError::RecordNotFound(id.to_string()))?;
        req.solved = true;
        req.solved_at = Some(Utc::now());
        Ok(())
    }

    async fn get_last_request_solved(&self) -> Result<Option<InterceptedRequest>, InterceptorError> {
        let requests = self.requests.lock().await;
        let last = requests
            .values()
            .filter(|r| r.solved)
            .max_by_key(|r| r.solved_at)
            .cloned();
        Ok(last)
    }

    async fn get_all(&self) -> Result<Vec<InterceptedRequest>, InterceptorError> {
        let requests = self.requests.lock().await;
        let mut all: Vec<_> = requests.values().cloned().collect();
        all.sort_by(|a, b| match (a.solved_at, b.solved_at) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(all)
    }

    async fn get_all_from_last_version(
        &self,
        from_version: u64,
    ) -> Result<Vec<InterceptedRequest>, InterceptorError> {
        let requests = self.requests.lock().await;
        let mut matching: Vec<_> = requests
            .values()
            .filter(|r| r.version >= from_version)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.version);
        Ok(matching)
    }

    async fn get_last_version(&self) -> Result<u64, InterceptorError> {
        let requests = self.requests.lock().await;
        Ok(requests.values().map(|r| r.version).max().unwrap_or(0))
    }
}
