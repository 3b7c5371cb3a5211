mod memory;
mod sqlite;

pub use memory::InMemoryJournal;
pub use sqlite::SqliteJournal;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{InterceptedRequest, RequestSnapshot};
use crate::error::InterceptorError;

/// Append-only, monotonically-versioned record of intercepted requests.
///
/// Versions are assigned by the caller (the Interception Pipeline, under its
/// own mutex) and only ever increase; the journal itself never assigns or
/// rewrites a version.
#[async_trait]
pub trait Journal: Send + Sync {
    async fn save(
        &self,
        id: Uuid,
        version: u64,
        request: &RequestSnapshot,
    ) -> Result<(), InterceptorError>;

    async fn set_solved(&self, id: Uuid) -> Result<(), InterceptorError>;

    /// The most recently solved request, by `solved_at`, or `None` if no
    /// request has ever been solved.
    async fn get_last_request_solved(&self) -> Result<Option<InterceptedRequest>, InterceptorError>;

    async fn get_all(&self) -> Result<Vec<InterceptedRequest>, InterceptorError>;

    /// All records with `version >= from_version`, ordered by version
    /// ascending.
    async fn get_all_from_last_version(
        &self,
        from_version: u64,
    ) -> Result<Vec<InterceptedRequest>, InterceptorError>;

    /// The highest version ever saved, or 0 if the journal is empty.
    async fn get_last_version(&self) -> Result<u64, InterceptorError>;
}
