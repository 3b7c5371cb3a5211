use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::Journal;
use crate::domain::{InterceptedRequest, RequestSnapshot};
use crate::error::InterceptorError;

/// SQLite-backed journal. One connection pool per process, one transaction
/// per write, matching the teacher's db access shape.
pub struct SqliteJournal {
    pool: SqlitePool,
}

impl SqliteJournal {
    pub async fn connect(database_url: &str) -> Result<Self, InterceptorError> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let journal = Self { pool };
        journal.create_table().await?;
        Ok(journal)
    }

    async fn create_table(&self) -> Result<(), InterceptorError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS intercepted_request (
                id TEXT PRIMARY KEY,
                solved_at TIMESTAMP,
                solved BOOLEAN NOT NULL DEFAULT 0,
                req BLOB NOT NULL,
                version INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_intercepted_request_version ON intercepted_request(version)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<InterceptedRequest, InterceptorError> {
        let id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| InterceptorError::StoragePersistFailed(e.to_string()))?;
        let version: i64 = row.try_get("version")?;
        let solved: bool = row.try_get("solved")?;
        let solved_at: Option<chrono::DateTime<Utc>> = row.try_get("solved_at")?;
        let req_bytes: Vec<u8> = row.try_get("req")?;
        let request: Option<RequestSnapshot> = serde_json::from_slice(&req_bytes).ok();

        Ok(InterceptedRequest {
            id,
            version: version as u64,
            request,
            solved,
            solved_at,
        })
    }
}

#[async_trait]
impl Journal for SqliteJournal {
    async fn save(
        &self,
        id: Uuid,
        version: u64,
        request: &RequestSnapshot,
    ) -> Result<(), InterceptorError> {
        let req_bytes = serde_json::to_vec(request)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO intercepted_request(id, solved_at, solved, req, version) VALUES(?, NULL, 0, ?, ?)",
        )
        .bind(id.to_string())
        .bind(req_bytes)
        .bind(version as i64)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_solved(&self, id: Uuid) -> Result<(), InterceptorError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE intercepted_request SET solved_at = ?, solved = 1 WHERE id = ?")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(InterceptorError::RecordNotFound(id.to_string()));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_last_request_solved(&self) -> Result<Option<InterceptedRequest>, InterceptorError> {
        let row = sqlx::query(
            "SELECT id, solved_at, solved, req, version FROM intercepted_request WHERE solved = 1 ORDER BY solved_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_request(&r)).transpose()
    }

    async fn get_all(&self) -> Result<Vec<InterceptedRequest>, InterceptorError> {
        let rows = sqlx::query(
            "SELECT id, solved_at, solved, req, version FROM intercepted_request ORDER BY solved_at IS NULL, solved_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_request).collect()
    }

    async fn get_all_from_last_version(
        &self,
        from_version: u64,
    ) -> Result<Vec<InterceptedRequest>, InterceptorError> {
        let rows = sqlx::query(
            "SELECT id, solved_at, solved, req, version FROM intercepted_request WHERE version >= ? ORDER BY version ASC",
        )
        .bind(from_version as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_request).collect()
    }

    async fn get_last_version(&self) -> Result<u64, InterceptorError> {
        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS max_version FROM intercepted_request")
            .fetch_one(&self.pool)
            .await?;
        let version: i64 = row.try_get("max_version")?;
        Ok(version as u64)
    }
}
