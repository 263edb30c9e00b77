//! Data access for the chunk collection (`{prefix}_chunks`).

use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use uuid::Uuid;

use super::errors::StoreResult;
use crate::models::chunk::Chunk;

/// Rows per multi-row INSERT, keeping bind counts far below SQLite's limit.
const MAX_ROWS_PER_INSERT: usize = 256;

/// Handle on one prefix's chunk table.
#[derive(Clone)]
pub struct ChunkCollection {
    db: Arc<SqlitePool>,
    table: String,
}

impl ChunkCollection {
    /// `prefix` must already be validated; it is spliced into SQL.
    pub(crate) fn new(db: Arc<SqlitePool>, prefix: &str) -> Self {
        Self {
            db,
            table: format!("{prefix}_chunks"),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The `(files_id, n)` primary key doubles as the ordered-retrieval index.
    pub(crate) async fn create_table(&self) -> StoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                files_id BLOB NOT NULL,
                n        INTEGER NOT NULL,
                data     BLOB NOT NULL,
                PRIMARY KEY (files_id, n)
            )",
            self.table
        );
        sqlx::query(&sql).execute(&*self.db).await?;
        Ok(())
    }

    /// Bulk-insert chunk rows in the order given.
    pub async fn insert_many(&self, chunks: &[Chunk]) -> StoreResult<()> {
        for rows in chunks.chunks(MAX_ROWS_PER_INSERT) {
            let mut builder = QueryBuilder::<Sqlite>::new(format!(
                "INSERT INTO {} (files_id, n, data) ",
                self.table
            ));
            builder.push_values(rows, |mut b, chunk| {
                b.push_bind(chunk.files_id)
                    .push_bind(chunk.n)
                    .push_bind(chunk.data.as_slice());
            });
            builder.build().execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Up to `limit` chunks of `files_id` with `n >= from`, ordered by `n`.
    pub async fn fetch_range(
        &self,
        files_id: Uuid,
        from: i64,
        limit: i64,
    ) -> StoreResult<Vec<Chunk>> {
        let sql = format!(
            "SELECT files_id, n, data FROM {} WHERE files_id = ? AND n >= ? ORDER BY n ASC LIMIT ?",
            self.table
        );
        let chunks = sqlx::query_as::<_, Chunk>(&sql)
            .bind(files_id)
            .bind(from)
            .bind(limit)
            .fetch_all(&*self.db)
            .await?;
        Ok(chunks)
    }

    /// Number of chunk rows and their summed payload size for one file.
    pub async fn stats(&self, files_id: Uuid) -> StoreResult<(i64, i64)> {
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(data)), 0) FROM {} WHERE files_id = ?",
            self.table
        );
        let row = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(files_id)
            .fetch_one(&*self.db)
            .await?;
        Ok(row)
    }

    pub async fn delete_for(&self, files_id: Uuid) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {} WHERE files_id = ?", self.table);
        let result = sqlx::query(&sql).bind(files_id).execute(&*self.db).await?;
        Ok(result.rows_affected())
    }

    /// Delete the chunks of every file in `ids`.
    pub async fn delete_many(&self, ids: &[Uuid]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE files_id IN (", self.table));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        let result = builder.build().execute(&*self.db).await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {}", self.table);
        let result = sqlx::query(&sql).execute(&*self.db).await?;
        Ok(result.rows_affected())
    }
}
