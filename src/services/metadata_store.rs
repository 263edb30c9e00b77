//! Data access for the file metadata collection (`{prefix}_files`).

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite, types::Json};
use std::sync::Arc;
use uuid::Uuid;

use super::errors::StoreResult;
use crate::models::file::{CustomMetadata, FileInfo};

const SELECT_COLUMNS: &str =
    "id, filename, content_type, length, chunk_size, checksum, created_at, metadata";

/// Handle on one prefix's metadata table.
#[derive(Clone)]
pub struct FileCollection {
    db: Arc<SqlitePool>,
    table: String,
}

impl FileCollection {
    /// `prefix` must already be validated; it is spliced into SQL.
    pub(crate) fn new(db: Arc<SqlitePool>, prefix: &str) -> Self {
        Self {
            db,
            table: format!("{prefix}_files"),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) async fn create_table(&self) -> StoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id           BLOB PRIMARY KEY NOT NULL,
                filename     TEXT NOT NULL,
                content_type TEXT NOT NULL,
                length       INTEGER,
                chunk_size   INTEGER NOT NULL,
                checksum     TEXT,
                created_at   TEXT,
                metadata     TEXT NOT NULL DEFAULT '{{}}'
            )",
            self.table
        );
        sqlx::query(&sql).execute(&*self.db).await?;
        Ok(())
    }

    /// Insert a record as given. Used both for provisional records (no
    /// length or checksum yet) and for already-complete copies.
    pub async fn insert(&self, file: &FileInfo) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} ({SELECT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        );
        sqlx::query(&sql)
            .bind(file.id)
            .bind(&file.filename)
            .bind(&file.content_type)
            .bind(file.length)
            .bind(file.chunk_size)
            .bind(&file.checksum)
            .bind(file.created_at)
            .bind(&file.metadata)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    /// Mark a provisional record complete. Returns false if the record is gone.
    pub async fn finalize(
        &self,
        id: Uuid,
        length: i64,
        checksum: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let sql = format!(
            "UPDATE {} SET length = ?, checksum = ?, created_at = ? WHERE id = ?",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(length)
            .bind(checksum)
            .bind(created_at)
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetch a record whether or not it is complete.
    pub async fn find(&self, id: Uuid) -> StoreResult<Option<FileInfo>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM {} WHERE id = ?", self.table);
        let file = sqlx::query_as::<_, FileInfo>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(file)
    }

    pub async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", self.table);
        let found = sqlx::query_scalar::<_, i64>(&sql)
            .bind(id)
            .fetch_one(&*self.db)
            .await?;
        Ok(found != 0)
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        let result = sqlx::query(&sql).bind(id).execute(&*self.db).await?;
        Ok(result.rows_affected())
    }

    /// Delete every record whose id is in `ids`.
    pub async fn delete_many(&self, ids: &[Uuid]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE id IN (", self.table));
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

/// Build a provisional record: no length, checksum or completion time.
pub fn provisional(
    id: Uuid,
    filename: String,
    content_type: String,
    chunk_size: i64,
    metadata: CustomMetadata,
) -> FileInfo {
    FileInfo {
        id,
        filename,
        content_type,
        length: None,
        chunk_size,
        checksum: None,
        created_at: None,
        metadata: Json(metadata),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::memory_pool;

    async fn collection() -> FileCollection {
        let files = FileCollection::new(memory_pool().await, "fs");
        files.create_table().await.unwrap();
        files
    }

    #[tokio::test]
    async fn provisional_then_finalize() {
        let files = collection().await;
        let id = Uuid::new_v4();
        let mut meta = CustomMetadata::new();
        meta.insert("owner".into(), "alice".into());
        files
            .insert(&provisional(id, "a.txt".into(), "text/plain".into(), 4, meta))
            .await
            .unwrap();

        let found = files.find(id).await.unwrap().unwrap();
        assert!(!found.is_complete());
        assert_eq!(found.metadata.0["owner"], "alice");

        let now = Utc::now();
        assert!(files.finalize(id, 10, "abc", now).await.unwrap());
        let found = files.find(id).await.unwrap().unwrap();
        assert_eq!(found.length, Some(10));
        assert_eq!(found.checksum.as_deref(), Some("abc"));
        assert!(found.created_at.is_some());
    }

    #[tokio::test]
    async fn finalize_missing_record_reports_false() {
        let files = collection().await;
        assert!(!files.finalize(Uuid::new_v4(), 0, "x", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn delete_variants() {
        let files = collection().await;
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            files
                .insert(&provisional(*id, "f".into(), "t".into(), 4, CustomMetadata::new()))
                .await
                .unwrap();
        }

        assert_eq!(files.delete(ids[0]).await.unwrap(), 1);
        assert_eq!(files.delete(ids[0]).await.unwrap(), 0);
        assert!(!files.exists(ids[0]).await.unwrap());

        assert_eq!(files.delete_many(&ids).await.unwrap(), 2);
        assert_eq!(files.delete_many(&[]).await.unwrap(), 0);
        assert!(!files.exists(ids[2]).await.unwrap());
    }
}
