use chrono::{DateTime, Utc};
use rfctl_model::FileRecord;
use sqlx::FromRow;

use crate::{Store, StoreError};

#[derive(FromRow)]
struct FileRow {
    file_hash: String,
    filename: String,
    size: i64,
    mime_type: String,
    path: String,
    created_at: DateTime<Utc>,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        FileRecord {
            file_hash: row.file_hash,
            filename: row.filename,
            size: row.size as u64,
            mime_type: row.mime_type,
            path: row.path,
            created_at: row.created_at,
        }
    }
}

impl Store {
    /// Content-addressed insert (File): a re-upload of the same bytes is
    /// a no-op, since `file_hash` is the primary key.
    pub async fn put_file(&self, file: &FileRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO files (file_hash, filename, size, mime_type, path, created_at)
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.file_hash)
        .bind(&file.filename)
        .bind(file.size as i64)
        .bind(&file.mime_type)
        .bind(&file.path)
        .bind(file.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_file(&self, file_hash: &str) -> Result<Option<FileRecord>, StoreError> {
        let row: Option<FileRow> = sqlx::query_as("SELECT * FROM files WHERE file_hash = ?")
        .bind(file_hash)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(FileRecord::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;

    fn sample_file(hash: &str) -> FileRecord {
        FileRecord {
            file_hash: hash.to_owned(),
            filename: "flag.txt".to_owned(),
            size: 42,
            mime_type: "text/plain".to_owned(),
            path: "uploads/flag.txt".to_owned(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_upload_is_a_noop() {
        let store = test_store().await;
        store.put_file(&sample_file("abc")).await.unwrap();
        store.put_file(&sample_file("abc")).await.unwrap();
        let file = store.get_file("abc").await.unwrap().unwrap();
        assert_eq!(file.filename, "flag.txt");
    }
}
