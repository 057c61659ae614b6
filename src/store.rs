//! Document metadata store.
//!
//! Keyed CRUD over a SQLite `documents` table. The vector index is the
//! source of truth for search; this store holds the cosmetic per-document
//! record (filename, type, size, upload time, chunk count) shown to
//! callers. Eventual consistency with the index is acceptable.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::{Document, FileType};

pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist. Idempotent.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                uploaded_at TEXT NOT NULL,
                chunk_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_uploaded_at ON documents(uploaded_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn put(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, file_type, file_size, uploaded_at, chunk_count)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                filename = excluded.filename,
                file_type = excluded.file_type,
                file_size = excluded.file_size,
                uploaded_at = excluded.uploaded_at,
                chunk_count = excluded.chunk_count
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(doc.file_type.as_str())
        .bind(doc.file_size)
        .bind(doc.uploaded_at.to_rfc3339())
        .bind(doc.chunk_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, filename, file_type, file_size, uploaded_at, chunk_count FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_document).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, filename, file_type, file_size, uploaded_at, chunk_count FROM documents ORDER BY uploaded_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_document).collect()
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn update_chunk_count(&self, id: &str, chunk_count: i64) -> Result<()> {
        sqlx::query("UPDATE documents SET chunk_count = ? WHERE id = ?")
            .bind(chunk_count)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_document(row: sqlx::sqlite::SqliteRow) -> Result<Document> {
    let file_type_str: String = row.get("file_type");
    let file_type = match file_type_str.as_str() {
        "pdf" => FileType::Pdf,
        "docx" => FileType::Docx,
        "txt" => FileType::Txt,
        other => bail!("unknown file_type in store: {}", other),
    };

    let uploaded_at_str: String = row.get("uploaded_at");
    let uploaded_at = DateTime::parse_from_rfc3339(&uploaded_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Document {
        id: row.get("id"),
        filename: row.get("filename"),
        file_type,
        file_size: row.get("file_size"),
        uploaded_at,
        chunk_count: row.get("chunk_count"),
    })
}
