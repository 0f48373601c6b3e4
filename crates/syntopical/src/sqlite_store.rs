//! SQLite-backed [`VectorStore`] implementation.
//!
//! Documents, chunks and vectors live in three tables (see
//! [`migrate`](crate::migrate)). Vectors are stored as little-endian `f32`
//! BLOBs; similarity is brute-force cosine computed in Rust. Replacing a
//! document's chunks runs in one transaction.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use syntopical_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use syntopical_core::error::{Error, Result};
use syntopical_core::models::{Chunk, Document, DocumentSummary, PaperMetadata, RetrievalResult};
use syntopical_core::retrieve::rank_order;
use syntopical_core::store::{Scope, VectorStore};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map a database error onto the store error kind. Lock contention, pool
/// exhaustion and I/O errors are transient.
fn store_err(e: sqlx::Error) -> Error {
    let transient = match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5") | Some("6"))
        }
        _ => false,
    };
    Error::store(e.to_string(), transient)
}

fn is_empty_scope(scope: Option<&Scope>) -> bool {
    scope.is_some_and(|s| s.is_empty())
}

/// Append ` WHERE <column> IN (?, …)` for a scope.
fn push_scope<'a>(qb: &mut QueryBuilder<'a, Sqlite>, column: &str, scope: Option<&'a Scope>) {
    if let Some(scope) = scope {
        qb.push(format!(" WHERE {column} IN ("));
        let mut ids = qb.separated(", ");
        for id in scope {
            ids.push_bind(id.as_str());
        }
        ids.push_unseparated(")");
    }
}

fn json_vec(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn document_from_row(row: &SqliteRow) -> Document {
    let authors: String = row.get("authors_json");
    let keywords: String = row.get("keywords_json");
    let extra: String = row.get("metadata_json");
    let ingested_at: i64 = row.get("ingested_at");
    Document {
        id: row.get("id"),
        title: row.get("title"),
        source_uri: row.get("source_uri"),
        full_text: row.get("body"),
        metadata: PaperMetadata {
            authors: json_vec(&authors),
            published: row.get("published"),
            abstract_text: row.get("abstract"),
            doi: row.get("doi"),
            keywords: json_vec(&keywords),
            extra: serde_json::from_str(&extra).unwrap_or(serde_json::json!({})),
        },
        ingested_at: chrono::DateTime::from_timestamp(ingested_at, 0).unwrap_or_default(),
    }
}

fn chunk_from_row(row: &SqliteRow) -> Chunk {
    Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get::<i64, _>("chunk_index") as usize,
        text: row.get("text"),
        start_offset: row.get::<i64, _>("start_offset") as usize,
        end_offset: row.get::<i64, _>("end_offset") as usize,
        hash: row.get("hash"),
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn replace_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(Error::store(
                format!(
                    "{} chunks but {} vectors for document {}",
                    chunks.len(),
                    vectors.len(),
                    doc.id
                ),
                false,
            ));
        }

        let authors = serde_json::to_string(&doc.metadata.authors)
            .map_err(|e| Error::store(e.to_string(), false))?;
        let keywords = serde_json::to_string(&doc.metadata.keywords)
            .map_err(|e| Error::store(e.to_string(), false))?;
        let extra = serde_json::to_string(&doc.metadata.extra)
            .map_err(|e| Error::store(e.to_string(), false))?;

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, source_uri, body, authors_json, published,
                                   abstract, doi, keywords_json, metadata_json, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                source_uri = excluded.source_uri,
                body = excluded.body,
                authors_json = excluded.authors_json,
                published = excluded.published,
                abstract = excluded.abstract,
                doi = excluded.doi,
                keywords_json = excluded.keywords_json,
                metadata_json = excluded.metadata_json,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.source_uri)
        .bind(&doc.full_text)
        .bind(&authors)
        .bind(&doc.metadata.published)
        .bind(&doc.metadata.abstract_text)
        .bind(&doc.metadata.doi)
        .bind(&keywords)
        .bind(&extra)
        .bind(doc.ingested_at.timestamp())
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, start_offset, end_offset, text, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&doc.id)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.start_offset as i64)
            .bind(chunk.end_offset as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

            sqlx::query("INSERT INTO chunk_vectors (chunk_id, document_id, embedding) VALUES (?, ?, ?)")
                .bind(&chunk.id)
                .bind(&doc.id)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        let deleted = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?
            .rows_affected();

        tx.commit().await.map_err(store_err)?;
        Ok(deleted > 0)
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, source_uri, body, authors_json, published, abstract, doi,
                   keywords_json, metadata_json, ingested_at
            FROM documents WHERE id = ?
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.as_ref().map(document_from_row))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.title, d.source_uri, d.authors_json, d.published,
                   COUNT(c.id) AS chunk_count
            FROM documents d
            LEFT JOIN chunks c ON c.document_id = d.id
            GROUP BY d.id
            ORDER BY d.title ASC, d.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let authors: String = row.get("authors_json");
                DocumentSummary {
                    id: row.get("id"),
                    title: row.get("title"),
                    source_uri: row.get("source_uri"),
                    authors: json_vec(&authors),
                    published: row.get("published"),
                    chunk_count: row.get::<i64, _>("chunk_count") as usize,
                }
            })
            .collect())
    }

    async fn document_ids(&self, scope: Option<&Scope>) -> Result<Vec<String>> {
        if is_empty_scope(scope) {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT DISTINCT document_id FROM chunks");
        push_scope(&mut qb, "document_id", scope);
        qb.push(" ORDER BY document_id ASC");

        qb.build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn count_chunks(&self, scope: Option<&Scope>) -> Result<usize> {
        if is_empty_scope(scope) {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM chunks");
        push_scope(&mut qb, "document_id", scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(count as usize)
    }

    async fn chunks_for(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, start_offset, end_offset, text, hash
            FROM chunks WHERE document_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.iter().map(chunk_from_row).collect())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        scope: Option<&Scope>,
    ) -> Result<Vec<RetrievalResult>> {
        if k == 0 || is_empty_scope(scope) {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT cv.chunk_id, cv.document_id, cv.embedding, d.title,
                   c.chunk_index, c.start_offset, c.end_offset, c.text
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = cv.document_id
            "#,
        );
        push_scope(&mut qb, "cv.document_id", scope);

        let rows = qb.build().fetch_all(&self.pool).await.map_err(store_err)?;

        let mut results: Vec<RetrievalResult> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                RetrievalResult {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    document_title: row.get("title"),
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    start_offset: row.get::<i64, _>("start_offset") as usize,
                    end_offset: row.get::<i64, _>("end_offset") as usize,
                    score: cosine_similarity(vector, &blob_to_vec(&blob)) as f64,
                    text: row.get("text"),
                }
            })
            .collect();

        results.sort_by(rank_order);
        results.truncate(k);
        Ok(results)
    }
}
