//! SQLite search backend: FTS5 keyword ranking blended with stored-vector cosine
//!
//! Both logical indexes share the `chunks` table, separated by `index_kind`.
//! Keyword (negated BM25) and cosine candidates are min-max normalized to [0, 1]
//! and combined as `(1 - alpha) * keyword + alpha * vector`.

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::providers::search_backend::{
    FilterValue, ScoredChunk, SearchBackend, SearchFilter, SearchQuery,
};
use crate::types::{Chunk, IndexKind};

use super::database::{parse_timestamp, Database};

const CHUNK_COLUMNS: &str = "c.id, c.document_id, c.chunk_text, c.embedding, c.page_number, \
    c.sequence_index, c.file_name, c.user_id, c.group_id, c.is_default, c.version, \
    c.upload_timestamp, c.storage_locator";

/// Candidate pool per channel, relative to the requested top
const CANDIDATE_FACTOR: usize = 4;
const MIN_CANDIDATES: usize = 50;

/// Chunk search over the local SQLite database
pub struct SqliteSearchBackend {
    db: Database,
    alpha: f32,
}

impl SqliteSearchBackend {
    pub fn new(db: Database, alpha: f32) -> Self {
        Self {
            db,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    /// Number of chunks stored in an index
    pub fn count(&self, index: IndexKind) -> Result<usize> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chunks WHERE index_kind = ?1",
                params![index.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    fn upsert_sync(&self, index: IndexKind, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        self.db.with_conn(|conn| {
            let tx = conn.transaction()
                .map_err(|e| Error::search_index(format!("Failed to begin transaction: {}", e)))?;

            {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO chunks (
                        id, index_kind, document_id, chunk_text, embedding, page_number,
                        sequence_index, file_name, user_id, group_id, is_default, version,
                        upload_timestamp, storage_locator
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    ON CONFLICT(index_kind, id) DO UPDATE SET
                        document_id = excluded.document_id,
                        chunk_text = excluded.chunk_text,
                        embedding = excluded.embedding,
                        page_number = excluded.page_number,
                        sequence_index = excluded.sequence_index,
                        file_name = excluded.file_name,
                        user_id = excluded.user_id,
                        group_id = excluded.group_id,
                        is_default = excluded.is_default,
                        version = excluded.version,
                        upload_timestamp = excluded.upload_timestamp,
                        storage_locator = excluded.storage_locator
                    "#
                ).map_err(|e| Error::search_index(format!("Failed to prepare statement: {}", e)))?;

                for chunk in chunks {
                    stmt.execute(params![
                        chunk.id,
                        index.as_str(),
                        chunk.document_id,
                        chunk.chunk_text,
                        chunk.embedding.as_deref().map(encode_vector),
                        chunk.page_number as i64,
                        chunk.sequence_index as i64,
                        chunk.file_name,
                        chunk.user_id,
                        chunk.group_id,
                        chunk.is_default,
                        chunk.version as i64,
                        chunk.upload_timestamp.to_rfc3339(),
                        chunk.storage_locator,
                    ]).map_err(|e| Error::search_index(format!("Failed to upsert chunk {}: {}", chunk.id, e)))?;
                }
            }

            tx.commit()
                .map_err(|e| Error::search_index(format!("Failed to commit transaction: {}", e)))?;
            Ok(())
        })
    }

    fn delete_sync(&self, index: IndexKind, ids: &[String]) -> Result<usize> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()
                .map_err(|e| Error::search_index(format!("Failed to begin transaction: {}", e)))?;
            let mut deleted = 0;
            {
                let mut stmt = tx
                    .prepare("DELETE FROM chunks WHERE index_kind = ?1 AND id = ?2")
                    .map_err(|e| Error::search_index(format!("Failed to prepare delete: {}", e)))?;
                for id in ids {
                    deleted += stmt
                        .execute(params![index.as_str(), id])
                        .map_err(|e| Error::search_index(format!("Failed to delete chunk {}: {}", id, e)))?;
                }
            }
            tx.commit()
                .map_err(|e| Error::search_index(format!("Failed to commit transaction: {}", e)))?;
            Ok(deleted)
        })
    }

    fn search_sync(&self, index: IndexKind, query: &SearchQuery) -> Result<Vec<ScoredChunk>> {
        if query.top == 0 {
            return Ok(Vec::new());
        }

        let fts_query = if query.has_text() {
            query.text.as_deref().and_then(fts_expression)
        } else {
            None
        };
        let vector = query.vector.as_deref().filter(|v| !v.is_empty());

        if fts_query.is_none() && vector.is_none() {
            return self.filter_only(index, &query.filter, query.top);
        }

        let pool = if vector.is_some() && fts_query.is_some() {
            (query.top * CANDIDATE_FACTOR).max(MIN_CANDIDATES)
        } else {
            query.top
        };

        let keyword = match &fts_query {
            Some(expr) => self.keyword_candidates(index, expr, &query.filter, pool)?,
            None => Vec::new(),
        };
        let semantic = match vector {
            Some(v) => self.vector_candidates(index, v, &query.filter, pool)?,
            None => Vec::new(),
        };

        let alpha = match (fts_query.is_some(), vector.is_some()) {
            (true, false) => 0.0,
            (false, true) => 1.0,
            _ => self.alpha,
        };

        Ok(blend(keyword, semantic, alpha, query.top))
    }

    fn filter_only(&self, index: IndexKind, filter: &SearchFilter, top: usize) -> Result<Vec<ScoredChunk>> {
        let mut values = vec![Value::Text(index.as_str().to_string())];
        let clause = filter_sql(filter, &mut values);
        values.push(Value::Integer(top.min(i64::MAX as usize) as i64));

        let sql = format!(
            "SELECT {} FROM chunks c WHERE c.index_kind = ? AND {} \
             ORDER BY c.document_id, c.sequence_index LIMIT ?",
            CHUNK_COLUMNS, clause
        );

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)
                .map_err(|e| Error::search_index(format!("Failed to prepare query: {}", e)))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), |row| row_to_chunk(row, 0))
                .map_err(|e| Error::search_index(format!("Failed to run query: {}", e)))?;
            Ok(rows
                .filter_map(log_row_error)
                .map(|chunk| ScoredChunk { chunk, score: 0.0 })
                .collect())
        })
    }

    fn keyword_candidates(
        &self,
        index: IndexKind,
        fts_query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let mut values = vec![
            Value::Text(fts_query.to_string()),
            Value::Text(index.as_str().to_string()),
        ];
        let clause = filter_sql(filter, &mut values);
        values.push(Value::Integer(limit as i64));

        let sql = format!(
            "SELECT {}, bm25(chunks_fts) AS rank FROM chunks_fts \
             JOIN chunks c ON c.rowid = chunks_fts.rowid \
             WHERE chunks_fts MATCH ? AND c.index_kind = ? AND {} \
             ORDER BY rank LIMIT ?",
            CHUNK_COLUMNS, clause
        );

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)
                .map_err(|e| Error::search_index(format!("Failed to prepare FTS query: {}", e)))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), |row| {
                    let chunk = row_to_chunk(row, 0)?;
                    let rank: f64 = row.get(13)?;
                    // bm25() is lower-is-better
                    Ok(ScoredChunk { chunk, score: -rank as f32 })
                })
                .map_err(|e| Error::search_index(format!("Failed to execute FTS query: {}", e)))?;
            Ok(rows.filter_map(log_row_error).collect())
        })
    }

    fn vector_candidates(
        &self,
        index: IndexKind,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let mut values = vec![Value::Text(index.as_str().to_string())];
        let clause = filter_sql(filter, &mut values);

        let sql = format!(
            "SELECT {} FROM chunks c WHERE c.index_kind = ? AND c.embedding IS NOT NULL AND {}",
            CHUNK_COLUMNS, clause
        );

        let mut scored: Vec<ScoredChunk> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)
                .map_err(|e| Error::search_index(format!("Failed to prepare vector query: {}", e)))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), |row| row_to_chunk(row, 0))
                .map_err(|e| Error::search_index(format!("Failed to run vector query: {}", e)))?;
            Ok(rows
                .filter_map(log_row_error)
                .filter_map(|chunk| {
                    let score = cosine_similarity(query, chunk.embedding.as_deref()?)?;
                    Some(ScoredChunk { chunk, score })
                })
                .collect())
        })?;

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[async_trait]
impl SearchBackend for SqliteSearchBackend {
    async fn upsert(&self, index: IndexKind, chunks: &[Chunk]) -> Result<()> {
        let backend = self.clone_handle();
        let chunks = chunks.to_vec();
        tokio::task::spawn_blocking(move || backend.upsert_sync(index, &chunks))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn delete(&self, index: IndexKind, ids: &[String]) -> Result<usize> {
        let backend = self.clone_handle();
        let ids = ids.to_vec();
        tokio::task::spawn_blocking(move || backend.delete_sync(index, &ids))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn search(&self, index: IndexKind, query: &SearchQuery) -> Result<Vec<ScoredChunk>> {
        let backend = self.clone_handle();
        let query = query.clone();
        tokio::task::spawn_blocking(move || backend.search_sync(index, &query))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.count(IndexKind::Personal).is_ok())
    }

    fn name(&self) -> &str {
        "sqlite-fts5"
    }
}

impl SqliteSearchBackend {
    fn clone_handle(&self) -> Self {
        Self {
            db: self.db.clone(),
            alpha: self.alpha,
        }
    }
}

/// Combine keyword and vector candidates into one ranked list
fn blend(keyword: Vec<ScoredChunk>, semantic: Vec<ScoredChunk>, alpha: f32, top: usize) -> Vec<ScoredChunk> {
    let kw_norm = normalize_scores(&keyword);
    let vec_norm = normalize_scores(&semantic);

    let mut merged: HashMap<String, (Chunk, f32, f32)> = HashMap::new();
    for (candidate, norm) in keyword.into_iter().zip(kw_norm) {
        merged.insert(candidate.chunk.id.clone(), (candidate.chunk, norm, 0.0));
    }
    for (candidate, norm) in semantic.into_iter().zip(vec_norm) {
        merged
            .entry(candidate.chunk.id.clone())
            .and_modify(|entry| entry.2 = norm)
            .or_insert((candidate.chunk, 0.0, norm));
    }

    let mut results: Vec<ScoredChunk> = merged
        .into_values()
        .map(|(chunk, k, v)| ScoredChunk {
            chunk,
            score: (1.0 - alpha) * k + alpha * v,
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    results.truncate(top);
    results
}

/// Min-max normalize scores to [0, 1]
fn normalize_scores(candidates: &[ScoredChunk]) -> Vec<f32> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let min = candidates.iter().map(|c| c.score).fold(f32::INFINITY, f32::min);
    let max = candidates.iter().map(|c| c.score).fold(f32::NEG_INFINITY, f32::max);

    candidates
        .iter()
        .map(|c| {
            if (max - min).abs() < f32::EPSILON {
                1.0
            } else {
                (c.score - min) / (max - min)
            }
        })
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return Some(0.0);
    }
    Some(dot / (na.sqrt() * nb.sqrt()))
}

/// Turn free text into an FTS5 OR-query of quoted terms
fn fts_expression(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Render a filter as a SQL predicate over `c.*`, appending bound values
fn filter_sql(filter: &SearchFilter, values: &mut Vec<Value>) -> String {
    match filter {
        SearchFilter::All => "1=1".to_string(),
        SearchFilter::Eq(field, value) => {
            values.push(match value {
                FilterValue::Text(s) => Value::Text(s.clone()),
                FilterValue::Int(i) => Value::Integer(*i),
                FilterValue::Bool(b) => Value::Integer(i64::from(*b)),
            });
            format!("c.{} = ?", field.name())
        }
        SearchFilter::And(parts) if parts.is_empty() => "1=1".to_string(),
        SearchFilter::Or(parts) if parts.is_empty() => "0=1".to_string(),
        SearchFilter::And(parts) | SearchFilter::Or(parts) => {
            let op = if matches!(filter, SearchFilter::And(_)) { " AND " } else { " OR " };
            let rendered: Vec<String> = parts.iter().map(|p| filter_sql(p, values)).collect();
            format!("({})", rendered.join(op))
        }
    }
}

fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn log_row_error<T>(row: rusqlite::Result<T>) -> Option<T> {
    match row {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Error reading search result: {}", e);
            None
        }
    }
}

fn row_to_chunk(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Chunk> {
    let embedding: Option<Vec<u8>> = row.get(offset + 3)?;
    let page_number: i64 = row.get(offset + 4)?;
    let sequence_index: i64 = row.get(offset + 5)?;
    let version: i64 = row.get(offset + 10)?;
    let timestamp: String = row.get(offset + 11)?;

    Ok(Chunk {
        id: row.get(offset)?,
        document_id: row.get(offset + 1)?,
        chunk_text: row.get(offset + 2)?,
        embedding: embedding.map(|b| decode_vector(&b)),
        page_number: page_number.max(1) as u32,
        sequence_index: sequence_index.max(0) as u32,
        file_name: row.get(offset + 6)?,
        user_id: row.get(offset + 7)?,
        group_id: row.get(offset + 8)?,
        is_default: row.get(offset + 9)?,
        version: version.max(0) as u32,
        upload_timestamp: parse_timestamp(&timestamp),
        storage_locator: row.get(offset + 12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::search_backend::FilterField;
    use chrono::Utc;

    fn chunk(id: &str, doc: &str, text: &str, embedding: Option<Vec<f32>>, user: Option<&str>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: doc.to_string(),
            chunk_text: text.to_string(),
            embedding,
            page_number: 1,
            sequence_index: id.rsplit('_').next().and_then(|s| s.parse().ok()).unwrap_or(0),
            file_name: format!("{}.txt", doc),
            user_id: user.map(str::to_string),
            group_id: None,
            is_default: user.is_none(),
            version: 1,
            upload_timestamp: Utc::now(),
            storage_locator: "local://x".to_string(),
        }
    }

    fn backend() -> SqliteSearchBackend {
        SqliteSearchBackend::new(Database::in_memory().unwrap(), 0.5)
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let backend = backend();
        let c = chunk("d1_0", "d1", "alpha beta", None, Some("u"));
        backend.upsert(IndexKind::Personal, &[c.clone()]).await.unwrap();
        backend.upsert(IndexKind::Personal, &[c]).await.unwrap();
        assert_eq!(backend.count(IndexKind::Personal).unwrap(), 1);
        assert_eq!(backend.count(IndexKind::Group).unwrap(), 0);

        // FTS mirror stays in sync after the update path
        let hits = backend
            .search(IndexKind::Personal, &SearchQuery::text("alpha", SearchFilter::All, 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_keyword_search_with_filter() {
        let backend = backend();
        backend
            .upsert(
                IndexKind::Personal,
                &[
                    chunk("a_0", "a", "quarterly revenue grew", None, Some("alice")),
                    chunk("b_0", "b", "quarterly revenue fell", None, Some("bob")),
                    chunk("c_0", "c", "unrelated text", None, None),
                ],
            )
            .await
            .unwrap();

        let filter = SearchFilter::eq_text(FilterField::UserId, "alice");
        let hits = backend
            .search(IndexKind::Personal, &SearchQuery::text("revenue", filter, 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "a_0");

        let filter = SearchFilter::eq_bool(FilterField::IsDefault, true);
        let hits = backend
            .search(IndexKind::Personal, &SearchQuery::filtered(filter, 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "c_0");
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_cosine() {
        let backend = backend();
        backend
            .upsert(
                IndexKind::Group,
                &[
                    chunk("x_0", "x", "one", Some(vec![1.0, 0.0]), Some("u")),
                    chunk("y_0", "y", "two", Some(vec![0.0, 1.0]), Some("u")),
                    chunk("z_0", "z", "three", None, Some("u")),
                ],
            )
            .await
            .unwrap();

        let query = SearchQuery {
            text: None,
            vector: Some(vec![0.9, 0.1]),
            filter: SearchFilter::All,
            top: 5,
        };
        let hits = backend.search(IndexKind::Group, &query).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "x_0");
        assert_eq!(hits[0].chunk.embedding.as_deref(), Some(&[1.0f32, 0.0][..]));
    }

    #[tokio::test]
    async fn test_hybrid_blends_both_channels() {
        let backend = backend();
        backend
            .upsert(
                IndexKind::Personal,
                &[
                    chunk("k_0", "k", "budget budget budget", Some(vec![0.0, 1.0]), Some("u")),
                    chunk("v_0", "v", "nothing relevant", Some(vec![1.0, 0.0]), Some("u")),
                    chunk("b_0", "b", "budget", Some(vec![0.8, 0.2]), Some("u")),
                ],
            )
            .await
            .unwrap();

        let hits = backend
            .search(
                IndexKind::Personal,
                &SearchQuery::hybrid("budget", vec![1.0, 0.0], SearchFilter::All, 3),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_delete_removes_from_fts() {
        let backend = backend();
        backend
            .upsert(IndexKind::Personal, &[chunk("d_0", "d", "searchable words", None, Some("u"))])
            .await
            .unwrap();

        let deleted = backend
            .delete(IndexKind::Personal, &["d_0".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let hits = backend
            .search(IndexKind::Personal, &SearchQuery::text("searchable", SearchFilter::All, 10))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_normalize_scores() {
        let c = |score| ScoredChunk { chunk: chunk("a_0", "a", "t", None, None), score };
        assert!(normalize_scores(&[]).is_empty());
        assert_eq!(normalize_scores(&[c(3.0)]), vec![1.0]);
        assert_eq!(normalize_scores(&[c(2.0), c(4.0), c(3.0)]), vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_alpha_extremes_preserve_channel_order() {
        let mk = |id: &str, score| ScoredChunk { chunk: chunk(id, "d", "t", None, None), score };
        let keyword = vec![mk("a_0", 3.0), mk("b_0", 2.0)];
        let semantic = vec![mk("a_0", 0.1), mk("b_0", 0.9)];

        let kw_only = blend(keyword.clone(), semantic.clone(), 0.0, 2);
        assert_eq!(kw_only[0].chunk.id, "a_0");

        let vec_only = blend(keyword, semantic, 1.0, 2);
        assert_eq!(vec_only[0].chunk.id, "b_0");
    }

    #[test]
    fn test_fts_expression() {
        assert_eq!(fts_expression("report.pdf").as_deref(), Some("\"report\" OR \"pdf\""));
        assert_eq!(fts_expression("  \"*\" "), None);
    }

    #[test]
    fn test_vector_codec() {
        let v = vec![0.5f32, -1.25, 3.0];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }
}
