//! SQLite Vector Index - rusqlite 기반 정확 스캔 인덱스
//!
//! 벡터는 little-endian f32 BLOB으로 저장합니다.
//! 소유자 필터는 SQL WHERE + 인덱스로 스캔 전에 적용하고,
//! 코사인 거리는 남은 행에 대해서만 계산합니다.
//!
//! 저장 위치: ~/.legal-rag/embeddings.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use uuid::Uuid;

use super::vector::{cosine_distance, EmbeddingRecord, IndexHit, VectorIndex};
use crate::embedding::Embedding;
use crate::error::{RagError, Result};

/// 기본 DB 파일 이름
pub const SQLITE_FILE_NAME: &str = "embeddings.db";

// ============================================================================
// SqliteVectorIndex
// ============================================================================

/// SQLite 벡터 인덱스
///
/// 삽입 순서(`seq`)가 동점 처리와 `list_chunks` 순서를 결정합니다.
pub struct SqliteVectorIndex {
    conn: Arc<Mutex<Connection>>,
    dimension: usize,
    db_path: Option<PathBuf>,
}

impl SqliteVectorIndex {
    /// 인덱스 열기 (없으면 생성)
    ///
    /// 이미 다른 차원으로 생성된 인덱스면 `DimensionMismatch`를 반환합니다.
    pub fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RagError::storage(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let index = Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension,
            db_path: Some(path.to_path_buf()),
        };
        index.initialize()?;
        Ok(index)
    }

    /// 메모리 인덱스 (테스트, 임시 작업용)
    pub fn open_in_memory(dimension: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let index = Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension,
            db_path: None,
        };
        index.initialize()?;
        Ok(index)
    }

    /// DB 경로 반환 (메모리 인덱스면 None)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RagError::storage(format!("Lock error: {}", e)))
    }

    /// 스키마 초기화 및 차원 확인
    fn initialize(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(RagError::Config("dimension must be positive".to_string()));
        }

        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                owner_id TEXT NOT NULL,
                sequence_index INTEGER NOT NULL,
                chunk_text TEXT NOT NULL,
                vector BLOB NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_embeddings_owner ON embeddings(owner_id);

            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(value) => {
                let stored_dim: usize = value.parse().map_err(|_| {
                    RagError::storage(format!("corrupt dimension metadata: {}", value))
                })?;
                if stored_dim != self.dimension {
                    return Err(RagError::DimensionMismatch {
                        expected: stored_dim,
                        actual: self.dimension,
                    });
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO index_meta (key, value) VALUES ('dimension', ?1)",
                    params![self.dimension.to_string()],
                )?;
            }
        }

        tracing::debug!(
            "SQLite vector index initialized (dimension={}, path={:?})",
            self.dimension,
            self.db_path
        );
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn insert(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        for record in records {
            if record.vector.dimension() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.vector.dimension(),
                });
            }
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO embeddings (id, owner_id, sequence_index, chunk_text, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for record in records {
                stmt.execute(params![
                    record.id.to_string(),
                    record.owner_id.to_string(),
                    record.sequence_index,
                    record.chunk_text,
                    encode_vector(record.vector.as_slice()),
                    record.created_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    async fn scan(
        &self,
        query: &Embedding,
        owner_id: Option<Uuid>,
        _candidates: usize,
    ) -> Result<Vec<IndexHit>> {
        if query.dimension() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.dimension(),
            });
        }

        let conn = self.lock()?;

        let raw_rows: Vec<(String, String, u32, String, Vec<u8>)> = match owner_id {
            Some(owner) => {
                let mut stmt = conn.prepare(
                    "SELECT id, owner_id, sequence_index, chunk_text, vector FROM embeddings
                     WHERE owner_id = ?1
                     ORDER BY seq",
                )?;
                let rows = stmt.query_map(params![owner.to_string()], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?;
                let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                collected
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, owner_id, sequence_index, chunk_text, vector FROM embeddings
                     ORDER BY seq",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?;
                let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                collected
            }
        };

        let mut hits = Vec::with_capacity(raw_rows.len());
        for (id, owner, sequence_index, chunk_text, blob) in raw_rows {
            let vector = decode_vector(&blob, self.dimension)?;
            hits.push(IndexHit {
                id: parse_uuid(&id)?,
                owner_id: parse_uuid(&owner)?,
                sequence_index,
                chunk_text,
                distance: cosine_distance(query.as_slice(), &vector),
            });
        }

        tracing::debug!("SQLite scan: {} candidates (owner={:?})", hits.len(), owner_id);
        Ok(hits)
    }

    async fn list_chunks(&self, owner_id: Uuid) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT chunk_text FROM embeddings WHERE owner_id = ?1 ORDER BY seq")?;
        let chunks = stmt
            .query_map(params![owner_id.to_string()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(chunks)
    }

    async fn delete_owner(&self, owner_id: Uuid) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM embeddings WHERE owner_id = ?1",
            params![owner_id.to_string()],
        )?;
        Ok(deleted)
    }

    async fn count(&self, owner_id: Option<Uuid>) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = match owner_id {
            Some(owner) => conn.query_row(
                "SELECT COUNT(*) FROM embeddings WHERE owner_id = ?1",
                params![owner.to_string()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vector(blob: &[u8], dimension: usize) -> Result<Vec<f32>> {
    let expected_len = dimension * std::mem::size_of::<f32>();
    if blob.len() != expected_len {
        return Err(RagError::DimensionMismatch {
            expected: dimension,
            actual: blob.len() / std::mem::size_of::<f32>(),
        });
    }

    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| RagError::storage(format!("invalid uuid '{}': {}", s, e)))
}

// ============================================================================
// Tests
// ============================================================================
