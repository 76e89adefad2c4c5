//! Vector Store - 임베딩 저장 및 유사도 검색
//!
//! 임베딩 프로바이더와 벡터 인덱스를 주입받아
//! 청크 저장, 코사인 유사도 검색, 소유자 단위 조회/삭제를 제공합니다.
//!
//! 같은 owner_id에 대한 동시 `store` 호출은 조율하지 않습니다.
//! 소유자당 인덱싱 작업은 호출자가 하나로 제한해야 합니다.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::chunker::Chunker;
use super::module::TrainingModule;
use super::vector::{EmbeddingRecord, SearchResult, VectorIndex};
use crate::embedding::{Embedding, EmbeddingProvider};
use crate::error::{RagError, Result};

/// 벡터 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub record_count: usize,
    pub dimension: usize,
    pub index_backend: String,
    pub embedding_provider: String,
}

// ============================================================================
// VectorStore
// ============================================================================

/// 벡터 저장소
pub struct VectorStore {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl VectorStore {
    /// 새 저장소 생성
    ///
    /// 프로바이더와 인덱스의 차원이 다르면 `DimensionMismatch`.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Result<Self> {
        if embedder.dimension() != index.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: index.dimension(),
                actual: embedder.dimension(),
            });
        }
        Ok(Self { embedder, index })
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// 텍스트 임베딩 후 차원 검증
    async fn embed_checked(&self, text: &str) -> Result<Embedding> {
        let values = self.embedder.embed(text).await?;
        Embedding::new(values, self.index.dimension())
    }

    /// 청크 저장
    ///
    /// 모든 청크를 원문 순서대로 임베딩한 뒤 한 번에 기록합니다.
    /// 임베딩이 하나라도 실패하면 아무것도 기록하지 않고 에러를 반환합니다.
    ///
    /// # Returns
    /// 생성된 레코드 ID (청크 순서)
    pub async fn store(&self, owner_id: Uuid, chunks: &[String]) -> Result<Vec<Uuid>> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }

        if let Some(pos) = chunks.iter().position(|c| c.trim().is_empty()) {
            return Err(RagError::InvalidChunkParameters(format!(
                "chunk {} is empty",
                pos
            )));
        }

        // 한 번의 store 호출은 같은 생성 시각을 공유
        let created_at = Utc::now();
        let mut records = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            tracing::debug!("Embedding chunk {}/{} (owner={})", i + 1, chunks.len(), owner_id);

            let vector = self.embed_checked(chunk).await.map_err(|e| match e {
                RagError::EmbeddingFailure(msg) => {
                    RagError::EmbeddingFailure(format!("chunk {}: {}", i, msg))
                }
                other => other,
            })?;

            records.push(EmbeddingRecord {
                id: Uuid::new_v4(),
                owner_id,
                sequence_index: i as u32,
                chunk_text: chunk.clone(),
                vector,
                created_at,
            });
        }

        self.index.insert(&records).await?;

        tracing::info!(
            "Stored {} embeddings (owner={}, index={})",
            records.len(),
            owner_id,
            self.index.name()
        );

        Ok(records.into_iter().map(|r| r.id).collect())
    }

    /// 텍스트를 청킹한 뒤 저장
    pub async fn store_text(
        &self,
        owner_id: Uuid,
        text: &str,
        chunker: &dyn Chunker,
    ) -> Result<Vec<Uuid>> {
        let chunks = chunker.chunk(text);
        if chunks.is_empty() {
            tracing::warn!("No chunks generated for owner {}", owner_id);
            return Ok(vec![]);
        }
        self.store(owner_id, &chunks).await
    }

    /// 교육 모듈의 검색용 청크 저장
    pub async fn store_module(&self, owner_id: Uuid, module: &TrainingModule) -> Result<Vec<Uuid>> {
        let chunks = module.searchable_chunks();
        if chunks.is_empty() {
            tracing::warn!("Training module {} has no searchable content", owner_id);
            return Ok(vec![]);
        }
        self.store(owner_id, &chunks).await
    }

    /// 코사인 유사도 검색
    ///
    /// 거리 계산 → 유사도 변환 → 임계값 필터 → 내림차순 정렬 → limit 절단 순서입니다.
    /// 동점은 인덱스가 돌려준 순서를 유지합니다. SQLite 백엔드에서는 삽입 순서이고,
    /// LanceDB 백엔드는 ANN 후보를 `limit`개로 자른 뒤 돌려주므로 동점 순서를 보장하지 않습니다.
    /// 쿼리는 `EmbeddingProvider::embed_query`로 임베딩합니다.
    ///
    /// # Arguments
    /// * `query_text` - 검색 쿼리
    /// * `limit` - 최대 결과 수 (1 이상)
    /// * `similarity_threshold` - 이 값을 초과하는 결과만 (-1.0 ~ 1.0)
    /// * `owner_id` - 지정 시 해당 모듈 내에서만 검색
    pub async fn search(
        &self,
        query_text: &str,
        limit: usize,
        similarity_threshold: f32,
        owner_id: Option<Uuid>,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Err(RagError::InvalidSearchParameters(
                "limit must be positive".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&similarity_threshold) {
            return Err(RagError::InvalidSearchParameters(format!(
                "similarity_threshold {} is outside [-1, 1]",
                similarity_threshold
            )));
        }

        let query = Embedding::new(
            self.embedder.embed_query(query_text).await?,
            self.index.dimension(),
        )?;
        let hits = self.index.scan(&query, owner_id, limit).await?;

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .map(SearchResult::from)
            .filter(|r| r.similarity_score > similarity_threshold)
            .collect();

        // sort_by는 안정 정렬
        results.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(Ordering::Equal)
        });
        results.truncate(limit);

        tracing::debug!(
            "Search returned {} results (owner={:?}, threshold={})",
            results.len(),
            owner_id,
            similarity_threshold
        );

        Ok(results)
    }

    /// 소유자의 모든 청크 텍스트 (저장 순서)
    pub async fn list_chunks(&self, owner_id: Uuid) -> Result<Vec<String>> {
        self.index.list_chunks(owner_id).await
    }

    /// 소유자의 모든 임베딩 삭제
    ///
    /// 없는 소유자는 0을 반환합니다.
    pub async fn delete(&self, owner_id: Uuid) -> Result<usize> {
        let deleted = self.index.delete_owner(owner_id).await?;
        if deleted > 0 {
            tracing::info!("Deleted {} embeddings (owner={})", deleted, owner_id);
        }
        Ok(deleted)
    }

    /// 저장소 통계
    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            record_count: self.index.count(None).await?,
            dimension: self.index.dimension(),
            index_backend: self.index.name().to_string(),
            embedding_provider: self.embedder.name().to_string(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
