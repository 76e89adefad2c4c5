//! Vector Index - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 영속 벡터 인덱스가 제공해야 하는 최소 인터페이스입니다.
//! 삽입, 소유자 단위 삭제, 소유자 필터 최근접 스캔만 요구합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::embedding::Embedding;
use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 임베딩 레코드 (저장용)
///
/// 생성 후 변경되지 않으며, 소유자 삭제 시에만 함께 삭제됩니다.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    /// 레코드 ID
    pub id: Uuid,
    /// 소유 모듈 ID (조회 필터용)
    pub owner_id: Uuid,
    /// 원문 내 청크 순서 (0-based)
    pub sequence_index: u32,
    /// 청크 텍스트
    pub chunk_text: String,
    /// 차원 검증된 임베딩 벡터
    pub vector: Embedding,
    pub created_at: DateTime<Utc>,
}

/// 인덱스 스캔 결과
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub sequence_index: u32,
    pub chunk_text: String,
    /// 코사인 거리 (1 - 코사인 유사도)
    pub distance: f32,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub sequence_index: u32,
    pub chunk_text: String,
    /// 코사인 유사도 (-1.0 ~ 1.0, 높을수록 유사)
    pub similarity_score: f32,
}

impl From<IndexHit> for SearchResult {
    fn from(hit: IndexHit) -> Self {
        Self {
            id: hit.id,
            owner_id: hit.owner_id,
            sequence_index: hit.sequence_index,
            chunk_text: hit.chunk_text,
            similarity_score: distance_to_similarity(hit.distance),
        }
    }
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 영속 벡터 인덱스 트레이트 (async)
///
/// 기존 레코드를 제자리에서 수정하는 연산은 없습니다.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 레코드 배치 삽입 (배치 단위 원자적)
    async fn insert(&self, records: &[EmbeddingRecord]) -> Result<usize>;

    /// 최근접 스캔
    ///
    /// `owner_id`가 있으면 인덱스 내부에서 먼저 필터링합니다.
    /// 최대 `candidates`개를 반환하며, 정확 스캔 백엔드는 범위 내 전체를
    /// 삽입 순서대로 반환할 수 있습니다.
    async fn scan(
        &self,
        query: &Embedding,
        owner_id: Option<Uuid>,
        candidates: usize,
    ) -> Result<Vec<IndexHit>>;

    /// 소유자의 청크 텍스트 (저장 순서)
    async fn list_chunks(&self, owner_id: Uuid) -> Result<Vec<String>>;

    /// 소유자의 모든 레코드 삭제, 삭제된 개수 반환
    async fn delete_owner(&self, owner_id: Uuid) -> Result<usize>;

    /// 레코드 개수 (소유자 지정 시 해당 소유자만)
    async fn count(&self, owner_id: Option<Uuid>) -> Result<usize>;

    /// 인덱스 벡터 차원
    fn dimension(&self) -> usize;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// 코사인 거리 (pgvector `<=>`, LanceDB cosine과 동일한 정의)
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// 코사인 거리를 유사도로 변환
#[inline]
pub fn distance_to_similarity(distance: f32) -> f32 {
    (1.0 - distance).clamp(-1.0, 1.0)
}

// ============================================================================
// Tests
// ============================================================================
