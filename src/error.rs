//! 에러 타입
//!
//! RAG 코어의 모든 연산은 `RagError`를 반환합니다.
//! 빈 검색 결과는 에러가 아닙니다.

use thiserror::Error;

/// RAG 코어 결과 타입
pub type Result<T> = std::result::Result<T, RagError>;

/// RAG 코어 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 청킹 파라미터 오류 (I/O 전에 거부)
    #[error("invalid chunk parameters: {0}")]
    InvalidChunkParameters(String),

    /// 검색 파라미터 오류 (limit, threshold)
    #[error("invalid search parameters: {0}")]
    InvalidSearchParameters(String),

    /// 임베딩 프로바이더가 벡터를 만들지 못함
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    /// 벡터 차원 불일치 - 잘라내거나 채우지 않고 거부
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 벡터 인덱스 저장/조회 실패
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// 환경 설정 오류
    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub(crate) fn embedding(msg: impl Into<String>) -> Self {
        Self::EmbeddingFailure(msg.into())
    }

    pub(crate) fn storage(msg: impl Into<String>) -> Self {
        Self::StorageFailure(msg.into())
    }
}

impl From<rusqlite::Error> for RagError {
    fn from(e: rusqlite::Error) -> Self {
        Self::StorageFailure(format!("sqlite: {}", e))
    }
}

impl From<lancedb::Error> for RagError {
    fn from(e: lancedb::Error) -> Self {
        Self::StorageFailure(format!("lancedb: {}", e))
    }
}

impl From<arrow_schema::ArrowError> for RagError {
    fn from(e: arrow_schema::ArrowError) -> Self {
        Self::StorageFailure(format!("arrow: {}", e))
    }
}

impl From<reqwest::Error> for RagError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::EmbeddingFailure(format!("request timed out: {}", e))
        } else {
            Self::EmbeddingFailure(format!("http: {}", e))
        }
    }
}
