//! Knowledge 모듈 - 법률 문서 RAG 저장소
//!
//! - Chunker: 문장 경계 인식 텍스트 분할
//! - SQLite: 정확 스캔 벡터 인덱스 (기본)
//! - LanceDB: ANN 벡터 인덱스
//! - Store: 임베딩 저장 + 코사인 유사도 검색
//! - Retrieval: 모듈 범위 → 전체 범위 2단계 컨텍스트 검색

mod chunker;
mod lance;
mod module;
mod retrieval;
mod sqlite;
mod store;
mod vector;

use std::sync::Arc;

use crate::config::{IndexBackend, Settings};
use crate::error::Result;

// Re-exports
pub use chunker::{chunk, default_chunker, ChunkConfig, Chunker, TextChunker};
pub use lance::{LanceVectorIndex, LANCE_DIR_NAME};
pub use module::{ModuleClause, TrainingModule};
pub use retrieval::{
    ContextTier, RetrievalConfig, RetrievalOrchestrator, RetrievedContext, TierConfig,
    CONTEXT_SEPARATOR, NO_CONTEXT,
};
pub use sqlite::{SqliteVectorIndex, SQLITE_FILE_NAME};
pub use store::{IndexStats, VectorStore};
pub use vector::{
    cosine_distance, cosine_similarity, distance_to_similarity, EmbeddingRecord, IndexHit,
    SearchResult, VectorIndex,
};

/// 설정된 백엔드로 벡터 인덱스 열기
///
/// 데이터 디렉토리 아래 고정된 이름의 파일/디렉토리를 사용합니다.
pub async fn open_index(settings: &Settings) -> Result<Arc<dyn VectorIndex>> {
    let dimension = settings.embedding.dimension;

    let index: Arc<dyn VectorIndex> = match settings.index_backend {
        IndexBackend::Sqlite => {
            let path = settings.data_dir.join(SQLITE_FILE_NAME);
            Arc::new(SqliteVectorIndex::open(&path, dimension)?)
        }
        IndexBackend::Lance => {
            let path = settings.data_dir.join(LANCE_DIR_NAME);
            Arc::new(LanceVectorIndex::open(&path, dimension).await?)
        }
    };

    tracing::info!("Opened {} vector index (dimension: {})", index.name(), dimension);
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingBackend, EmbeddingSettings};
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(dir: &TempDir, backend: IndexBackend) -> Settings {
        Settings {
            embedding: EmbeddingSettings {
                provider: EmbeddingBackend::OpenAi,
                model: "text-embedding-3-small".to_string(),
                dimension: 4,
                requests_per_minute: 500,
                timeout: Duration::from_secs(30),
                base_url: None,
            },
            index_backend: backend,
            data_dir: dir.path().to_path_buf(),
            chunk: ChunkConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_open_sqlite_index() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&settings(&dir, IndexBackend::Sqlite)).await.unwrap();
        assert_eq!(index.name(), "sqlite");
        assert_eq!(index.dimension(), 4);
        assert!(dir.path().join(SQLITE_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_open_lance_index() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&settings(&dir, IndexBackend::Lance)).await.unwrap();
        assert_eq!(index.name(), "lancedb");
        assert_eq!(index.count(None).await.unwrap(), 0);
    }
}
