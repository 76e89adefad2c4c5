//! legal-rag - 법률 문서 검토용 RAG 코어
//!
//! 교육 모듈 텍스트를 청킹/임베딩하여 벡터 인덱스에 저장하고,
//! 계약서 검토 시 모듈 범위 → 전체 범위 순으로 관련 컨텍스트를 찾습니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use config::{get_data_dir, EmbeddingBackend, EmbeddingSettings, IndexBackend, Settings};
pub use embedding::{
    create_embedder, has_api_key, Embedding, EmbeddingProvider, GeminiEmbedding, OpenAiEmbedding,
};
pub use error::{RagError, Result};
pub use knowledge::{
    chunk, default_chunker, open_index, ChunkConfig, Chunker, ContextTier, IndexStats,
    LanceVectorIndex, RetrievalConfig, RetrievalOrchestrator, RetrievedContext, SearchResult,
    SqliteVectorIndex, TextChunker, TrainingModule, VectorIndex, VectorStore,
};
