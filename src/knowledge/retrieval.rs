//! 2단계 컨텍스트 검색
//!
//! 먼저 특정 교육 모듈(owner) 안에서 검색하고, 결과가 없으면
//! 전체 인덱스에서 더 엄격한 임계값으로 다시 검색합니다.
//! 검색된 청크는 구분자로 이어붙여 프롬프트용 문자열 하나로 만듭니다.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::store::VectorStore;
use super::vector::SearchResult;
use crate::error::Result;

/// 청크 구분자
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// 검색 결과가 없을 때 반환하는 문자열
pub const NO_CONTEXT: &str = "No additional context available.";

// ============================================================================
// Configuration
// ============================================================================

/// 단계별 검색 파라미터
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierConfig {
    /// 쿼리로 사용할 문서 앞부분 길이 (문자 수)
    pub query_prefix_chars: usize,
    pub limit: usize,
    pub similarity_threshold: f32,
}

/// 컨텍스트 검색 설정
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    /// 모듈 범위 검색
    pub scoped: TierConfig,
    /// 전체 범위 검색 (폴백)
    pub global: TierConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            scoped: TierConfig {
                query_prefix_chars: 1000,
                limit: 5,
                similarity_threshold: 0.0,
            },
            global: TierConfig {
                query_prefix_chars: 500,
                limit: 3,
                similarity_threshold: 0.5,
            },
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// 컨텍스트를 얻은 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContextTier {
    /// 모듈 범위 검색에서 결과를 얻음
    Scoped,
    /// 전체 범위 폴백에서 결과를 얻음
    Global,
    /// 두 단계 모두 결과 없음
    Empty,
}

impl ContextTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextTier::Scoped => "scoped",
            ContextTier::Global => "global",
            ContextTier::Empty => "empty",
        }
    }
}

/// 검색된 컨텍스트
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub tier: ContextTier,
    pub results: Vec<SearchResult>,
}

impl RetrievedContext {
    /// 프롬프트용 문자열로 변환
    pub fn to_context_string(&self) -> String {
        if self.results.is_empty() {
            return NO_CONTEXT.to_string();
        }
        self.results
            .iter()
            .map(|r| r.chunk_text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }
}

// ============================================================================
// RetrievalOrchestrator
// ============================================================================

/// 2단계 검색기
pub struct RetrievalOrchestrator {
    store: Arc<VectorStore>,
    config: RetrievalConfig,
}

impl RetrievalOrchestrator {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self::with_config(store, RetrievalConfig::default())
    }

    pub fn with_config(store: Arc<VectorStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// 문서에 대한 관련 컨텍스트 검색
    ///
    /// 모듈 범위 결과가 비어 있을 때만 전체 범위로 넘어갑니다.
    /// 검색 에러는 폴백으로 덮지 않고 그대로 반환합니다.
    pub async fn retrieve(&self, document_text: &str, owner_id: Uuid) -> Result<RetrievedContext> {
        let scoped = &self.config.scoped;
        let query = prefix_chars(document_text, scoped.query_prefix_chars);
        let results = self
            .store
            .search(query, scoped.limit, scoped.similarity_threshold, Some(owner_id))
            .await?;

        if !results.is_empty() {
            tracing::debug!(
                "Retrieved {} chunks from module {}",
                results.len(),
                owner_id
            );
            return Ok(RetrievedContext {
                tier: ContextTier::Scoped,
                results,
            });
        }

        tracing::warn!(
            "No chunks found for module {}, falling back to global search",
            owner_id
        );

        let global = &self.config.global;
        let query = prefix_chars(document_text, global.query_prefix_chars);
        let results = self
            .store
            .search(query, global.limit, global.similarity_threshold, None)
            .await?;

        let tier = if results.is_empty() {
            ContextTier::Empty
        } else {
            ContextTier::Global
        };
        tracing::debug!("Global search returned {} chunks", results.len());

        Ok(RetrievedContext { tier, results })
    }

    /// 프롬프트용 컨텍스트 문자열
    pub async fn get_context(&self, document_text: &str, owner_id: Uuid) -> Result<String> {
        Ok(self.retrieve(document_text, owner_id).await?.to_context_string())
    }
}

/// 앞에서부터 최대 `max_chars` 문자
fn prefix_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// Tests
// ============================================================================
