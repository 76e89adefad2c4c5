//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트를 고정 차원 벡터로 변환하는 프로바이더 인터페이스와
//! OpenAI / Gemini 구현체를 제공합니다.
//!
//! 프로바이더 응답은 경계에서 바로 `Embedding`으로 검증합니다.
//! 차원이 다르면 잘라내거나 채우지 않고 `DimensionMismatch`로 거부합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&settings.embedding)?;
//! let vector = embedder.embed("Pasal 1320 KUHPerdata").await?;
//! ```

mod gemini;
mod openai;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::{EmbeddingBackend, EmbeddingSettings};
use crate::error::{RagError, Result};

pub use gemini::GeminiEmbedding;
pub use openai::OpenAiEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 실패 시 내부 재시도 없이 `EmbeddingFailure`를 반환합니다.
/// 재시도 여부는 호출자가 결정합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 쿼리 임베딩
    ///
    /// 문서/쿼리를 구분하는 모델은 이 메서드를 재정의합니다.
    /// 기본 구현은 `embed`와 같습니다.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Embedding
// ============================================================================

/// 차원이 검증된 임베딩 벡터
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// 기대 차원과 일치할 때만 생성
    pub fn new(values: Vec<f32>, expected_dimension: usize) -> Result<Self> {
        if values.len() != expected_dimension {
            return Err(RagError::DimensionMismatch {
                expected: expected_dimension,
                actual: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(RagError::embedding("embedding contains non-finite values"));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
pub(crate) struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    /// 분당 요청 수로 생성 (최소 딜레이 = 60초 / rpm)
    pub(crate) fn per_minute(requests_per_minute: u32) -> Self {
        let max_requests = requests_per_minute.max(1);
        let window = Duration::from_secs(60);
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: window / max_requests,
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    pub(crate) async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();

        // 2. 윈도우 밖의 오래된 요청 제거
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
///
/// API 키는 환경변수에서 읽습니다.
pub fn create_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match settings.provider {
        EmbeddingBackend::OpenAi => {
            let api_key = openai::get_api_key()?;
            Arc::new(OpenAiEmbedding::new(api_key, settings)?)
        }
        EmbeddingBackend::Gemini => {
            let api_key = gemini::get_api_key()?;
            Arc::new(GeminiEmbedding::new(api_key, settings)?)
        }
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

/// 프로바이더별 API 키 존재 여부
pub fn has_api_key(provider: EmbeddingBackend) -> bool {
    match provider {
        EmbeddingBackend::OpenAi => openai::get_api_key().is_ok(),
        EmbeddingBackend::Gemini => gemini::get_api_key().is_ok(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_dimension_checked() {
        assert!(Embedding::new(vec![0.1; 4], 4).is_ok());

        let err = Embedding::new(vec![0.1; 3], 4).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_embedding_rejects_nan() {
        let err = Embedding::new(vec![0.1, f32::NAN], 2).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure(_)));
    }

    #[test]
    fn test_rate_limiter_min_delay() {
        let limiter = RateLimiter::per_minute(60);
        assert_eq!(limiter.min_delay, Duration::from_secs(1));

        let limiter = RateLimiter::per_minute(0);
        assert_eq!(limiter.max_requests, 1);
    }

    struct Constant;

    #[async_trait]
    impl EmbeddingProvider for Constant {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    #[tokio::test]
    async fn test_embed_query_defaults_to_embed() {
        let provider = Constant;
        assert_eq!(
            provider.embed_query("Pasal 1").await.unwrap(),
            provider.embed("Pasal 1").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_rate_limiter_records_requests() {
        let mut limiter = RateLimiter::per_minute(60_000);
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.requests.len(), 2);
        assert!(limiter.last_request.is_some());
    }
}
