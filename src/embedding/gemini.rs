//! Google Gemini 임베딩 프로바이더
//!
//! source: https://ai.google.dev/gemini-api/docs/embeddings

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{EmbeddingProvider, RateLimiter};
use crate::config::EmbeddingSettings;
use crate::error::{RagError, Result};

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001 - MRL 지원)
const GEMINI_EMBED_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// MRL로 지원되는 출력 차원
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    model: String,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `settings` - 모델, 차원 (768, 1536, 3072 중 선택), 타임아웃, RPM
    pub fn new(api_key: String, settings: &EmbeddingSettings) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&settings.dimension) {
            return Err(RagError::Config(format!(
                "Invalid Gemini dimension: {}. Must be 768, 1536, or 3072",
                settings.dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model: settings.model.clone(),
            dimension: settings.dimension,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::per_minute(
                settings.requests_per_minute,
            ))),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:embedContent", GEMINI_EMBED_BASE, self.model)
    }
}

/// Gemini 임베딩 작업 유형
///
/// 같은 모델에서도 저장 문서와 검색 쿼리의 작업 유형을 구분합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

/// Gemini API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: TaskType,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiEmbedding {
    fn build_request(&self, text: &str, task_type: TaskType) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type,
            output_dimensionality: self.dimension,
        }
    }

    async fn embed_with_task(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::embedding("cannot embed empty text"));
        }

        let request = self.build_request(text, task_type);

        {
            let mut limiter = self.rate_limiter.lock().await;
            limiter.acquire().await;
        }

        // API 키는 URL이 아닌 헤더로 전송
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                return Err(RagError::embedding(format!(
                    "Gemini API error ({}): {}",
                    error.error.status, error.error.message
                )));
            }
            return Err(RagError::embedding(format!(
                "Gemini API error ({}): {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::embedding(format!("Failed to parse Gemini embedding response: {}", e))
        })?;

        Ok(parsed.embedding.values)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_task(text, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_task(text, TaskType::RetrievalQuery).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub(super) fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.trim().is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    Err(RagError::embedding(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.",
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(dimension: usize) -> EmbeddingSettings {
        EmbeddingSettings {
            provider: crate::config::EmbeddingBackend::Gemini,
            model: "gemini-embedding-001".to_string(),
            dimension,
            requests_per_minute: 60,
            timeout: Duration::from_secs(30),
            base_url: None,
        }
    }

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::new("fake_key".to_string(), &settings(999));
        let err = result.err();
        assert!(err
            .as_ref()
            .map(|e| e.to_string().contains("Invalid Gemini dimension"))
            .unwrap_or(false));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in SUPPORTED_DIMENSIONS {
            let result = GeminiEmbedding::new("fake_key".to_string(), &settings(dim));
            assert!(result.is_ok());
        }
    }

    #[test]
    fn test_endpoint_uses_model() {
        let embedder = GeminiEmbedding::new("fake_key".to_string(), &settings(1536)).unwrap();
        assert!(embedder
            .endpoint()
            .ends_with("/gemini-embedding-001:embedContent"));
        assert_eq!(embedder.name(), "gemini-embedding-001");
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let embedder = GeminiEmbedding::new("fake_key".to_string(), &settings(768)).unwrap();
        assert!(matches!(
            embedder.embed("   ").await,
            Err(RagError::EmbeddingFailure(_))
        ));
        assert!(matches!(
            embedder.embed_query("").await,
            Err(RagError::EmbeddingFailure(_))
        ));
    }

    #[test]
    fn test_task_type_per_side() {
        let embedder = GeminiEmbedding::new("fake_key".to_string(), &settings(768)).unwrap();

        let document = serde_json::to_value(
            embedder.build_request("Pasal 1", TaskType::RetrievalDocument),
        )
        .unwrap();
        assert_eq!(document["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(document["model"], "models/gemini-embedding-001");
        assert_eq!(document["outputDimensionality"], 768);
        assert_eq!(document["content"]["parts"][0]["text"], "Pasal 1");

        let query =
            serde_json::to_value(embedder.build_request("kerahasiaan", TaskType::RetrievalQuery))
                .unwrap();
        assert_eq!(query["taskType"], "RETRIEVAL_QUERY");
    }
}
