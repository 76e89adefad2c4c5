//! OpenAI 호환 임베딩 프로바이더
//!
//! 기본 모델: text-embedding-3-small (1536 차원)
//! ref: https://platform.openai.com/docs/api-reference/embeddings

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{EmbeddingProvider, RateLimiter};
use crate::config::EmbeddingSettings;
use crate::error::{RagError, Result};

/// 기본 API 엔드포인트
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI 임베딩 구현체
#[derive(Debug)]
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl OpenAiEmbedding {
    /// 새 OpenAI 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API 키
    /// * `settings` - 모델, 차원, 타임아웃, RPM, base URL
    pub fn new(api_key: String, settings: &EmbeddingSettings) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RagError::Config("missing OpenAI API key".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| RagError::Config("invalid OpenAI API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = settings.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            model: settings.model.clone(),
            dimension: settings.dimension,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::per_minute(
                settings.requests_per_minute,
            ))),
        })
    }

    /// text-embedding-3 계열만 `dimensions` 파라미터를 지원
    fn requested_dimensions(&self) -> Option<usize> {
        self.model
            .starts_with("text-embedding-3")
            .then_some(self.dimension)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::embedding("cannot embed empty text"));
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.requested_dimensions(),
        };

        {
            let mut limiter = self.rate_limiter.lock().await;
            limiter.acquire().await;
        }

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OpenAiError>(&body) {
                return Err(RagError::embedding(format!(
                    "OpenAI API error ({}, {}): {}",
                    status,
                    error.error.kind.unwrap_or_default(),
                    error.error.message
                )));
            }
            return Err(RagError::embedding(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::embedding(format!("Failed to parse OpenAI embedding response: {}", e))
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::embedding("OpenAI returned no embedding data"))
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

/// API 키 로드 (`OPENAI_API_KEY` 환경변수)
pub(super) fn get_api_key() -> Result<String> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(RagError::embedding(
            "API key not found. Set OPENAI_API_KEY environment variable.",
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================
