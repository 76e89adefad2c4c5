//! 테스트용 가짜 임베딩 프로바이더

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// 텍스트별로 미리 정한 벡터를 돌려주는 프로바이더
///
/// 등록되지 않은 텍스트는 바이트 합으로 고른 단위 벡터를 받습니다.
pub(crate) struct FakeEmbedding {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    fail_on: Option<String>,
    calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl FakeEmbedding {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
            fail_on: None,
            calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub(crate) fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.fail_on.as_deref() == Some(text) {
            return Err(RagError::EmbeddingFailure(format!("quota exceeded for {:?}", text)));
        }
        if let Some(vector) = self.vectors.get(text) {
            return Ok(vector.clone());
        }

        let slot = text.bytes().map(usize::from).sum::<usize>() % self.dimension;
        let mut vector = vec![0.0; self.dimension];
        vector[slot] = 1.0;
        Ok(vector)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// 쿼리 [1, 0]과 주어진 코사인 유사도를 갖는 2차원 단위 벡터
pub(crate) fn unit_with_similarity(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).sqrt()]
}
