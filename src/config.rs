//! 설정 모듈 - 환경변수 기반 런타임 설정
//!
//! 프로세스 시작 시 한 번 읽고 이후에는 변경하지 않습니다.
//! 임베딩 차원은 인덱스가 채워진 뒤에는 바꾸면 안 됩니다 (기존 레코드 무효화).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::knowledge::ChunkConfig;

/// 기본 임베딩 차원 (OpenAI text-embedding-3-small)
pub const DEFAULT_DIMENSION: usize = 1536;

/// 기본 임베딩 모델
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// 기본 Gemini 임베딩 모델
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-embedding-001";

/// 데이터 디렉토리 경로 (~/.legal-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".legal-rag")
}

// ============================================================================
// Backends
// ============================================================================

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    OpenAi,
    Gemini,
}

impl FromStr for EmbeddingBackend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(RagError::Config(format!(
                "unknown embedding provider '{}' (expected openai or gemini)",
                other
            ))),
        }
    }
}

/// 벡터 인덱스 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    /// SQLite 전수 스캔 (정확한 코사인 유사도)
    Sqlite,
    /// LanceDB ANN
    Lance,
}

impl FromStr for IndexBackend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "lance" | "lancedb" => Ok(Self::Lance),
            other => Err(RagError::Config(format!(
                "unknown vector backend '{}' (expected sqlite or lance)",
                other
            ))),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// 임베딩 설정
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingBackend,
    pub model: String,
    pub dimension: usize,
    /// 분당 최대 요청 수
    pub requests_per_minute: u32,
    pub timeout: Duration,
    /// OpenAI 호환 엔드포인트 (기본: https://api.openai.com/v1)
    pub base_url: Option<String>,
}

/// 전체 런타임 설정
#[derive(Debug, Clone)]
pub struct Settings {
    pub embedding: EmbeddingSettings,
    pub index_backend: IndexBackend,
    pub data_dir: PathBuf,
    pub chunk: ChunkConfig,
}

impl Settings {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 키 조회 함수로 설정 로드
    ///
    /// 빈 문자열은 미설정으로 취급합니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("EMBEDDING_PROVIDER") {
            Some(v) => v.parse()?,
            None => EmbeddingBackend::OpenAi,
        };

        let model = get("EMBEDDING_MODEL").unwrap_or_else(|| match provider {
            EmbeddingBackend::OpenAi => DEFAULT_OPENAI_MODEL.to_string(),
            EmbeddingBackend::Gemini => DEFAULT_GEMINI_MODEL.to_string(),
        });

        let dimension = parse_var(&get, "EMBEDDING_DIMENSION", DEFAULT_DIMENSION)?;
        if dimension == 0 {
            return Err(RagError::Config(
                "EMBEDDING_DIMENSION must be positive".to_string(),
            ));
        }

        let default_rpm = match provider {
            EmbeddingBackend::OpenAi => 500,
            EmbeddingBackend::Gemini => 60,
        };
        let requests_per_minute = parse_var(&get, "EMBEDDING_RPM", default_rpm)?;
        let timeout_secs = parse_var(&get, "EMBEDDING_TIMEOUT_SECS", 30u64)?;

        let index_backend = match get("VECTOR_BACKEND") {
            Some(v) => v.parse()?,
            None => IndexBackend::Sqlite,
        };

        let data_dir = get("LEGAL_RAG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(get_data_dir);

        let defaults = ChunkConfig::default();
        let chunk = ChunkConfig::new(
            parse_var(&get, "CHUNK_SIZE", defaults.chunk_size)?,
            parse_var(&get, "CHUNK_OVERLAP", defaults.overlap)?,
        )?;

        Ok(Self {
            embedding: EmbeddingSettings {
                provider,
                model,
                dimension,
                requests_per_minute,
                timeout: Duration::from_secs(timeout_secs),
                base_url: get("OPENAI_BASE_URL"),
            },
            index_backend,
            data_dir,
            chunk,
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RagError::Config(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.embedding.provider, EmbeddingBackend::OpenAi);
        assert_eq!(settings.embedding.model, "text-embedding-3-small");
        assert_eq!(settings.embedding.dimension, 1536);
        assert_eq!(settings.embedding.requests_per_minute, 500);
        assert_eq!(settings.embedding.timeout, Duration::from_secs(30));
        assert_eq!(settings.index_backend, IndexBackend::Sqlite);
        assert_eq!(settings.chunk.chunk_size, 1000);
        assert_eq!(settings.chunk.overlap, 200);
    }

    #[test]
    fn test_gemini_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("EMBEDDING_PROVIDER", "Gemini"),
            ("EMBEDDING_DIMENSION", "768"),
            ("VECTOR_BACKEND", "lance"),
            ("LEGAL_RAG_DATA_DIR", "/tmp/legal-rag"),
        ]))
        .unwrap();

        assert_eq!(settings.embedding.provider, EmbeddingBackend::Gemini);
        assert_eq!(settings.embedding.model, "gemini-embedding-001");
        assert_eq!(settings.embedding.dimension, 768);
        assert_eq!(settings.embedding.requests_per_minute, 60);
        assert_eq!(settings.index_backend, IndexBackend::Lance);
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/legal-rag"));
    }

    #[test]
    fn test_empty_value_falls_back_to_default() {
        let settings = Settings::from_lookup(lookup(&[("EMBEDDING_MODEL", "  ")])).unwrap();
        assert_eq!(settings.embedding.model, "text-embedding-3-small");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Settings::from_lookup(lookup(&[("EMBEDDING_DIMENSION", "abc")])).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));

        let err = Settings::from_lookup(lookup(&[("VECTOR_BACKEND", "faiss")])).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));

        let err = Settings::from_lookup(lookup(&[
            ("CHUNK_SIZE", "100"),
            ("CHUNK_OVERLAP", "100"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RagError::InvalidChunkParameters(_)));
    }
}
