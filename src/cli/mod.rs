//! CLI 모듈
//!
//! legal-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::{EmbeddingBackend, Settings};
use crate::embedding::{create_embedder, has_api_key};
use crate::knowledge::{open_index, RetrievalOrchestrator, TextChunker, TrainingModule, VectorStore};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "legal-rag")]
#[command(version, about = "법률 문서 검토용 RAG 도구", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 텍스트, 파일, 또는 교육 모듈 JSON을 인덱싱
    Index {
        /// 소유 모듈 ID (UUID)
        #[arg(short, long)]
        owner: Uuid,

        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 텍스트 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// 교육 모듈 JSON 파일 경로
        #[arg(short, long)]
        module: Option<PathBuf>,
    },

    /// 유사 청크 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// 유사도 임계값 (이 값 초과만)
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        threshold: f32,

        /// 모듈 범위 제한
        #[arg(short, long)]
        owner: Option<Uuid>,
    },

    /// 문서에 대한 프롬프트용 컨텍스트 생성
    Context {
        /// 모듈 ID (UUID)
        #[arg(short, long)]
        owner: Uuid,

        /// 문서 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 문서 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// 모듈의 저장된 청크 목록
    Chunks {
        /// 모듈 ID (UUID)
        owner: Uuid,
    },

    /// 모듈의 임베딩 삭제
    Delete {
        /// 모듈 ID (UUID)
        owner: Uuid,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env().context("환경변수 설정 오류")?;

    match cli.command {
        Commands::Index {
            owner,
            text,
            file,
            module,
        } => cmd_index(&settings, owner, text, file, module).await,
        Commands::Search {
            query,
            limit,
            threshold,
            owner,
        } => cmd_search(&settings, &query, limit, threshold, owner).await,
        Commands::Context { owner, text, file } => cmd_context(&settings, owner, text, file).await,
        Commands::Chunks { owner } => cmd_chunks(&settings, owner).await,
        Commands::Delete { owner } => cmd_delete(&settings, owner).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 설정으로 VectorStore 구성
async fn open_store(settings: &Settings) -> Result<Arc<VectorStore>> {
    ensure_api_key(settings.embedding.provider)?;

    let embedder = create_embedder(&settings.embedding).context("임베딩 프로바이더 초기화 실패")?;
    let index = open_index(settings).await.context("벡터 인덱스 열기 실패")?;
    let store = VectorStore::new(embedder, index).context("VectorStore 초기화 실패")?;
    Ok(Arc::new(store))
}

fn ensure_api_key(provider: EmbeddingBackend) -> Result<()> {
    if !has_api_key(provider) {
        bail!(
            "API 키가 설정되지 않았습니다.\n\
             설정: {}",
            api_key_hint(provider)
        );
    }
    Ok(())
}

fn api_key_hint(provider: EmbeddingBackend) -> &'static str {
    match provider {
        EmbeddingBackend::OpenAi => "export OPENAI_API_KEY=your-key",
        EmbeddingBackend::Gemini => "export GEMINI_API_KEY=your-key",
    }
}

/// --text 또는 --file 중 하나에서 텍스트 읽기
fn read_input(text: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (text, file) {
        (Some(text), None) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("파일 읽기 실패: {}", path.display())),
        (Some(_), Some(_)) => bail!("--text 와 --file 은 함께 사용할 수 없습니다"),
        (None, None) => bail!("--text 또는 --file 중 하나를 지정해야 합니다"),
    }
}

/// 인덱싱 명령어 (index)
///
/// 텍스트는 청킹 후, 교육 모듈은 검색용 블록 단위로 저장합니다.
async fn cmd_index(
    settings: &Settings,
    owner: Uuid,
    text: Option<String>,
    file: Option<PathBuf>,
    module: Option<PathBuf>,
) -> Result<()> {
    let store = open_store(settings).await?;

    let ids = if let Some(path) = module {
        if text.is_some() || file.is_some() {
            bail!("--module 은 --text/--file 과 함께 사용할 수 없습니다");
        }
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("파일 읽기 실패: {}", path.display()))?;
        let module = TrainingModule::from_json(&json).context("교육 모듈 JSON 파싱 실패")?;

        println!("[*] 교육 모듈 인덱싱 중: {}", path.display());
        store
            .store_module(owner, &module)
            .await
            .context("교육 모듈 저장 실패")?
    } else {
        let content = read_input(text, file)?;
        let chunker = TextChunker::new(settings.chunk).context("청킹 설정 오류")?;

        println!(
            "[*] 텍스트 인덱싱 중: {} 문자 (청크 {} / 오버랩 {})",
            content.chars().count(),
            settings.chunk.chunk_size,
            settings.chunk.overlap
        );
        store
            .store_text(owner, &content, &chunker)
            .await
            .context("텍스트 저장 실패")?
    };

    if ids.is_empty() {
        println!("[!] 저장할 내용이 없습니다.");
    } else {
        println!("[OK] {} 청크 저장됨 (모듈 {})", ids.len(), owner);
    }

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(
    settings: &Settings,
    query: &str,
    limit: usize,
    threshold: f32,
    owner: Option<Uuid>,
) -> Result<()> {
    let store = open_store(settings).await?;

    println!("[*] 검색 중: \"{}\"", truncate_text(query, 80));

    let results = store
        .search(query, limit, threshold, owner)
        .await
        .context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [유사도: {:.4}] 모듈 {} #{}",
            i + 1,
            result.similarity_score,
            result.owner_id,
            result.sequence_index
        );
        println!("   내용: {}", truncate_text(&result.chunk_text, 200));
        println!();
    }

    Ok(())
}

/// 컨텍스트 명령어 (context)
///
/// 검토 프롬프트에 들어갈 컨텍스트 문자열을 그대로 출력합니다.
async fn cmd_context(
    settings: &Settings,
    owner: Uuid,
    text: Option<String>,
    file: Option<PathBuf>,
) -> Result<()> {
    let document = read_input(text, file)?;
    let store = open_store(settings).await?;
    let orchestrator = RetrievalOrchestrator::new(store);

    let context = orchestrator
        .retrieve(&document, owner)
        .await
        .context("컨텍스트 검색 실패")?;

    eprintln!(
        "[*] 검색 단계: {} ({} 건)",
        context.tier.as_str(),
        context.results.len()
    );
    println!("{}", context.to_context_string());

    Ok(())
}

/// 청크 목록 명령어 (chunks)
async fn cmd_chunks(settings: &Settings, owner: Uuid) -> Result<()> {
    let store = open_store(settings).await?;

    let chunks = store.list_chunks(owner).await.context("청크 목록 조회 실패")?;

    if chunks.is_empty() {
        println!("[!] 모듈 {}에 저장된 청크가 없습니다.", owner);
        return Ok(());
    }

    println!("[OK] 저장된 청크 ({} 건):\n", chunks.len());

    for (i, chunk) in chunks.iter().enumerate() {
        println!("  #{:<4} {}", i, truncate_text(chunk, 100));
    }

    Ok(())
}

/// 삭제 명령어 (delete)
async fn cmd_delete(settings: &Settings, owner: Uuid) -> Result<()> {
    let store = open_store(settings).await?;

    let deleted = store.delete(owner).await.context("임베딩 삭제 실패")?;

    if deleted > 0 {
        println!("[OK] 모듈 {}의 임베딩 {} 건 삭제됨", owner, deleted);
    } else {
        println!("[!] 삭제할 임베딩이 없습니다");
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 시스템 상태를 확인합니다.
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("legal-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", settings.data_dir.display());
    println!(
        "[*] 임베딩: {:?} / {} ({} 차원)",
        settings.embedding.provider, settings.embedding.model, settings.embedding.dimension
    );
    println!("[*] 벡터 백엔드: {:?}", settings.index_backend);

    // API 키 상태
    let provider = settings.embedding.provider;
    if has_api_key(provider) {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: {}", api_key_hint(provider));
        return Ok(());
    }

    match open_store(settings).await {
        Ok(store) => match store.stats().await {
            Ok(stats) => {
                println!(
                    "[OK] 벡터 인덱스: {} 청크 ({}, {})",
                    stats.record_count, stats.index_backend, stats.embedding_provider
                );
                println!(
                    "     예상 벡터 용량: {}",
                    format_bytes(stats.record_count * stats.dimension * std::mem::size_of::<f32>())
                );
            }
            Err(e) => {
                println!("[!] 통계 조회 실패: {}", e);
            }
        },
        Err(e) => {
            println!("[!] 벡터 인덱스 열기 실패: {:#}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
