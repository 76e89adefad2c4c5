//! Text Chunking Module
//!
//! 문장 경계를 인식하는 오버랩 텍스트 분할을 제공합니다.
//! 임베딩 모델의 컨텍스트 한도와 검색 정밀도 사이의 균형을 맞춥니다.
//!
//! 크기는 모두 문자(char) 단위입니다. 바이트 단위가 아니므로
//! 한글/인도네시아어 등 다중 바이트 텍스트에서도 경계가 깨지지 않습니다.

use crate::error::{RagError, Result};

/// 문장 종결 문자
const SENTENCE_TERMINATORS: [char; 4] = ['.', '!', '?', '\n'];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수, chunk_size 미만)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkConfig {
    /// 검증된 설정 생성
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// 빠른 인덱싱용 설정 (오버랩 없음)
    pub fn for_fast() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 0,
        }
    }

    /// 파라미터 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidChunkParameters(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::InvalidChunkParameters(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// TextChunker
// ============================================================================

/// 문장 경계 인식 청커
///
/// 윈도우 끝이 텍스트 끝보다 앞이면 윈도우 중간 지점까지 거슬러 올라가며
/// 가장 가까운 문장 종결 문자(`.`, `!`, `?`, 줄바꿈)에서 자릅니다.
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 기본 설정으로 생성 (1000 / 200)
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }
}

impl Chunker for TextChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        split_chunks(text, self.config.chunk_size, self.config.overlap)
    }

    fn name(&self) -> &'static str {
        "TextChunker"
    }
}

// ============================================================================
// Chunking
// ============================================================================

/// 텍스트를 오버랩 청크로 분할
///
/// # Arguments
/// * `text` - 분할할 텍스트
/// * `chunk_size` - 청크 크기 (문자 수, 1 이상)
/// * `overlap` - 청크 간 오버랩 (문자 수, chunk_size 미만)
///
/// # Errors
/// 파라미터가 잘못되면 작업 전에 `InvalidChunkParameters`를 반환합니다.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    ChunkConfig::new(chunk_size, overlap)?;
    Ok(split_chunks(text, chunk_size, overlap))
}

/// 검증된 파라미터로 분할
fn split_chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();

    split_spans(&chars, chunk_size, overlap)
        .into_iter()
        .filter_map(|(start, end)| {
            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            (!piece.is_empty()).then(|| piece.to_string())
        })
        .collect()
}

/// 청크 윈도우 `[start, end)` 목록 (문자 인덱스)
///
/// 다음 윈도우의 시작은 항상 이전 시작보다 크고 이전 끝 이하입니다.
fn split_spans(chars: &[char], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let len = chars.len();
    let mut spans = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + chunk_size).min(len);

        if end < len {
            if let Some(boundary) = find_sentence_end(chars, start, end, chunk_size) {
                end = boundary;
            }
        }

        spans.push((start, end));

        if end >= len {
            break;
        }

        // 경계 보정으로 end가 당겨져도 start는 반드시 전진
        start = end.saturating_sub(overlap).max(start + 1);
    }

    spans
}

/// 윈도우 끝에서 중간 지점(제외)까지 역방향으로 문장 종결 문자 탐색
///
/// 찾으면 그 문자 바로 뒤 인덱스를 반환합니다.
fn find_sentence_end(chars: &[char], start: usize, end: usize, chunk_size: usize) -> Option<usize> {
    let midpoint = start + chunk_size / 2;
    (midpoint + 1..=end)
        .rev()
        .find(|&i| SENTENCE_TERMINATORS.contains(&chars[i]))
        .map(|i| i + 1)
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(TextChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_empty() {
        assert!(chunk("", 1000, 200).unwrap().is_empty());
        assert!(chunk("   \n\t ", 1000, 200).unwrap().is_empty());
    }

    #[test]
    fn test_chunk_short_text() {
        assert_eq!(chunk("short text", 1000, 200).unwrap(), vec!["short text"]);
        assert_eq!(chunk("  padded  ", 1000, 200).unwrap(), vec!["padded"]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            chunk("text", 0, 0),
            Err(RagError::InvalidChunkParameters(_))
        ));
        assert!(matches!(
            chunk("text", 10, 10),
            Err(RagError::InvalidChunkParameters(_))
        ));
        assert!(matches!(
            chunk("text", 10, 25),
            Err(RagError::InvalidChunkParameters(_))
        ));
        assert!(TextChunker::new(ChunkConfig {
            chunk_size: 5,
            overlap: 5
        })
        .is_err());
    }

    #[test]
    fn test_breaks_at_sentence_boundary() {
        let chunks = chunk("aaaa. bbbb. cccc.", 10, 0).unwrap();
        assert_eq!(chunks, vec!["aaaa. bbbb.", "cccc."]);
    }

    #[test]
    fn test_overlap_carries_tail_of_previous_chunk() {
        let chunks = chunk("aaaa. bbbb. cccc.", 10, 3).unwrap();
        assert_eq!(chunks, vec!["aaaa. bbbb.", "bb. cccc."]);
    }

    #[test]
    fn test_newline_is_boundary() {
        let chunks = chunk("line one\nline two", 12, 0).unwrap();
        assert_eq!(chunks, vec!["line one", "line two"]);
    }

    #[test]
    fn test_hard_split_without_terminators() {
        let chunks = chunk("abcdefghijklmnop", 5, 0).unwrap();
        assert_eq!(chunks, vec!["abcde", "fghij", "klmno", "p"]);
    }

    #[test]
    fn test_terminator_before_midpoint_is_ignored() {
        let chunks = chunk("a.cdefghijkl", 8, 0).unwrap();
        assert_eq!(chunks, vec!["a.cdefgh", "ijkl"]);
    }

    #[test]
    fn test_multibyte_characters() {
        let chunks = chunk("가나다라마바사아자차카타파하", 5, 1).unwrap();
        assert_eq!(chunks, vec!["가나다라마", "마바사아자", "자차카타파", "파하"]);
    }

    #[test]
    fn test_large_overlap_terminates() {
        let text = "ab.ab.ab.ab.ab.ab.ab.ab.";
        let chunks = chunk(text, 10, 9).unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.len() <= text.chars().count());
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_deterministic() {
        let text = "Pasal 1. Perjanjian ini berlaku sejak ditandatangani! \
                    Apakah para pihak setuju? Ya.\nPasal 2. Kerahasiaan.";
        let first = chunk(text, 30, 10).unwrap();
        let second = chunk(text, 30, 10).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reconstructs_original_without_overlap() {
        // 경계에 공백이 없으면 오버랩 0일 때 이어붙이면 원문과 같아야 함
        let text = "Ketentuan.Umum!Definisi?Kewajiban.Para.Pihak.Berakhir";
        let chunks = chunk(text, 12, 0).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_overlapping_windows_cover_every_character() {
        let text = "Pasal 1. Perjanjian ini berlaku sejak ditandatangani oleh Para Pihak! \
                    Apakah informasi rahasia mencakup data teknis? Ya.\n\
                    Pasal 2. Kewajiban menjaga kerahasiaan berlaku lima tahun.   \n\
                    Pasal 3. Sengketa diselesaikan di Pengadilan Negeri Jakarta Selatan.";
        let chars: Vec<char> = text.chars().collect();

        for (chunk_size, overlap) in [(12, 3), (20, 5), (25, 24), (40, 10), (64, 32), (100, 1)] {
            let spans = split_spans(&chars, chunk_size, overlap);
            let chunks = chunk(text, chunk_size, overlap).unwrap();

            // 각 청크는 자기 윈도우를 trim한 결과
            let trimmed: Vec<String> = spans
                .iter()
                .map(|&(s, e)| chars[s..e].iter().collect::<String>().trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            assert_eq!(chunks, trimmed, "size={} overlap={}", chunk_size, overlap);

            // 오버랩으로 겹친 앞부분을 빼고 이어붙이면 원문
            let mut rebuilt = String::new();
            let mut covered = 0;
            for &(s, e) in &spans {
                assert!(s <= covered, "gap before {} (size={})", s, chunk_size);
                if e > covered {
                    rebuilt.extend(&chars[covered..e]);
                    covered = e;
                }
            }
            assert_eq!(rebuilt, text, "size={} overlap={}", chunk_size, overlap);

            // 공백이 아닌 문자는 청크 안에 순서대로 모두 존재
            let non_ws: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            let mut from_chunks = String::new();
            let mut covered = 0;
            for &(s, e) in &spans {
                if e > covered {
                    from_chunks.extend(chars[covered.max(s)..e].iter().filter(|c| !c.is_whitespace()));
                    covered = e;
                }
            }
            assert_eq!(from_chunks, non_ws, "size={} overlap={}", chunk_size, overlap);
        }
    }

    #[test]
    fn test_chunks_are_ordered_substrings() {
        let text = "First sentence here. Second one follows! Third asks a question? \
                    Fourth ends the paragraph.\nFifth starts a new line.";
        let chunks = chunk(text, 40, 10).unwrap();

        let mut cursor = 0;
        for c in &chunks {
            // 오버랩 때문에 이전 청크 시작 이후에서 찾는다
            let pos = text[cursor..].find(c.as_str()).map(|p| p + cursor);
            assert!(pos.is_some(), "chunk not found in order: {:?}", c);
            cursor = pos.unwrap_or(cursor);
        }
        assert!(text.trim_end().ends_with(chunks.last().unwrap().as_str()));
    }

    #[test]
    fn test_trait_object() {
        let chunker = default_chunker();
        assert_eq!(chunker.name(), "TextChunker");
        assert_eq!(chunker.chunk("short text"), vec!["short text"]);
    }

    #[test]
    fn test_config_presets() {
        let default = ChunkConfig::default();
        assert_eq!(default.chunk_size, 1000);
        assert_eq!(default.overlap, 200);

        let fast = ChunkConfig::for_fast();
        assert_eq!(fast.overlap, 0);
        assert!(fast.validate().is_ok());
    }
}
