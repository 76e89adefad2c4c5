//! Training Module - 생성된 교육 모듈의 검색용 텍스트 추출
//!
//! LLM이 생성한 교육 모듈 JSON에서 RAG 인덱싱 대상 청크를 만듭니다.
//! 모듈 요약, 종합 평가, 조항별 블록, 적용 법령 목록 순서입니다.

use serde::{Deserialize, Serialize};

/// 교육 모듈의 조항 항목
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleClause {
    #[serde(default)]
    pub clause_title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub clause_text: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub potential_issues: Vec<String>,
    #[serde(default)]
    pub relevant_laws: Vec<String>,
}

/// 생성된 교육 모듈 (인덱싱에 필요한 필드만)
///
/// 알 수 없는 필드는 무시합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingModule {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub overall_assessment: Option<String>,
    #[serde(default)]
    pub clauses: Vec<ModuleClause>,
    #[serde(default)]
    pub applicable_laws: Option<Vec<String>>,
}

impl TrainingModule {
    /// JSON 문자열에서 파싱
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// 검색용 청크 목록
    pub fn searchable_chunks(&self) -> Vec<String> {
        let mut chunks = Vec::new();

        if let Some(summary) = &self.summary {
            chunks.push(format!("Document Summary: {}", summary));
        }

        if let Some(assessment) = &self.overall_assessment {
            chunks.push(format!("Overall Assessment: {}", assessment));
        }

        for clause in &self.clauses {
            chunks.push(clause.to_chunk());
        }

        if let Some(laws) = &self.applicable_laws {
            chunks.push(format!("Applicable Indonesian Laws: {}", laws.join(", ")));
        }

        chunks
    }
}

impl ModuleClause {
    fn to_chunk(&self) -> String {
        let text = format!(
            "Clause: {}\nCategory: {}\nContent: {}\nKey Points: {}\nPotential Issues: {}\nRelevant Laws: {}",
            self.clause_title.as_deref().unwrap_or("Unknown"),
            self.category.as_deref().unwrap_or("General"),
            self.clause_text.as_deref().unwrap_or(""),
            self.key_points.join(", "),
            self.potential_issues.join(", "),
            self.relevant_laws.join(", "),
        );
        text.trim().to_string()
    }
}
