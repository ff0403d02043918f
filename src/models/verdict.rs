use serde::{Deserialize, Serialize};

/// 判定结果的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// LLM 给出的判定
    Oracle,
    /// LLM 不可用，词法分数足够高，直接判为重复
    HighConfidenceFallback,
    /// LLM 不可用，由词法分数和词重叠合成的低置信度判定
    DegradedFallback,
}

/// 一对题目的相似度判定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityVerdict {
    /// 相似度，范围 [0, 1]
    pub score: f64,
    pub is_same: bool,
    pub reasons: Vec<String>,
    pub explanation: String,
    pub source: VerdictSource,
}

impl SimilarityVerdict {
    /// 是否足以判定为重复
    pub fn marks_duplicate(&self, duplicate_threshold: f64) -> bool {
        self.is_same || self.score > duplicate_threshold
    }
}
