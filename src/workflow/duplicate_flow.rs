//! 单题查重流程 - 流程层
//!
//! 核心职责：决定"一道题"是新题还是重复题
//!
//! 流程顺序：
//! 1. 空题直接拒绝
//! 2. 词法预筛：题库中的题 + 本批已接收的新题
//! 3. 按固定顺序逐个交给语义判定，记录最相似的一道
//! 4. 任一候选判为相同即停止，判为重复；否则为新题

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ValidationError;
use crate::models::{QuestionRecord, SimilarityVerdict};
use crate::services::{LexicalScorer, SemanticOracle};
use crate::utils::truncate_text;
use crate::workflow::question_ctx::QuestionCtx;

/// 通过词法预筛的候选题
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub text: String,
    pub lexical: f64,
}

/// 查重结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    Unique,
    Duplicate,
}

/// 单题查重结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub outcome: DetectionOutcome,
    /// 最高分超过报告下限时才给出
    pub most_similar_question: Option<String>,
    pub best_score: f64,
    pub explanation: String,
    /// 实际做了语义判定的候选数
    pub comparisons: usize,
}

impl Detection {
    pub fn is_duplicate(&self) -> bool {
        self.outcome == DetectionOutcome::Duplicate
    }
}

/// 词法预筛
///
/// 返回 `pool` 中分数不低于阈值的题目，保持 `pool` 原有顺序
pub fn prefilter(
    scorer: &LexicalScorer,
    threshold: f64,
    question: &str,
    pool: &[QuestionRecord],
) -> Vec<ScoredCandidate> {
    pool.iter()
        .filter_map(|record| {
            let lexical = scorer.score(question, &record.text);
            (lexical >= threshold).then(|| ScoredCandidate {
                text: record.text.clone(),
                lexical,
            })
        })
        .collect()
}

/// 单题查重流程
///
/// - 不持有题库，题库由编排层传入
/// - 不负责持久化
pub struct DuplicateDetector {
    scorer: LexicalScorer,
    oracle: Arc<SemanticOracle>,
    prefilter_threshold: f64,
    duplicate_threshold: f64,
    reporting_floor: f64,
}

impl DuplicateDetector {
    /// 创建新的查重流程
    pub fn new(config: &Config, oracle: Arc<SemanticOracle>) -> Self {
        Self {
            scorer: LexicalScorer::new(),
            oracle,
            prefilter_threshold: config.prefilter_threshold,
            duplicate_threshold: config.duplicate_threshold,
            reporting_floor: config.reporting_floor,
        }
    }

    pub fn oracle(&self) -> &Arc<SemanticOracle> {
        &self.oracle
    }

    pub fn prefilter_threshold(&self) -> f64 {
        self.prefilter_threshold
    }

    /// 对给定题目池做词法预筛
    pub fn prefilter(&self, question: &str, pool: &[QuestionRecord]) -> Vec<ScoredCandidate> {
        prefilter(&self.scorer, self.prefilter_threshold, question.trim(), pool)
    }

    /// 判定一道题
    ///
    /// # 参数
    /// - `question`: 待查题目
    /// - `corpus_candidates`: 已对题库做过预筛的候选（题库顺序）
    /// - `accepted`: 本批次中已接收的新题（接收顺序）
    /// - `deadline`: 批次截止时间
    ///
    /// # 返回
    /// 空题返回 `ValidationError::EmptyQuestion`，此时不会调用 LLM
    pub async fn detect(
        &self,
        question: &str,
        corpus_candidates: &[ScoredCandidate],
        accepted: &[QuestionRecord],
        ctx: &QuestionCtx,
        deadline: Option<Instant>,
    ) -> Result<Detection, ValidationError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }

        let batch_candidates = self.prefilter(question, accepted);
        debug!(
            "{} 候选: 题库 {} 道，本批 {} 道",
            ctx,
            corpus_candidates.len(),
            batch_candidates.len()
        );

        let mut best: Option<(&ScoredCandidate, SimilarityVerdict)> = None;
        let mut outcome = DetectionOutcome::Unique;
        let mut comparisons = 0usize;

        for candidate in corpus_candidates.iter().chain(batch_candidates.iter()) {
            let verdict = self
                .oracle
                .judge(question, &candidate.text, candidate.lexical, deadline)
                .await;
            comparisons += 1;

            debug!(
                "{} 与「{}」: 词法 {:.2}，判定 {:.2} (相同: {})",
                ctx,
                truncate_text(&candidate.text, 40),
                candidate.lexical,
                verdict.score,
                verdict.is_same
            );

            let is_duplicate = verdict.marks_duplicate(self.duplicate_threshold);
            // 分数相同时保留先出现的
            let is_better = best
                .as_ref()
                .map_or(true, |(_, current)| verdict.score > current.score);
            if is_better {
                best = Some((candidate, verdict));
            }

            if is_duplicate {
                outcome = DetectionOutcome::Duplicate;
                break;
            }
        }

        let detection = match best {
            Some((candidate, verdict)) => Detection {
                outcome,
                most_similar_question: (verdict.score > self.reporting_floor)
                    .then(|| candidate.text.clone()),
                best_score: verdict.score,
                explanation: verdict.explanation,
                comparisons,
            },
            None => Detection {
                outcome,
                most_similar_question: None,
                best_score: 0.0,
                explanation: "未找到相似题目".to_string(),
                comparisons,
            },
        };

        match detection.outcome {
            DetectionOutcome::Duplicate => info!(
                "{} 🔁 重复 (相似度 {:.2})",
                ctx, detection.best_score
            ),
            DetectionOutcome::Unique => info!(
                "{} ✓ 新题 (最高相似度 {:.2})",
                ctx, detection.best_score
            ),
        }

        Ok(detection)
    }
}
