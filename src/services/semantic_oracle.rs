//! 语义判定服务 - 业务能力层
//!
//! 只负责"一对题目在语义上是否相同"，对外永不失败：
//! - 先查缓存
//! - 受速率预算约束地调用 LLM
//! - 频率限制/临时故障按指数退避重试
//! - 返回格式错误时用简化 prompt 再试一次
//! - 全部失败或超过截止时间时，合成降级判定

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};

use crate::clients::SemanticJudge;
use crate::config::Config;
use crate::error::JudgeError;
use crate::infrastructure::{MetricsSink, RateBudget};
use crate::models::{SimilarityVerdict, VerdictSource};
use crate::services::lexical_scorer::LexicalScorer;
use crate::services::response_sanitizer::ResponseSanitizer;
use crate::services::similarity_cache::SimilarityCache;
use crate::utils::truncate_text;

/// 重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// 第 `failures` 次失败后的等待时间：base * 2^(failures-1)
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptMode {
    Full,
    Simplified,
}

/// 语义判定服务
pub struct SemanticOracle {
    judge: Arc<dyn SemanticJudge>,
    budget: Arc<RateBudget>,
    cache: Arc<SimilarityCache>,
    metrics: Arc<dyn MetricsSink>,
    sanitizer: ResponseSanitizer,
    scorer: LexicalScorer,
    retry: RetryPolicy,
    high_confidence_threshold: f64,
    duplicate_threshold: f64,
}

impl SemanticOracle {
    /// 创建新的语义判定服务
    pub fn new(
        config: &Config,
        judge: Arc<dyn SemanticJudge>,
        cache: Arc<SimilarityCache>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            judge,
            budget: Arc::new(RateBudget::from_config(config)),
            cache,
            metrics,
            sanitizer: ResponseSanitizer::new(config.duplicate_threshold),
            scorer: LexicalScorer::new(),
            retry: RetryPolicy {
                base_delay: config.retry_base_delay(),
                max_attempts: config.max_attempts.max(1),
            },
            high_confidence_threshold: config.high_confidence_threshold,
            duplicate_threshold: config.duplicate_threshold,
        }
    }

    pub fn cache(&self) -> &Arc<SimilarityCache> {
        &self.cache
    }

    /// 清空缓存并同步缓存大小统计
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.metrics.set_cache_size(0);
    }

    /// 判定一对题目
    ///
    /// # 参数
    /// - `a`, `b`: 两道题目
    /// - `lexical`: 这对题目的词法分数
    /// - `deadline`: 截止时间，过期后立即降级
    ///
    /// # 返回
    /// 总是返回一个判定；只有 LLM 给出的判定会写入缓存
    pub async fn judge(
        &self,
        a: &str,
        b: &str,
        lexical: f64,
        deadline: Option<Instant>,
    ) -> SimilarityVerdict {
        if let Some(cached) = self.cache.get(a, b) {
            debug!("缓存命中: {} <-> {}", truncate_text(a, 30), truncate_text(b, 30));
            return cached;
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return self.fallback(a, b, lexical, &JudgeError::transient("已超过批次截止时间"));
        }

        let outcome = match deadline {
            Some(deadline) => match timeout_at(deadline, self.consult(a, b, lexical)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(JudgeError::transient("已超过批次截止时间")),
            },
            None => self.consult(a, b, lexical).await,
        };

        match outcome {
            Ok(verdict) => {
                self.cache.put(a, b, verdict.clone());
                self.metrics.set_cache_size(self.cache.len());
                verdict
            }
            Err(err) => self.fallback(a, b, lexical, &err),
        }
    }

    /// 带重试地调用 LLM，返回最后一次的错误
    async fn consult(&self, a: &str, b: &str, lexical: f64) -> Result<SimilarityVerdict, JudgeError> {
        let mut mode = PromptMode::Full;
        let mut malformed_retried = false;
        let mut failures = 0u32;

        loop {
            let result = {
                let _permit = self.budget.acquire().await?;
                debug!("已获取调用许可，剩余并发槽 {}", self.budget.free_slots());
                self.metrics.record_oracle_call();
                let prompt = build_prompt(a, b, mode);
                match self.judge.request(&prompt).await {
                    Ok(raw) => self.sanitizer.parse(&raw, lexical),
                    Err(err) => Err(err),
                }
            };

            let err = match result {
                Ok(verdict) => return Ok(verdict),
                Err(err) => err,
            };
            self.metrics.record_oracle_failure();

            match err {
                JudgeError::MalformedOutput { .. } if !malformed_retried => {
                    warn!("⚠️ LLM 返回格式错误，改用简化 prompt 重试: {}", err);
                    malformed_retried = true;
                    mode = PromptMode::Simplified;
                }
                JudgeError::MalformedOutput { .. } => return Err(err),
                JudgeError::RateLimited { .. } | JudgeError::Transient { .. } => {
                    failures += 1;
                    if failures >= self.retry.max_attempts {
                        return Err(err);
                    }
                    let delay = self.retry.delay_for(failures);
                    warn!(
                        "⚠️ LLM 调用失败 (第 {}/{} 次)，{:?} 后重试: {}",
                        failures, self.retry.max_attempts, delay, err
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// 合成降级判定，每次调用计一次降级
    fn fallback(&self, a: &str, b: &str, lexical: f64, err: &JudgeError) -> SimilarityVerdict {
        self.metrics.record_fallback();

        if lexical >= self.high_confidence_threshold {
            warn!(
                "⚠️ LLM 不可用 ({})，词法相似度 {:.2} 足够高，直接判为重复",
                err, lexical
            );
            return SimilarityVerdict {
                score: lexical,
                is_same: true,
                reasons: vec![format!("词法相似度 {:.2}", lexical)],
                explanation: format!("LLM 不可用，按高置信度词法匹配判定 ({})", err),
                source: VerdictSource::HighConfidenceFallback,
            };
        }

        let overlap = self.scorer.token_overlap(a, b);
        let score = (0.7 * lexical + 0.3 * overlap).clamp(0.0, 1.0);
        warn!(
            "⚠️ LLM 不可用 ({})，使用降级判定: 词法 {:.2}，词重叠 {:.2}",
            err, lexical, overlap
        );
        SimilarityVerdict {
            score,
            is_same: score > self.duplicate_threshold,
            reasons: vec![
                format!("词法相似度 {:.2}", lexical),
                format!("词重叠度 {:.2}", overlap),
            ],
            explanation: format!("LLM 不可用，降级为词法估计 ({})", err),
            source: VerdictSource::DegradedFallback,
        }
    }
}

fn build_prompt(a: &str, b: &str, mode: PromptMode) -> String {
    match mode {
        PromptMode::Full => format!(
            r#"判断下面两个问题是否在询问同一件事。

【判断标准】
- 措辞、大小写、语序不同，但含义相同，视为同一问题
- 询问对象或范围不同，即使字面相近，也不是同一问题

问题 A：{}
问题 B：{}

只返回如下格式的 JSON，不要返回任何其他内容：
{{"score": <0 到 1 之间的相似度>, "isSame": <true 或 false>, "reasons": ["<理由>"], "explanation": "<一句话说明>"}}"#,
            a, b
        ),
        PromptMode::Simplified => format!(
            r#"问题 A：{}
问题 B：{}
两个问题含义是否相同？只返回一行 JSON：{{"score": <0 到 1>, "isSame": <true 或 false>}}"#,
            a, b
        ),
    }
}
