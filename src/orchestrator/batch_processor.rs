//! 批次处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块驱动整个批次的查重，并管理题库的变更。
//!
//! ## 核心功能
//!
//! 1. **输入校验**：丢弃空白题目，空批次/超大批次直接报错
//! 2. **题库加载**：批次开始时读取一次题库
//! 3. **并行预筛**：每道题对题库的词法预筛并行计算
//! 4. **串行判定**：逐题判定，新题立即成为后续题目的候选
//! 5. **分块处理**：超大输入按上限切块，后面的块能看到前面块接收的题
//! 6. **持久化**：处理完成后整体写回题库，失败时结果仍然返回
//!
//! ## 设计特点
//!
//! - **单一工作者**：同一时间只处理一个批次
//! - **资源所有者**：题库快照和批次结果只归本模块所有
//! - **向下委托**：单题判定交给 `DuplicateDetector`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::clients::SemanticJudge;
use crate::config::Config;
use crate::error::{AppResult, PersistenceError, ValidationError};
use crate::infrastructure::{AtomicMetrics, CorpusStore, MetricsSink, MetricsSnapshot};
use crate::models::{BatchItem, BatchReport, BatchResult, QuestionRecord};
use crate::services::{LexicalScorer, SemanticOracle, SimilarityCache};
use crate::utils::logging;
use crate::workflow::{prefilter, DuplicateDetector, QuestionCtx, ScoredCandidate};

/// 批次处理器
pub struct BatchProcessor {
    config: Config,
    store: Arc<dyn CorpusStore>,
    detector: DuplicateDetector,
    metrics: Arc<dyn MetricsSink>,
    batch_counter: AtomicUsize,
    run_lock: Mutex<()>,
}

/// 一个处理单元（整批或一个分块）的结果
struct UnitOutcome<R> {
    results: Vec<BatchResult<R>>,
    accepted: Vec<QuestionRecord>,
}

impl BatchProcessor {
    /// 创建批次处理器，使用默认的原子计数统计
    pub fn new(config: Config, store: Arc<dyn CorpusStore>, judge: Arc<dyn SemanticJudge>) -> Self {
        Self::with_metrics(config, store, judge, Arc::new(AtomicMetrics::new()))
    }

    /// 使用外部统计接收端创建
    pub fn with_metrics(
        config: Config,
        store: Arc<dyn CorpusStore>,
        judge: Arc<dyn SemanticJudge>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let oracle = SemanticOracle::new(
            &config,
            judge,
            Arc::new(SimilarityCache::new()),
            metrics.clone(),
        );
        let detector = DuplicateDetector::new(&config, Arc::new(oracle));

        Self {
            config,
            store,
            detector,
            metrics,
            batch_counter: AtomicUsize::new(0),
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 当前统计快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 处理一个批次
    ///
    /// 超过 `max_batch_size` 的批次整体拒绝；需要自动切块时使用 `process_in_chunks`
    pub async fn process_batch<R>(&self, items: Vec<BatchItem<R>>) -> AppResult<BatchReport<R>> {
        let items = filter_valid(items)?;
        if let Some(max) = self.config.max_batch_size {
            if items.len() > max {
                return Err(ValidationError::BatchTooLarge {
                    size: items.len(),
                    max,
                }
                .into());
            }
        }

        let _guard = self.run_lock.lock().await;
        let deadline = self.deadline();
        let mut corpus = Arc::new(self.store.load().await?);

        let unit = self.run_unit(items, &mut corpus, deadline, 1, 1).await?;
        let persistence_error = self.flush(&corpus).await;

        Ok(BatchReport {
            results: unit.results,
            accepted: unit.accepted,
            persisted: persistence_error.is_none(),
            persistence_error,
        })
    }

    /// 分块处理
    ///
    /// 每块按 `max_batch_size` 切分，作为独立子批次依次处理并各自落盘；
    /// 后面的块能看到前面块接收的新题
    pub async fn process_in_chunks<R>(&self, items: Vec<BatchItem<R>>) -> AppResult<BatchReport<R>> {
        let items = filter_valid(items)?;
        let chunk_size = self.config.max_batch_size.unwrap_or(items.len()).max(1);
        let total_chunks = items.len().div_ceil(chunk_size);

        let _guard = self.run_lock.lock().await;
        let deadline = self.deadline();
        let mut corpus = Arc::new(self.store.load().await?);

        let mut results = Vec::with_capacity(items.len());
        let mut accepted = Vec::new();
        let mut persistence_error = None;

        let mut remaining = items.into_iter().peekable();
        let mut chunk_num = 0usize;
        while remaining.peek().is_some() {
            chunk_num += 1;
            let chunk: Vec<BatchItem<R>> = remaining.by_ref().take(chunk_size).collect();
            let unit = self
                .run_unit(chunk, &mut corpus, deadline, chunk_num, total_chunks)
                .await?;
            results.extend(unit.results);
            accepted.extend(unit.accepted);
            // 每次都写回完整题库，最后一次成功即全部落盘
            persistence_error = self.flush(&corpus).await;
        }

        Ok(BatchReport {
            results,
            accepted,
            persisted: persistence_error.is_none(),
            persistence_error,
        })
    }

    /// 清空题库和相似度缓存
    pub async fn reset_corpus(&self) -> AppResult<()> {
        let _guard = self.run_lock.lock().await;
        self.store.reset().await?;
        self.detector.oracle().clear_cache();
        info!("🗑️ 题库和相似度缓存已清空");
        Ok(())
    }

    fn deadline(&self) -> Option<Instant> {
        self.config.batch_deadline().map(|d| Instant::now() + d)
    }

    /// 处理一个单元，新接收的题追加到 `corpus`
    async fn run_unit<R>(
        &self,
        items: Vec<BatchItem<R>>,
        corpus: &mut Arc<Vec<QuestionRecord>>,
        deadline: Option<Instant>,
        unit_num: usize,
        total_units: usize,
    ) -> AppResult<UnitOutcome<R>> {
        let batch_num = self.batch_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let total = items.len();
        logging::log_batch_start(unit_num, total_units, total, corpus.len());

        let questions: Vec<String> = items.iter().map(|item| item.question.trim().to_string()).collect();
        let corpus_candidates = self.prefilter_all(&questions, corpus).await;

        let mut results = Vec::with_capacity(total);
        let mut accepted: Vec<QuestionRecord> = Vec::new();

        for (idx, ((item, question), candidates)) in items
            .into_iter()
            .zip(questions)
            .zip(corpus_candidates)
            .enumerate()
        {
            let ctx = QuestionCtx::new(batch_num, idx + 1, total);
            let detection = self
                .detector
                .detect(&question, &candidates, &accepted, &ctx, deadline)
                .await?;

            if !detection.is_duplicate() {
                accepted.push(QuestionRecord::accept(question));
            }

            results.push(BatchResult {
                question: item.question,
                is_duplicate: detection.is_duplicate(),
                most_similar_question: detection.most_similar_question,
                similarity_score: detection.best_score,
                similarity_explanation: detection.explanation,
                source_ref: item.source_ref,
            });
        }

        Arc::make_mut(corpus).extend(accepted.iter().cloned());

        let duplicates = results.iter().filter(|r| r.is_duplicate).count();
        logging::log_batch_complete(unit_num, total - duplicates, duplicates);

        Ok(UnitOutcome { results, accepted })
    }

    /// 每道题对题库的词法预筛，并行计算，结果按输入顺序返回
    async fn prefilter_all(
        &self,
        questions: &[String],
        corpus: &Arc<Vec<QuestionRecord>>,
    ) -> Vec<Vec<ScoredCandidate>> {
        if corpus.is_empty() {
            return vec![Vec::new(); questions.len()];
        }

        let threshold = self.detector.prefilter_threshold();
        let handles: Vec<_> = questions
            .iter()
            .map(|question| {
                let question = question.clone();
                let corpus = Arc::clone(corpus);
                tokio::task::spawn_blocking(move || {
                    prefilter(&LexicalScorer::new(), threshold, &question, &corpus)
                })
            })
            .collect();

        futures::future::join_all(handles)
            .await
            .into_iter()
            .zip(questions)
            .map(|(joined, question)| {
                joined.unwrap_or_else(|e| {
                    warn!("⚠️ 并行预筛任务失败，改为同步计算: {}", e);
                    prefilter(&LexicalScorer::new(), threshold, question, corpus)
                })
            })
            .collect()
    }

    async fn flush(&self, corpus: &[QuestionRecord]) -> Option<PersistenceError> {
        match self.store.save(corpus).await {
            Ok(()) => {
                info!("💾 题库已保存，共 {} 道", corpus.len());
                None
            }
            Err(e) => {
                error!("❌ 题库保存失败，本批结果未落盘: {}", e);
                Some(e)
            }
        }
    }
}

/// 丢弃空白题目；全部无效时报错
fn filter_valid<R>(items: Vec<BatchItem<R>>) -> Result<Vec<BatchItem<R>>, ValidationError> {
    let before = items.len();
    let items: Vec<_> = items.into_iter().filter(|item| !item.is_blank()).collect();
    if items.len() < before {
        info!("已丢弃 {} 道空白题目", before - items.len());
    }
    if items.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_valid_drops_blank_entries() {
        let items = vec![
            BatchItem::new("What is X?", 'a'),
            BatchItem::new("  ", 'b'),
            BatchItem::new("Y?", 'c'),
        ];
        let kept = filter_valid(items).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].source_ref, 'c');
    }

    #[test]
    fn test_filter_valid_all_blank_is_error() {
        let items = vec![BatchItem::new("", 1), BatchItem::new("\t\n", 2)];
        assert_eq!(filter_valid(items).unwrap_err(), ValidationError::EmptyBatch);
    }
}
