//! # Question Dedup
//!
//! 一个用于批量题目查重的 Rust 库
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有共享资源，只暴露能力
//! - `RateBudget` - LLM 调用额度（令牌桶 + 并发槽）
//! - `CorpusStore` - 题库读取/写回/清空
//! - `MetricsSink` - 调用统计
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理一对题目
//! - `LexicalScorer` - 词法相似度
//! - `SemanticOracle` - 限流、重试、降级的 LLM 判定
//! - `ResponseSanitizer` - 修复 LLM 返回的 JSON
//! - `SimilarityCache` - 判定缓存
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的查重流程
//! - `DuplicateDetector` - 预筛 → 语义判定 → 新题/重复
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批次处理、分块、持久化

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{OpenAiJudge, SemanticJudge};
pub use config::Config;
pub use error::{AppError, AppResult, JudgeError, PersistenceError, ValidationError};
pub use infrastructure::{CorpusStore, InMemoryCorpusStore, JsonFileCorpusStore, MetricsSnapshot};
pub use models::{BatchItem, BatchReport, BatchResult, QuestionRecord, SimilarityVerdict};
pub use orchestrator::BatchProcessor;
pub use workflow::{Detection, DetectionOutcome, DuplicateDetector};
