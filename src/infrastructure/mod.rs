//! 基础设施层（Infrastructure Layer）
//!
//! 持有共享资源（调用额度、题库存储、统计计数），只暴露能力，不认识查重流程

pub mod corpus_store;
pub mod metrics;
pub mod rate_budget;

pub use corpus_store::{CorpusStore, InMemoryCorpusStore, JsonFileCorpusStore};
pub use metrics::{AtomicMetrics, MetricsSink, MetricsSnapshot};
pub use rate_budget::{BudgetPermit, RateBudget};
