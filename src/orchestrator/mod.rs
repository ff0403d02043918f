//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次处理和题库变更，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<BatchItem>)
//!     ↓
//! workflow::DuplicateDetector (处理单道题)
//!     ↓
//! services (能力层：lexical / oracle / sanitizer / cache)
//!     ↓
//! clients + infrastructure (LLM、速率预算、题库存储、统计)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一工作者**：同一时间只处理一个批次
//! 2. **资源隔离**：只有编排层持有题库快照
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无判定逻辑**：只做调度、校验和持久化

pub mod batch_processor;

pub use batch_processor::BatchProcessor;
