use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult, PersistenceError};
use crate::models::question::QuestionRecord;

/// 批次中的一道待查题目
///
/// `source_ref` 是调用方的来源引用（例如表格行），原样回传，不做任何检查
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem<R> {
    pub question: String,
    pub source_ref: R,
}

impl<R> BatchItem<R> {
    pub fn new(question: impl Into<String>, source_ref: R) -> Self {
        Self {
            question: question.into(),
            source_ref,
        }
    }

    /// 去除空白后是否为空
    pub fn is_blank(&self) -> bool {
        self.question.trim().is_empty()
    }
}

impl BatchItem<usize> {
    /// 从 JSON 数组构建批次，来源引用为原始下标
    ///
    /// 非字符串和空白项被静默丢弃
    pub fn from_json_values(values: &[JsonValue]) -> Vec<Self> {
        values
            .iter()
            .enumerate()
            .filter_map(|(idx, value)| value.as_str().map(|s| BatchItem::new(s, idx)))
            .filter(|item| !item.is_blank())
            .collect()
    }

    /// 从纯字符串列表构建批次
    pub fn from_questions<S: AsRef<str>>(questions: &[S]) -> Vec<Self> {
        questions
            .iter()
            .enumerate()
            .map(|(idx, q)| BatchItem::new(q.as_ref(), idx))
            .collect()
    }
}

/// 单道题的查重结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult<R> {
    pub question: String,
    pub is_duplicate: bool,
    pub most_similar_question: Option<String>,
    pub similarity_score: f64,
    pub similarity_explanation: String,
    pub source_ref: R,
}

/// 整个批次的处理报告
///
/// 持久化失败时结果仍然保留，只是没有落盘
#[derive(Debug)]
pub struct BatchReport<R> {
    /// 与有效输入一一对应，顺序一致
    pub results: Vec<BatchResult<R>>,
    /// 本次新接收的题目
    pub accepted: Vec<QuestionRecord>,
    pub persisted: bool,
    pub persistence_error: Option<PersistenceError>,
}

impl<R> BatchReport<R> {
    pub fn duplicate_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_duplicate).count()
    }

    pub fn unique_count(&self) -> usize {
        self.results.len() - self.duplicate_count()
    }

    /// 持久化失败时转成错误，并交出已算好的结果
    pub fn ensure_persisted(self) -> AppResult<Vec<BatchResult<R>>> {
        match self.persistence_error {
            Some(err) => Err(AppError::Persistence(err)),
            None => Ok(self.results),
        }
    }
}
