use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 题库中的一道题
///
/// 创建后不可变，`id` 在题目被接收时分配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl QuestionRecord {
    /// 为新接收的题目分配 id 和时间戳
    pub fn accept(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}
