//! 题目处理上下文
//!
//! 封装"我正在处理第几批的第几题"这一信息

use std::fmt::Display;

/// 题目处理上下文（仅用于日志）
#[derive(Debug, Clone, Copy)]
pub struct QuestionCtx {
    /// 批次编号（从1开始）
    pub batch_num: usize,

    /// 题目在批次中的位置（从1开始）
    pub position: usize,

    /// 批次题目总数
    pub total: usize,
}

impl QuestionCtx {
    /// 创建新的题目上下文
    pub fn new(batch_num: usize, position: usize, total: usize) -> Self {
        Self {
            batch_num,
            position,
            total,
        }
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[批次 #{} 题目 #{}/{}]",
            self.batch_num, self.position, self.total
        )
    }
}
