//! 词法相似度 - 业务能力层
//!
//! 只负责"两段文本表面上有多像"，不理解语义

use std::collections::{HashMap, HashSet};

/// 词法打分器
///
/// 纯函数、确定性、大小写无关、对称
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn new() -> Self {
        Self
    }

    /// 字符二元组的 Dice 系数，范围 [0, 1]
    ///
    /// 比较前转小写并去掉所有空白。两边都为空记 1，只有一边为空记 0
    pub fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = normalize(a);
        let b: Vec<char> = normalize(b);

        match (a.is_empty(), b.is_empty()) {
            (true, true) => return 1.0,
            (true, false) | (false, true) => return 0.0,
            _ => {}
        }
        if a == b {
            return 1.0;
        }
        if a.len() < 2 || b.len() < 2 {
            return 0.0;
        }

        let mut counts: HashMap<(char, char), usize> = HashMap::new();
        for pair in a.windows(2) {
            *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
        }

        let mut intersection = 0usize;
        for pair in b.windows(2) {
            if let Some(count) = counts.get_mut(&(pair[0], pair[1])) {
                if *count > 0 {
                    *count -= 1;
                    intersection += 1;
                }
            }
        }

        let total = (a.len() - 1) + (b.len() - 1);
        (2.0 * intersection as f64) / total as f64
    }

    /// 词级 Jaccard 重叠度，范围 [0, 1]
    pub fn token_overlap(&self, a: &str, b: &str) -> f64 {
        let a = tokens(a);
        let b = tokens(b);
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        let shared = a.intersection(&b).count();
        let union = a.union(&b).count();
        if union == 0 {
            0.0
        } else {
            shared as f64 / union as f64
        }
    }
}

fn normalize(text: &str) -> Vec<char> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
