//! 相似度缓存 - 业务能力层
//!
//! 记住每一对题目的 LLM 判定，进程内有效，不过期

use dashmap::DashMap;

use crate::models::SimilarityVerdict;

/// 相似度缓存
///
/// 键与顺序、大小写无关：`get(a, b)` 与 `get(b, a)` 命中同一条
#[derive(Debug, Default)]
pub struct SimilarityCache {
    entries: DashMap<(String, String), SimilarityVerdict>,
}

impl SimilarityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<SimilarityVerdict> {
        self.entries.get(&cache_key(a, b)).map(|entry| entry.value().clone())
    }

    pub fn put(&self, a: &str, b: &str, verdict: SimilarityVerdict) {
        self.entries.insert(cache_key(a, b), verdict);
    }

    /// 清空缓存（重置题库时调用）
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cache_key(a: &str, b: &str) -> (String, String) {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VerdictSource;

    fn verdict(score: f64) -> SimilarityVerdict {
        SimilarityVerdict {
            score,
            is_same: false,
            reasons: vec!["r".to_string()],
            explanation: "e".to_string(),
            source: VerdictSource::Oracle,
        }
    }

    #[test]
    fn test_key_ignores_order_and_case() {
        let cache = SimilarityCache::new();
        cache.put("What is X?", "How is Y?", verdict(0.7));

        assert_eq!(cache.get("how is y?", "WHAT IS X?"), Some(verdict(0.7)));
        assert_eq!(cache.get("What is X?", "How is Y?"), cache.get("How is Y?", "What is X?"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_overwrites_and_clear_empties() {
        let cache = SimilarityCache::new();
        cache.put("a", "b", verdict(0.1));
        cache.put("B", "A", verdict(0.2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a", "b").map(|v| v.score), Some(0.2));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a", "b"), None);
    }
}
