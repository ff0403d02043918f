use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 相似度阈值 ---
    /// 词法预筛阈值，低于此值不调用 LLM
    pub prefilter_threshold: f64,
    /// 判定为重复的分数阈值
    pub duplicate_threshold: f64,
    /// 报告最相似题目的最低分数
    pub reporting_floor: f64,
    /// LLM 不可用时，词法分数达到此值直接视为重复
    pub high_confidence_threshold: f64,
    // --- 速率预算 ---
    /// 每个窗口可发出的请求数
    pub rate_capacity: usize,
    /// 预算刷新窗口（毫秒）
    pub refill_interval_ms: u64,
    /// 同时在途的 LLM 请求上限
    pub max_in_flight: usize,
    // --- 重试 ---
    /// 退避基础时延（毫秒）
    pub retry_base_delay_ms: u64,
    /// 频率限制/临时故障的最大尝试次数
    pub max_attempts: u32,
    // --- 批次 ---
    /// 单批次最大题目数
    pub max_batch_size: Option<usize>,
    /// 批次截止时间（毫秒）
    pub batch_deadline_ms: Option<u64>,
    /// 题库 JSON 文件路径
    pub corpus_path: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefilter_threshold: 0.6,
            duplicate_threshold: 0.85,
            reporting_floor: 0.6,
            high_confidence_threshold: 0.95,
            rate_capacity: 10,
            refill_interval_ms: 1_000,
            max_in_flight: 2,
            retry_base_delay_ms: 500,
            max_attempts: 3,
            max_batch_size: None,
            batch_deadline_ms: None,
            corpus_path: "questions.json".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_env()
    }

    /// 从 TOML 文件加载配置，文件中缺省的项使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
                path: path.display().to_string(),
                source,
            })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// 用环境变量覆盖当前配置
    ///
    /// 设置了但无法解析的 `DEDUP_*` 变量返回 `ConfigError::EnvVarParseFailed`
    pub fn merge_env(self) -> Result<Self, ConfigError> {
        self.merge_vars(|name| std::env::var(name).ok())
    }

    fn merge_vars(self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |name: &str, current: String| lookup(name).unwrap_or(current);

        Ok(Self {
            prefilter_threshold: parse_var(&lookup, "DEDUP_PREFILTER_THRESHOLD")?.unwrap_or(self.prefilter_threshold),
            duplicate_threshold: parse_var(&lookup, "DEDUP_DUPLICATE_THRESHOLD")?.unwrap_or(self.duplicate_threshold),
            reporting_floor: parse_var(&lookup, "DEDUP_REPORTING_FLOOR")?.unwrap_or(self.reporting_floor),
            high_confidence_threshold: parse_var(&lookup, "DEDUP_HIGH_CONFIDENCE_THRESHOLD")?.unwrap_or(self.high_confidence_threshold),
            rate_capacity: parse_var(&lookup, "DEDUP_RATE_CAPACITY")?.unwrap_or(self.rate_capacity),
            refill_interval_ms: parse_var(&lookup, "DEDUP_REFILL_INTERVAL_MS")?.unwrap_or(self.refill_interval_ms),
            max_in_flight: parse_var(&lookup, "DEDUP_MAX_IN_FLIGHT")?.unwrap_or(self.max_in_flight),
            retry_base_delay_ms: parse_var(&lookup, "DEDUP_RETRY_BASE_DELAY_MS")?.unwrap_or(self.retry_base_delay_ms),
            max_attempts: parse_var(&lookup, "DEDUP_MAX_ATTEMPTS")?.unwrap_or(self.max_attempts),
            max_batch_size: parse_var(&lookup, "DEDUP_MAX_BATCH_SIZE")?.or(self.max_batch_size),
            batch_deadline_ms: parse_var(&lookup, "DEDUP_BATCH_DEADLINE_MS")?.or(self.batch_deadline_ms),
            corpus_path: text("DEDUP_CORPUS_PATH", self.corpus_path),
            llm_api_key: text("LLM_API_KEY", self.llm_api_key),
            llm_api_base_url: text("LLM_API_BASE_URL", self.llm_api_base_url),
            llm_model_name: text("LLM_MODEL_NAME", self.llm_model_name),
        })
    }

    /// 检查阈值是否都落在 [0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("prefilter_threshold", self.prefilter_threshold),
            ("duplicate_threshold", self.duplicate_threshold),
            ("reporting_floor", self.reporting_floor),
            ("high_confidence_threshold", self.high_confidence_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange {
                    name: name.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms.max(1))
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        self.batch_deadline_ms.map(Duration::from_millis)
    }
}

/// 读取并解析一个变量；未设置返回 `None`
fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(var_name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value,
            expected_type: std::any::type_name::<T>().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_thresholds() {
        let config = Config::default();
        assert_eq!(config.prefilter_threshold, 0.6);
        assert_eq!(config.duplicate_threshold, 0.85);
        assert_eq!(config.max_in_flight, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_file_fills_missing_keys_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "duplicate_threshold = 0.9\nmax_batch_size = 50").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.duplicate_threshold, 0.9);
        assert_eq!(config.max_batch_size, Some(50));
        assert_eq!(config.prefilter_threshold, 0.6);
    }

    #[test]
    fn test_vars_override_defaults() {
        let vars = HashMap::from([
            ("DEDUP_MAX_ATTEMPTS", "5"),
            ("DEDUP_MAX_BATCH_SIZE", " 20 "),
            ("LLM_MODEL_NAME", "qwen-plus"),
        ]);
        let config = Config::default()
            .merge_vars(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.max_batch_size, Some(20));
        assert_eq!(config.llm_model_name, "qwen-plus");
        assert_eq!(config.retry_base_delay_ms, 500);
    }

    #[test]
    fn test_unparsable_var_is_reported() {
        let err = Config::default()
            .merge_vars(|name| (name == "DEDUP_RATE_CAPACITY").then(|| "ten".to_string()))
            .unwrap_err();
        match err {
            ConfigError::EnvVarParseFailed {
                var_name, value, ..
            } => {
                assert_eq!(var_name, "DEDUP_RATE_CAPACITY");
                assert_eq!(value, "ten");
            }
            other => panic!("意外的错误: {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        let config = Config {
            reporting_floor: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange { .. })
        ));
    }
}
