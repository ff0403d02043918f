use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 批次输入校验错误
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 题库持久化错误
    #[error("持久化错误: {0}")]
    Persistence(#[from] PersistenceError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 批次输入校验错误
///
/// 在任何 oracle 调用之前抛出，整个批次直接终止
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 题目去除空白后为空
    #[error("题目不能为空")]
    EmptyQuestion,
    /// 过滤后批次为空
    #[error("过滤无效题目后批次为空")]
    EmptyBatch,
    /// 批次超过最大容量
    #[error("批次大小 {size} 超过上限 {max}")]
    BatchTooLarge { size: usize, max: usize },
}

/// 语义判定错误
///
/// 只在语义判定服务内部流转，最终转为降级判定
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JudgeError {
    /// 请求频率限制（HTTP 429）
    #[error("请求频率限制: {message}")]
    RateLimited { message: String },
    /// 网络或服务端的临时故障
    #[error("临时故障: {message}")]
    Transient { message: String },
    /// 返回内容无法解析为结构化结果
    #[error("返回内容格式错误: {message}")]
    MalformedOutput { message: String },
}

/// 题库持久化错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// 读取题库失败
    #[error("读取题库失败 ({path}): {source}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入题库失败
    #[error("写入题库失败 ({path}): {source}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 重置题库失败
    #[error("重置题库失败 ({path}): {source}")]
    ResetFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("解析配置文件失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 阈值超出 [0, 1]
    #[error("阈值 {name} = {value} 超出范围 [0, 1]")]
    ThresholdOutOfRange { name: String, value: f64 },
}

// ========== 便捷构造函数 ==========

impl JudgeError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        JudgeError::RateLimited {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        JudgeError::Transient {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        JudgeError::MalformedOutput {
            message: message.into(),
        }
    }
}

impl PersistenceError {
    /// 创建题库读取错误
    pub fn load_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PersistenceError::LoadFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// 创建题库写入错误
    pub fn save_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PersistenceError::SaveFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// 创建题库重置错误
    pub fn reset_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PersistenceError::ResetFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
