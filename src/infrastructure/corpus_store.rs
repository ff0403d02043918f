//! 题库存储 - 基础设施层
//!
//! 只负责题库的读取、整体写回和清空，不关心查重流程

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::models::QuestionRecord;

/// 题库存储接口
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// 读取完整题库
    async fn load(&self) -> Result<Vec<QuestionRecord>, PersistenceError>;
    /// 用给定题目整体覆盖题库
    async fn save(&self, records: &[QuestionRecord]) -> Result<(), PersistenceError>;
    /// 清空题库
    async fn reset(&self) -> Result<(), PersistenceError>;
}

/// 内存题库，用于测试和不需要落盘的场景
#[derive(Debug, Default)]
pub struct InMemoryCorpusStore {
    records: Mutex<Vec<QuestionRecord>>,
}

impl InMemoryCorpusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<QuestionRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

#[async_trait]
impl CorpusStore for InMemoryCorpusStore {
    async fn load(&self) -> Result<Vec<QuestionRecord>, PersistenceError> {
        Ok(self.records.lock().await.clone())
    }

    async fn save(&self, records: &[QuestionRecord]) -> Result<(), PersistenceError> {
        *self.records.lock().await = records.to_vec();
        Ok(())
    }

    async fn reset(&self) -> Result<(), PersistenceError> {
        self.records.lock().await.clear();
        Ok(())
    }
}

/// JSON 文件题库
///
/// 文件不存在视为空题库；写入先写临时文件再重命名
#[derive(Debug, Clone)]
pub struct JsonFileCorpusStore {
    path: PathBuf,
}

impl JsonFileCorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "corpus.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn write_atomic(&self, records: &[QuestionRecord]) -> std::io::Result<()> {
        let content = serde_json::to_vec_pretty(records)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path();
        fs::write(&temp, content).await?;
        fs::rename(&temp, &self.path).await
    }
}

#[async_trait]
impl CorpusStore for JsonFileCorpusStore {
    async fn load(&self) -> Result<Vec<QuestionRecord>, PersistenceError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("题库文件 {} 不存在，视为空题库", self.display_path());
                return Ok(Vec::new());
            }
            Err(e) => return Err(PersistenceError::load_failed(self.display_path(), e)),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<QuestionRecord> = serde_json::from_str(&content)
            .map_err(|e| PersistenceError::load_failed(self.display_path(), e))?;
        info!("📁 已加载题库 {} 道", records.len());
        Ok(records)
    }

    async fn save(&self, records: &[QuestionRecord]) -> Result<(), PersistenceError> {
        self.write_atomic(records)
            .await
            .map_err(|e| PersistenceError::save_failed(self.display_path(), e))?;
        debug!("题库已写入 {}: {} 道", self.display_path(), records.len());
        Ok(())
    }

    async fn reset(&self) -> Result<(), PersistenceError> {
        self.write_atomic(&[])
            .await
            .map_err(|e| PersistenceError::reset_failed(self.display_path(), e))
    }
}
