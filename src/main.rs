use std::sync::Arc;

use anyhow::{Context, Result};
use question_dedup::utils::logging;
use question_dedup::{BatchItem, BatchProcessor, Config, JsonFileCorpusStore, OpenAiJudge};
use serde_json::Value as JsonValue;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置：配置文件（可选）+ 环境变量
    let config = match std::env::var("DEDUP_CONFIG_FILE") {
        Ok(path) => Config::from_toml_file(&path)?.merge_env()?,
        Err(_) => Config::from_env()?,
    };
    config.validate()?;

    let input_path = std::env::args()
        .nth(1)
        .context("用法: question_dedup <题目文件>（JSON 数组或每行一题）")?;
    let items = load_input(&input_path).await?;

    logging::log_startup(&config.llm_model_name, &config.corpus_path);

    let store = Arc::new(JsonFileCorpusStore::new(&config.corpus_path));
    let judge = Arc::new(OpenAiJudge::new(&config));
    let processor = BatchProcessor::new(config, store, judge);

    let report = processor.process_in_chunks(items).await?;

    println!("{}", serde_json::to_string_pretty(&report.results)?);

    let metrics = processor.metrics();
    logging::print_final_stats(
        report.unique_count(),
        report.duplicate_count(),
        report.results.len(),
        metrics.fallbacks,
    );

    // 结果已经输出，持久化失败仍然以错误退出
    report.ensure_persisted()?;
    Ok(())
}

/// 读取输入文件
///
/// 以 `[` 开头按 JSON 数组解析，否则每行一题
async fn load_input(path: &str) -> Result<Vec<BatchItem<usize>>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取输入文件: {}", path))?;

    if content.trim_start().starts_with('[') {
        let values: Vec<JsonValue> = serde_json::from_str(&content)
            .with_context(|| format!("无法解析 JSON 输入: {}", path))?;
        Ok(BatchItem::from_json_values(&values))
    } else {
        let lines: Vec<&str> = content.lines().collect();
        Ok(BatchItem::from_questions(&lines))
    }
}
