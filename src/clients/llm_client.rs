//! 语义判定客户端
//!
//! 封装对外部 LLM 的调用，只负责"发一个 prompt，拿回原始文本"
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（自定义 API 端点和模型）

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::JudgeError;

/// 外部语义判定接口
///
/// 只返回原始文本，解析由调用方负责
#[async_trait]
pub trait SemanticJudge: Send + Sync {
    async fn request(&self, prompt: &str) -> Result<String, JudgeError>;
}

const SYSTEM_MESSAGE: &str = "你是一个专业的题目查重助手，擅长判断两个问题是否在询问同一件事。\
                              只输出 JSON，不要输出任何其他内容。";

/// 基于 OpenAI 兼容接口的判定客户端
pub struct OpenAiJudge {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl OpenAiJudge {
    /// 创建新的判定客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        // 关闭 async-openai 内置重试，429/5xx 直接返回给语义判定服务
        let no_retry = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::ZERO),
            ..Default::default()
        };

        Self {
            client: Client::with_config(openai_config).with_backoff(no_retry),
            model_name: config.llm_model_name.clone(),
        }
    }

    fn build_messages(
        &self,
        prompt: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_MESSAGE)
            .build()?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ])
    }
}

#[async_trait]
impl SemanticJudge for OpenAiJudge {
    async fn request(&self, prompt: &str) -> Result<String, JudgeError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", prompt.len());

        let messages = self
            .build_messages(prompt)
            .map_err(|e| JudgeError::transient(format!("构建请求失败: {}", e)))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.0)
            .max_tokens(512u32)
            .build()
            .map_err(|e| JudgeError::transient(format!("构建请求失败: {}", e)))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            classify_error(&e.to_string())
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| JudgeError::malformed("LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }
}

/// 按错误信息区分频率限制和其他故障
fn classify_error(message: &str) -> JudgeError {
    let lowered = message.to_lowercase();
    if lowered.contains("429")
        || lowered.contains("rate limit")
        || lowered.contains("rate_limit")
        || lowered.contains("too many requests")
    {
        JudgeError::rate_limited(message)
    } else {
        JudgeError::transient(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const RATE_LIMIT_BODY: &str = r#"{"error":{"message":"Rate limit reached for requests","type":"requests","param":null,"code":"rate_limit_exceeded"}}"#;

    /// 读完一个 HTTP 请求（头 + Content-Length 指定的正文）
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);

            let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return;
            }
        }
    }

    /// 对每个请求都返回 429 的本地服务，返回 API 地址
    async fn spawn_rate_limited_server(hits: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                hits.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let response = format!(
                        "HTTP/1.1 429 Too Many Requests\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        RATE_LIMIT_BODY.len(),
                        RATE_LIMIT_BODY
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}/v1", addr)
    }

    #[tokio::test]
    async fn test_rate_limit_returned_after_single_http_attempt() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_rate_limited_server(hits.clone()).await;
        let config = Config {
            llm_api_key: "test-key".to_string(),
            llm_api_base_url: base_url,
            ..Default::default()
        };
        let judge = OpenAiJudge::new(&config);

        let result = tokio::time::timeout(Duration::from_secs(5), judge.request("hi"))
            .await
            .expect("429 应该立即返回，而不是在客户端内部重试");

        assert!(matches!(result, Err(JudgeError::RateLimited { .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_classify_rate_limit_messages() {
        assert!(matches!(
            classify_error("http status 429 Too Many Requests"),
            JudgeError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_error("Rate limit reached for gpt-4o-mini"),
            JudgeError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_error("connection reset by peer"),
            JudgeError::Transient { .. }
        ));
    }

    #[test]
    fn test_build_messages_has_system_and_user() {
        let judge = OpenAiJudge::new(&Config::default());
        let messages = judge.build_messages("问题 A 与问题 B").unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
    }

    #[tokio::test]
    #[ignore] // 需要真实的 LLM_API_KEY：cargo test -- --ignored
    async fn test_openai_judge_connectivity() {
        let _ = tracing_subscriber::fmt::try_init();
        let judge = OpenAiJudge::new(&Config::from_env().unwrap());
        let response = judge
            .request(r#"只返回 {"score": 1.0, "isSame": true}"#)
            .await
            .unwrap();
        assert!(!response.is_empty());
    }
}
