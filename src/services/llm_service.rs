//! LLM 服务 - 业务能力层
//!
//! 只负责"文本生成"能力：prompt 进，原始文本出。输出不可信，
//! 调用方必须交给恢复引擎处理，不能直接解析。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Groq、Azure、Gemini 等）

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::GenerationError;
use crate::services::retry::{linear_backoff, retry, AttemptError};

/// 文本生成能力
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 生成原始文本
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, GenerationError>;

    /// 用于清单记录的模型名
    fn model_name(&self) -> &str;
}

/// 基于 OpenAI 兼容接口的 LLM 服务
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            timeout: config.llm_timeout(),
            max_attempts: config.max_retries,
            backoff_base: Duration::from_millis(config.retry_backoff_ms) * 10,
        }
    }

    /// 单次调用
    async fn send_to_llm(&self, system_message: &str, user_message: &str) -> Result<String, GenerationError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()
            .map_err(|e| GenerationError::Service(e.to_string()))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        // 调用 API（带超时）
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| GenerationError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                GenerationError::Service(e.to_string())
            })?;

        debug!("LLM API 调用成功");

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(GenerationError::EmptyResponse)?;

        if content.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for LlmService {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, GenerationError> {
        retry(
            move |_| async move {
                self.send_to_llm(system, prompt)
                    .await
                    .map_err(|e| AttemptError::retryable(e.to_string()))
            },
            self.max_attempts,
            linear_backoff(self.backoff_base),
        )
        .await
        .map_err(|failure| GenerationError::Service(failure.to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> LlmService {
        let config = Config::from_env();
        LlmService::new(&config)
    }

    #[test]
    fn test_service_uses_configured_model() {
        let config = Config {
            llm_model_name: "test-model".to_string(),
            ..Config::default()
        };
        let service = LlmService::new(&config);
        assert_eq!(service.model_name(), "test-model");
        assert_eq!(service.max_tokens, 8000);
    }

    /// 测试通用 LLM 调用
    #[tokio::test]
    #[ignore] // 需要 LLM_API_KEY
    async fn test_generate_simple() {
        let _ = tracing_subscriber::fmt::try_init();

        let service = create_test_service();
        let result = service
            .generate("You answer with a JSON array only.", "Return [{\"pattern_id\": 0}]")
            .await;

        match result {
            Ok(response) => {
                println!("\n========== LLM 响应 ==========\n{}", response);
                assert!(!response.is_empty());
            }
            Err(e) => panic!("测试失败: {}", e),
        }
    }
}
