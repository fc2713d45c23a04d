//! LLM 传输层抽象
//!
//! ChatTransport 只负责「一次」请求/响应，并把限流与其它失败区分开；
//! 重试、退避与模型降级都在 ResilientClient 中完成。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::Message;

/// chat/completions 请求体
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
}

/// chat/completions 响应体（只解析用到的字段）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// 单个 choice 的响应，便于 Mock 与测试构造
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![ChatChoice {
                message: ChoiceMessage {
                    content: Some(content.into()),
                },
            }],
        }
    }
}

/// 单次传输的失败：限流与其它非 2xx 必须可区分
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// 服务端要求放慢（HTTP 429）；retry_after 为服务端给出的等待时长
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP {status_code} {status_text}")]
    Status { status_code: u16, status_text: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response decode error: {0}")]
    Decode(String),
}

/// ResilientClient 对调用方暴露的错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// 未配置凭据，不重试
    #[error("LLM credential missing: {0}")]
    Configuration(String),

    #[error("Upstream rejected request: {status_code} {status_text}")]
    Upstream { status_code: u16, status_text: String },

    #[error("Rate limit persisted after {attempts} attempts (model {model})")]
    ExhaustedRetries { attempts: u32, model: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM transport error: {0}")]
    Transport(String),
}

/// 聊天补全传输：实现方为 HTTP 客户端或测试 Mock
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn chat(&self, api_key: &str, request: &ChatRequest)
        -> Result<ChatResponse, TransportError>;
}
