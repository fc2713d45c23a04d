//! 带重试的 LLM 客户端
//!
//! send 的策略：
//! - 未配置凭据：立即返回 Configuration，不发起任何请求
//! - 限流：优先使用服务端给出的 retry_after，否则按 base * 2^attempt 退避（attempt 从 0 开始）
//! - 免费档模型（`xxx:free`）第一次被限流后，后续所有尝试改用标准档 `xxx`
//! - 其它非 2xx：立即返回 Upstream，不重试
//!
//! 客户端本身不保存跨调用状态，可用 Arc 在多个模拟之间共享。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::llm::{ChatRequest, ChatResponse, ChatTransport, LlmError, Message, TransportError};

const FREE_TIER_SUFFIX: &str = ":free";

/// 具备重试、退避与降级能力的客户端
pub struct ResilientClient {
    transport: Arc<dyn ChatTransport>,
    api_key: Option<String>,
    backoff_base: Duration,
    request_timeout: Duration,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn ChatTransport>, api_key: Option<String>) -> Self {
        Self {
            transport,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            backoff_base: Duration::from_secs(1),
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// 凭据检查；编排器在切换状态前先调用，保证缺凭据时模拟状态不变
    pub fn ensure_credential(&self) -> Result<&str, LlmError> {
        self.api_key.as_deref().ok_or_else(|| {
            LlmError::Configuration("no API key configured for the code-generation service".into())
        })
    }

    /// 一次逻辑请求；max_retries 为首次之后的额外尝试次数
    pub async fn send(
        &self,
        messages: &[Message],
        model: &str,
        max_retries: u32,
    ) -> Result<String, LlmError> {
        let api_key = self.ensure_credential()?;
        let mut model = model.to_string();
        let mut attempt: u32 = 0;

        loop {
            let request = ChatRequest {
                model: model.clone(),
                messages: messages.to_vec(),
            };
            let outcome = timeout(self.request_timeout, self.transport.chat(api_key, &request))
                .await
                .map_err(|_| LlmError::Timeout(self.request_timeout.as_secs()))?;

            match outcome {
                Ok(response) => {
                    tracing::debug!(model = %model, attempt, "llm request succeeded");
                    return first_choice_content(response);
                }
                Err(TransportError::RateLimited { retry_after }) => {
                    if let Some(standard) = standard_tier(&model) {
                        tracing::warn!(
                            from = %model,
                            to = %standard,
                            "rate limited on free tier, downgrading model"
                        );
                        model = standard;
                    }
                    if attempt >= max_retries {
                        tracing::warn!(
                            model = %model,
                            attempts = attempt + 1,
                            "rate limit retries exhausted"
                        );
                        return Err(LlmError::ExhaustedRetries {
                            attempts: attempt + 1,
                            model,
                        });
                    }
                    let delay = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));
                    tracing::warn!(
                        model = %model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(TransportError::Status {
                    status_code,
                    status_text,
                }) => {
                    return Err(LlmError::Upstream {
                        status_code,
                        status_text,
                    })
                }
                Err(TransportError::Network(msg)) => return Err(LlmError::Transport(msg)),
                Err(TransportError::Decode(msg)) => return Err(LlmError::MalformedResponse(msg)),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// 免费档模型名对应的标准档；非免费档返回 None
pub fn standard_tier(model: &str) -> Option<String> {
    model.strip_suffix(FREE_TIER_SUFFIX).map(String::from)
}

fn first_choice_content(response: ChatResponse) -> Result<String, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedResponse("response contains no choices".into()))?;
    Ok(choice.message.content.unwrap_or_default())
}
