//! OpenAI 兼容 API 的 HTTP 传输
//!
//! 直接用 reqwest 调用 `{base_url}/chat/completions`（OpenRouter、OpenAI、DeepSeek、自建代理均可），
//! 以便拿到原始状态码与 `Retry-After` 头：429 映射为 RateLimited，其它非 2xx 映射为 Status。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;

use crate::llm::{ChatRequest, ChatResponse, ChatTransport, TransportError};

/// OpenAI 兼容 HTTP 传输：持有 reqwest Client 与端点地址，凭据每次调用时传入
pub struct HttpChatTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpChatTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn chat(
        &self,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, TransportError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(TransportError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                status_code: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// 解析 `Retry-After`（秒，可带小数）；HTTP-date 形式不支持，返回 None 走指数退避
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_parse_retry_after_rejects_garbage() {
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-2"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let transport = HttpChatTransport::new("https://openrouter.ai/api/v1/");
        assert_eq!(
            transport.endpoint(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }
}
