//! Mock 传输（用于测试，无需 API）
//!
//! 按脚本依次返回预设结果，脚本耗尽后返回固定的 fallback；记录调用次数与每次请求的模型名，
//! 便于断言重试次数与降级行为。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{ChatRequest, ChatResponse, ChatTransport, TransportError};

/// Mock 传输：脚本 + fallback
pub struct MockTransport {
    script: Mutex<VecDeque<Result<ChatResponse, TransportError>>>,
    fallback: Result<ChatResponse, TransportError>,
    /// 每次调用前的人为延迟（测试超时用）
    delay: Option<Duration>,
    calls: AtomicUsize,
    models: Mutex<Vec<String>>,
}

impl MockTransport {
    /// 总是返回同一段内容
    pub fn replying(content: impl Into<String>) -> Self {
        Self::scripted(Vec::new(), Ok(ChatResponse::with_content(content)))
    }

    /// 总是限流（无 retry_after）
    pub fn always_rate_limited() -> Self {
        Self::scripted(
            Vec::new(),
            Err(TransportError::RateLimited { retry_after: None }),
        )
    }

    pub fn scripted(
        script: Vec<Result<ChatResponse, TransportError>>,
        fallback: Result<ChatResponse, TransportError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            models: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用使用的模型名（按调用顺序）
    pub fn models(&self) -> Vec<String> {
        self.models.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn chat(
        &self,
        _api_key: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut models) = self.models.lock() {
            models.push(request.model.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        next.unwrap_or_else(|| self.fallback.clone())
    }
}
