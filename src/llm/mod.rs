//! LLM 层：传输抽象、OpenAI 兼容 HTTP 实现、带重试与降级的客户端、Mock

pub mod http;
pub mod message;
pub mod mock;
pub mod resilient;
pub mod traits;

pub use http::{parse_retry_after, HttpChatTransport};
pub use message::{Message, Role};
pub use mock::MockTransport;
pub use resilient::{standard_tier, ResilientClient};
pub use traits::{
    ChatChoice, ChatRequest, ChatResponse, ChatTransport, ChoiceMessage, LlmError, TransportError,
};
