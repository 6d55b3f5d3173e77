//! LLM 层：客户端抽象与实现（Gemini / OpenAI 兼容 / Mock）

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod traits;

pub use gemini::{GeminiClient, GEMINI_FLASH};
pub use mock::MockLlmClient;
pub use openai::{create_deepseek_client, OpenAiClient, DEEPSEEK_CHAT};
pub use traits::{LlmClient, LlmError, LlmReply};
