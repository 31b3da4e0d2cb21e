//! LLM integration backing the repair oracle.
//!
//! ```ignore
//! use planguard::llm::{LiteLlmClient, GenerationRequest, Message, LlmProvider};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]).with_json_response();
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message,
    ResponseFormat, Usage, DEFAULT_MODEL,
};
