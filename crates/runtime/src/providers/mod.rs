//! Completion provider adapters.
//!
//! Each provider implements [`CompletionProvider`](crate::llm::CompletionProvider)
//! for its specific API.

mod openai;

pub use openai::{Endpoint, OpenAiProvider, OpenAiProviderBuilder};
