//! Network collaborator implementations for Kotoba.

pub mod memory_http;
pub mod noop;
pub mod openai_compat;

pub use memory_http::HttpMemoryService;
pub use noop::NoopMemoryService;
pub use openai_compat::OpenAiCompatClient;
