//! LLM domain: vision request out, scouter reading back.
//!
//! Public API for the inference side of the pipeline.
//! External code should only use the items exported here.
//!
//!   - prompts.rs: instruction text + `build_request`
//!   - client.rs : `InferenceBackend` trait + reqwest `InferenceClient`
//!   - parse.rs  : first choice → `ParsedResult`
//!   - types.rs  : chat-completions wire types
//!   - curl.rs   : debug rendering of outbound requests

pub mod client;
pub mod curl;
pub mod parse;
pub mod prompts;
pub mod types;

pub use client::{InferenceBackend, InferenceClient, InferenceError};
pub use parse::{parse, ParseError, ParsedResult};
pub use prompts::{build_request, ReplyLanguage};
pub use types::{InferenceRequest, InferenceResponse};
