//! HTTP clients for the upstream generative-AI providers.
//!
//! One prompt in; streamed text (Gemini) or one image URL (Replicate) out.
//! Keys travel only in request headers.

mod client;
mod gemini;
mod http;
mod replicate;
#[cfg(test)]
mod stub;
mod types;

pub use client::{Auth, UpstreamClient};
pub use gemini::GeminiClient;
pub use http::RetryPolicy;
pub use replicate::ReplicateClient;
