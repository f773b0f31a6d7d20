//! Solus: an embedded chat server for the Solus Android app.
//!
//! The host process loads this library, then calls `startRustServer` with
//! the Replicate and Gemini API keys. The bridge in [`startup`] brings the
//! [`server`] up at most once and reports readiness as a plain boolean.

pub mod api;
pub mod config;
pub mod credentials;
pub mod ffi;
pub mod logging;
pub mod runtime;
pub mod server;
pub mod startup;
