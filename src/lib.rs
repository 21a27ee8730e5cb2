// ABOUTME: Library root for rolling-replacer - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gateway;
pub mod hooks;
pub mod lock;
pub mod output;
pub mod pipeline;
pub mod types;
