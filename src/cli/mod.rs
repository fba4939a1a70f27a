//! Command-line interface for linguanews.
//!
//! Provides the long-running engine process plus one-shot commands for
//! triggering ingestion, chatting, and inspecting jobs and health.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
