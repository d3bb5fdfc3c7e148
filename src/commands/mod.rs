//! Command implementations for the CLI
//!
//! - start: Start the prediction server
//! - config: Configuration display and validation
//! - simulate: Synthetic traffic against a running server

pub mod config;
pub mod simulate;
pub mod start;
