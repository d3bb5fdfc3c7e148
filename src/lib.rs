pub mod alerts;
pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod signals;
pub mod simulator;
pub mod stats;
pub mod telemetry;
