#![forbid(unsafe_code)]

//! `chat-conformance`: scripted conformance harness for line-oriented
//! chat servers.
//!
//! Builds each configured server implementation, spawns it, replays the
//! shared test suite over a TCP connection, and compares every response
//! with order-insensitive line semantics.

pub mod client;
pub mod compare;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod runner;

pub use config::SuiteConfig;
pub use errors::{AppError, Result};
