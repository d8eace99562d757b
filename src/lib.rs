//! AlgoJudge Engine - Submission Judging and Scoring
//!
//! This library judges untrusted source code submissions against test cases
//! and turns the outcome into contest scores and rankings.
//!
//! # Features
//!
//! - Multi-language support (C, C++, Java, Python, Rust, Go)
//! - Sandboxed execution with wall time, memory and output limits
//! - Deterministic verdict classification
//! - Weighted contest scoring and leaderboards
//! - Prometheus metrics and structured logging
//!
//! # Architecture
//!
//! - **Services**: request validation, worker pool, deadlines, contests
//! - **Judge**: workspace, language adapters, sandbox, classifier, orchestrator
//! - **Scoring**: score formula and ranking
//! - **Models**: domain types and request DTOs

pub mod config;
pub mod constants;
pub mod error;
pub mod judge;
pub mod metrics;
pub mod models;
pub mod scoring;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppResult, JudgeError};
pub use services::{ContestService, JudgeService};
