//! Engine services

pub mod contest_service;
pub mod judge_service;

pub use contest_service::ContestService;
pub use judge_service::JudgeService;
