//! Engine configuration management
//!
//! This module handles loading and validating configuration from environment variables.
//! All configuration is loaded at startup and validated before any submission is judged.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::constants::{
    self, DEFAULT_ADDRESS_SPACE_FACTOR, DEFAULT_COMPILE_MEMORY_LIMIT_KB,
    DEFAULT_COMPILE_TIME_LIMIT_MS, DEFAULT_LOG_FILTER, DEFAULT_LOG_FORMAT,
    DEFAULT_MAX_CONCURRENT_SUBMISSIONS, DEFAULT_MAX_FILE_SIZE_BYTES, DEFAULT_MAX_PARALLEL_TESTS,
    DEFAULT_MAX_PROCESSES,
    DEFAULT_MEMORY_LIMIT_KB, DEFAULT_MEMORY_POLL_INTERVAL_MS, DEFAULT_OUTPUT_LIMIT_BYTES,
    DEFAULT_RATE_LIMIT_MAX_SUBMISSIONS, DEFAULT_RATE_LIMIT_WINDOW_SECS,
    DEFAULT_REFERENCE_MEMORY_KB, DEFAULT_REFERENCE_TIME_MS, DEFAULT_SUBMISSION_DEADLINE_MS,
    DEFAULT_TIME_LIMIT_GRACE_MS, DEFAULT_TIME_LIMIT_MS, DEFAULT_WORKSPACE_DIR_NAME,
};

/// Global engine configuration (lazily initialized)
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::from_env().expect("Failed to load configuration from environment")
});

/// Main engine configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub log: LogConfig,
    pub judge: JudgeConfig,
    pub sandbox: SandboxConfig,
    pub scoring: ScoringConfig,
    pub rate_limit: RateLimitConfig,
    pub toolchains: ToolchainConfig,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub rust_log: String,
    /// `pretty` or `json`
    pub format: String,
}

/// Judging orchestration configuration
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Parent directory of per-submission workspaces
    pub workspace_root: PathBuf,
    /// Size of the global worker pool
    pub max_concurrent_submissions: usize,
    /// Stop running test cases after the first non-accepted one
    pub stop_on_first_failure: bool,
    /// Test cases of one submission run at the same time (1 = sequential)
    pub max_parallel_tests: usize,
    /// Orchestrator-level deadline for a whole submission
    pub submission_deadline_ms: u64,
    /// Wall time applied when neither request nor test case sets one
    pub default_time_limit_ms: u64,
    /// Memory applied when neither request nor test case sets one
    pub default_memory_limit_kb: u64,
    /// Compile step wall time limit
    pub compile_time_limit_ms: u64,
    /// Compile step memory ceiling
    pub compile_memory_limit_kb: u64,
}

/// Execution sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Per-stream stdout/stderr capture cap
    pub output_limit_bytes: usize,
    /// Slack added to the wall-clock timer
    pub time_limit_grace_ms: u64,
    /// Memory watcher sampling period
    pub memory_poll_interval_ms: u64,
    /// RLIMIT_AS = memory limit * factor (0 disables)
    pub address_space_factor: u64,
    /// RLIMIT_FSIZE
    pub max_file_size_bytes: u64,
    /// RLIMIT_NPROC (0 disables). Counted per user across the whole host,
    /// so it must leave room for everything else running as that user.
    pub max_processes: u64,
    /// Unshare a fresh network namespace before exec
    pub isolate_network: bool,
}

/// Scoring normalization constants
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub reference_time_ms: u64,
    pub reference_memory_kb: u64,
}

/// Submission rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_submissions: usize,
    pub window_secs: u64,
}

/// Toolchain binaries used by the language adapters
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    pub cc: String,
    pub cxx: String,
    pub javac: String,
    pub java: String,
    pub python: String,
    pub rustc: String,
    pub go: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            log: LogConfig::from_env()?,
            judge: JudgeConfig::from_env()?,
            sandbox: SandboxConfig::from_env()?,
            scoring: ScoringConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env()?,
            toolchains: ToolchainConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make judging meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("JUDGE_MAX_CONCURRENT", self.judge.max_concurrent_submissions as u64),
            ("JUDGE_MAX_PARALLEL_TESTS", self.judge.max_parallel_tests as u64),
            ("JUDGE_SUBMISSION_DEADLINE_MS", self.judge.submission_deadline_ms),
            ("DEFAULT_TIME_LIMIT_MS", self.judge.default_time_limit_ms),
            ("DEFAULT_MEMORY_LIMIT_KB", self.judge.default_memory_limit_kb),
            ("COMPILE_TIME_LIMIT_MS", self.judge.compile_time_limit_ms),
            ("COMPILE_MEMORY_LIMIT_KB", self.judge.compile_memory_limit_kb),
            ("MEMORY_POLL_INTERVAL_MS", self.sandbox.memory_poll_interval_ms),
            ("SCORING_REFERENCE_TIME_MS", self.scoring.reference_time_ms),
            ("SCORING_REFERENCE_MEMORY_KB", self.scoring.reference_memory_kb),
            ("RATE_LIMIT_WINDOW_SECS", self.rate_limit.window_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue(name.to_string()));
            }
        }
        if !matches!(self.log.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::InvalidValue("LOG_FORMAT".to_string()));
        }
        Ok(())
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            rust_log: DEFAULT_LOG_FILTER.to_string(),
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            workspace_root: env::temp_dir().join(DEFAULT_WORKSPACE_DIR_NAME),
            max_concurrent_submissions: DEFAULT_MAX_CONCURRENT_SUBMISSIONS,
            stop_on_first_failure: false,
            max_parallel_tests: DEFAULT_MAX_PARALLEL_TESTS,
            submission_deadline_ms: DEFAULT_SUBMISSION_DEADLINE_MS,
            default_time_limit_ms: DEFAULT_TIME_LIMIT_MS,
            default_memory_limit_kb: DEFAULT_MEMORY_LIMIT_KB,
            compile_time_limit_ms: DEFAULT_COMPILE_TIME_LIMIT_MS,
            compile_memory_limit_kb: DEFAULT_COMPILE_MEMORY_LIMIT_KB,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            time_limit_grace_ms: DEFAULT_TIME_LIMIT_GRACE_MS,
            memory_poll_interval_ms: DEFAULT_MEMORY_POLL_INTERVAL_MS,
            address_space_factor: DEFAULT_ADDRESS_SPACE_FACTOR,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            max_processes: DEFAULT_MAX_PROCESSES,
            isolate_network: true,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            reference_time_ms: DEFAULT_REFERENCE_TIME_MS,
            reference_memory_kb: DEFAULT_REFERENCE_MEMORY_KB,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_submissions: DEFAULT_RATE_LIMIT_MAX_SUBMISSIONS,
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
        }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            cc: constants::toolchains::CC.to_string(),
            cxx: constants::toolchains::CXX.to_string(),
            javac: constants::toolchains::JAVAC.to_string(),
            java: constants::toolchains::JAVA.to_string(),
            python: constants::toolchains::PYTHON.to_string(),
            rustc: constants::toolchains::RUSTC.to_string(),
            go: constants::toolchains::GO.to_string(),
        }
    }
}

impl LogConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| DEFAULT_LOG_FORMAT.to_string())
                .to_lowercase(),
        })
    }
}

impl JudgeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            workspace_root: env::var("JUDGE_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            max_concurrent_submissions: parse_var(
                "JUDGE_MAX_CONCURRENT",
                defaults.max_concurrent_submissions,
            )?,
            stop_on_first_failure: parse_var(
                "JUDGE_STOP_ON_FIRST_FAILURE",
                defaults.stop_on_first_failure,
            )?,
            max_parallel_tests: parse_var("JUDGE_MAX_PARALLEL_TESTS", defaults.max_parallel_tests)?,
            submission_deadline_ms: parse_var(
                "JUDGE_SUBMISSION_DEADLINE_MS",
                defaults.submission_deadline_ms,
            )?,
            default_time_limit_ms: parse_var(
                "DEFAULT_TIME_LIMIT_MS",
                defaults.default_time_limit_ms,
            )?,
            default_memory_limit_kb: parse_var(
                "DEFAULT_MEMORY_LIMIT_KB",
                defaults.default_memory_limit_kb,
            )?,
            compile_time_limit_ms: parse_var(
                "COMPILE_TIME_LIMIT_MS",
                defaults.compile_time_limit_ms,
            )?,
            compile_memory_limit_kb: parse_var(
                "COMPILE_MEMORY_LIMIT_KB",
                defaults.compile_memory_limit_kb,
            )?,
        })
    }
}

impl SandboxConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            output_limit_bytes: parse_var("OUTPUT_LIMIT_BYTES", defaults.output_limit_bytes)?,
            time_limit_grace_ms: parse_var("TIME_LIMIT_GRACE_MS", defaults.time_limit_grace_ms)?,
            memory_poll_interval_ms: parse_var(
                "MEMORY_POLL_INTERVAL_MS",
                defaults.memory_poll_interval_ms,
            )?,
            address_space_factor: parse_var(
                "ADDRESS_SPACE_FACTOR",
                defaults.address_space_factor,
            )?,
            max_file_size_bytes: parse_var("MAX_FILE_SIZE_BYTES", defaults.max_file_size_bytes)?,
            max_processes: parse_var("SANDBOX_MAX_PROCESSES", defaults.max_processes)?,
            isolate_network: parse_var("SANDBOX_ISOLATE_NETWORK", defaults.isolate_network)?,
        })
    }
}

impl ScoringConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            reference_time_ms: parse_var("SCORING_REFERENCE_TIME_MS", DEFAULT_REFERENCE_TIME_MS)?,
            reference_memory_kb: parse_var(
                "SCORING_REFERENCE_MEMORY_KB",
                DEFAULT_REFERENCE_MEMORY_KB,
            )?,
        })
    }
}

impl RateLimitConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_submissions: parse_var(
                "RATE_LIMIT_MAX_SUBMISSIONS",
                DEFAULT_RATE_LIMIT_MAX_SUBMISSIONS,
            )?,
            window_secs: parse_var("RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS)?,
        })
    }
}

impl ToolchainConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cc: env::var("CC_PATH").unwrap_or(defaults.cc),
            cxx: env::var("CXX_PATH").unwrap_or(defaults.cxx),
            javac: env::var("JAVAC_PATH").unwrap_or(defaults.javac),
            java: env::var("JAVA_PATH").unwrap_or(defaults.java),
            python: env::var("PYTHON_PATH").unwrap_or(defaults.python),
            rustc: env::var("RUSTC_PATH").unwrap_or(defaults.rustc),
            go: env::var("GO_PATH").unwrap_or(defaults.go),
        }
    }
}

/// Read and parse an environment variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for crate::error::JudgeError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.judge.default_time_limit_ms, 2000);
        assert_eq!(config.judge.default_memory_limit_kb, 262_144);
        assert_eq!(config.judge.max_parallel_tests, 1);
        assert!(!config.judge.stop_on_first_failure);
        assert_eq!(config.scoring.reference_time_ms, 1000);
        assert_eq!(config.toolchains.python, "python3");
        assert!(config.judge.workspace_root.ends_with("algojudge"));
        assert_eq!(config.sandbox.max_processes, 1024);
        assert!(config.sandbox.isolate_network);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u64>("X", " 42 ").unwrap(), 42);
        assert!(parse_value::<bool>("X", "true").unwrap());
        assert!(matches!(
            parse_value::<u64>("X", "abc"),
            Err(ConfigError::InvalidValue(name)) if name == "X"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let mut config = Config::default();
        config.judge.max_concurrent_submissions = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(name)) if name == "JUDGE_MAX_CONCURRENT"
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut config = Config::default();
        config.log.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
