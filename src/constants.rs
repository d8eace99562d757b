//! Application-wide constants
//!
//! This module contains all constant values used throughout the engine.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// LOGGING DEFAULTS
// =============================================================================

/// Default tracing filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "algojudge_engine=info";

/// Default log output format
pub const DEFAULT_LOG_FORMAT: &str = "pretty";

/// Bytes of test input/output included in debug logs
pub const LOG_PREVIEW_LEN: usize = 100;

// =============================================================================
// JUDGE DEFAULTS
// =============================================================================

/// Directory name created under the system temp dir for workspaces
pub const DEFAULT_WORKSPACE_DIR_NAME: &str = "algojudge";

/// Default number of submissions judged concurrently
pub const DEFAULT_MAX_CONCURRENT_SUBMISSIONS: usize = 4;

/// Default number of test cases of one submission run at the same time
pub const DEFAULT_MAX_PARALLEL_TESTS: usize = 1;

/// Default orchestrator-level deadline for one submission
pub const DEFAULT_SUBMISSION_DEADLINE_MS: u64 = 120_000;

/// Default wall time limit per test case
pub const DEFAULT_TIME_LIMIT_MS: u64 = 2000;

/// Default memory limit per test case (256 MB)
pub const DEFAULT_MEMORY_LIMIT_KB: u64 = 256 * 1024;

/// Maximum time limit a request may ask for
pub const MAX_TIME_LIMIT_MS: u64 = 30_000;

/// Maximum memory limit a request may ask for (1 GB)
pub const MAX_MEMORY_LIMIT_KB: u64 = 1024 * 1024;

/// Compile step wall time limit
pub const DEFAULT_COMPILE_TIME_LIMIT_MS: u64 = 10_000;

/// Compile step memory ceiling (1 GB)
pub const DEFAULT_COMPILE_MEMORY_LIMIT_KB: u64 = 1024 * 1024;

// =============================================================================
// SANDBOX DEFAULTS
// =============================================================================

/// Per-stream capture cap for stdout/stderr (256 KB)
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 256 * 1024;

/// Slack added to the wall-clock timer
pub const DEFAULT_TIME_LIMIT_GRACE_MS: u64 = 50;

/// Memory watcher sampling period
pub const DEFAULT_MEMORY_POLL_INTERVAL_MS: u64 = 10;

/// RLIMIT_AS multiplier relative to the memory limit
pub const DEFAULT_ADDRESS_SPACE_FACTOR: u64 = 4;

/// RLIMIT_FSIZE for sandboxed processes (64 MB)
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 64 * 1024 * 1024;

/// RLIMIT_NPROC for sandboxed processes
pub const DEFAULT_MAX_PROCESSES: u64 = 1024;

/// RLIMIT_NOFILE for sandboxed processes
pub const SANDBOX_MAX_OPEN_FILES: u64 = 256;

/// PATH exported into sandboxed processes
pub const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Longest time spent draining pipes after the process group is gone
pub const OUTPUT_DRAIN_TIMEOUT_MS: u64 = 1000;

/// Characters of compiler diagnostics kept on a submission
pub const MAX_DIAGNOSTICS_CHARS: usize = 64 * 1024;

// =============================================================================
// SCORING DEFAULTS
// =============================================================================

/// Runtime at which the time component reaches zero
pub const DEFAULT_REFERENCE_TIME_MS: u64 = 1000;

/// Memory at which the space component reaches zero
pub const DEFAULT_REFERENCE_MEMORY_KB: u64 = 256 * 1024;

/// Tolerance used when checking that scoring weights sum to one
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Submissions allowed per user per window
pub const DEFAULT_RATE_LIMIT_MAX_SUBMISSIONS: usize = 10;

/// Rate limit window in seconds
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

// =============================================================================
// SUPPORTED LANGUAGES
// =============================================================================

/// Language identifiers
pub mod languages {
    pub const C: &str = "c";
    pub const CPP: &str = "cpp";
    pub const JAVA: &str = "java";
    pub const PYTHON: &str = "python";
    pub const RUST: &str = "rust";
    pub const GO: &str = "go";

    /// All supported language identifiers
    pub const ALL: &[&str] = &[C, CPP, JAVA, PYTHON, RUST, GO];
}

/// Default toolchain binaries, resolved against [`SANDBOX_PATH`]
pub mod toolchains {
    pub const CC: &str = "gcc";
    pub const CXX: &str = "g++";
    pub const JAVAC: &str = "javac";
    pub const JAVA: &str = "java";
    pub const PYTHON: &str = "python3";
    pub const RUSTC: &str = "rustc";
    pub const GO: &str = "go";
}
