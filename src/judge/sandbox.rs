//! Execution sandbox for untrusted processes
//!
//! Every process is started with an explicit working directory, a cleared
//! environment, stdin redirected from a file (or nothing), and resource
//! limits applied between fork and exec. The process leads its own process
//! group and is a child subreaper, so a timeout, memory breach or
//! cancellation kills everything it spawned, and descendants it leaves
//! behind after a normal exit are swept. The sandbox reports what happened;
//! it never judges correctness.

use std::ffi::OsString;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::sched::{CloneFlags, unshare};
use nix::sys::prctl;
use nix::sys::resource::{Resource, setrlimit};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tokio::io::AsyncRead;
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::SandboxConfig;
use crate::constants::{OUTPUT_DRAIN_TIMEOUT_MS, SANDBOX_MAX_OPEN_FILES, SANDBOX_PATH};
use crate::error::{AppResult, JudgeError};
use crate::judge::output::{CapturedOutput, read_capped};
use crate::judge::process_tree::{self, Exit};
use crate::models::ResourceLimits;

/// Fully explicit description of one process to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub workdir: PathBuf,
    /// File redirected to stdin; `None` means empty input
    pub stdin: Option<PathBuf>,
    /// Variables added on top of the minimal sandbox environment
    pub env: Vec<(String, OsString)>,
    /// Apply RLIMIT_AS; runtimes that reserve large virtual ranges opt out
    pub limit_address_space: bool,
}

impl SandboxCommand {
    pub fn new(program: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
            stdin: None,
            env: Vec::new(),
            limit_address_space: true,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin_from(mut self, path: Option<PathBuf>) -> Self {
        self.stdin = path;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn address_space_limited(mut self, enabled: bool) -> Self {
        self.limit_address_space = enabled;
        self
    }

    /// Program name for logs and errors
    pub fn display_program(&self) -> String {
        self.program.display().to_string()
    }
}

/// What one sandboxed process did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, or `128 + signal` when killed by a signal
    pub exit_code: i32,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub memory_exceeded: bool,
    pub wall_time_ms: u64,
    pub peak_memory_kb: u64,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl ExecutionResult {
    /// A process that exited on its own with `exit_code`
    pub fn exited(exit_code: i32, stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code,
            ..Self::default()
        }
    }

    /// Exited with status 0 inside every limit
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && !self.memory_exceeded
    }
}

/// Seam between orchestration and real process execution
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` to completion under `limits`.
    ///
    /// Limit breaches are reported in the result. Errors mean the process
    /// could not be run or supervised, or `cancel` fired.
    async fn execute(
        &self,
        command: &SandboxCommand,
        limits: &ResourceLimits,
        cancel: &CancellationToken,
    ) -> AppResult<ExecutionResult>;
}

/// Process runner backed by rlimits, process groups and a memory watcher
#[derive(Debug, Clone)]
pub struct ExecutionSandbox {
    config: SandboxConfig,
}

impl ExecutionSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        process_tree::adopt_orphans();
        Self { config }
    }

    /// Like [`ExecutionSandbox::new`], refusing to run without a network
    /// namespace when `isolate_network` is set
    pub fn try_new(config: SandboxConfig) -> AppResult<Self> {
        if config.isolate_network && !Self::network_isolation_available() {
            tracing::error!(
                "Network namespaces are unavailable; sandboxed processes would share the host network"
            );
            return Err(JudgeError::Sandbox(
                "network isolation is enabled but this host cannot create network namespaces \
                 (set SANDBOX_ISOLATE_NETWORK=false to run without it)"
                    .to_string(),
            ));
        }
        Ok(Self::new(config))
    }

    /// Whether a child process can be moved into a fresh network namespace
    /// on this host. Checked once per process.
    pub fn network_isolation_available() -> bool {
        static AVAILABLE: LazyLock<bool> = LazyLock::new(check_network_isolation);
        *AVAILABLE
    }
}

fn check_network_isolation() -> bool {
    let mut cmd = Command::new("/bin/sh");
    cmd.args(["-c", "exit 0"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    // SAFETY: the hook only calls unshare(2).
    unsafe {
        cmd.pre_exec(|| Ok(isolate_network()?));
    }

    let checked = process_tree::spawn_leader(&mut cmd)
        .and_then(|child| process_tree::wait_leader(leader_pid(child.id())?));
    match checked {
        Ok(exit) => exit.status.success(),
        Err(e) => {
            tracing::debug!(error = %e, "Network namespace check failed");
            false
        }
    }
}

/// Move the calling process into a fresh network namespace. Unprivileged
/// hosts need a user namespace first.
fn isolate_network() -> nix::Result<()> {
    unshare(CloneFlags::CLONE_NEWNET)
        .or_else(|_| unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNET))
}

fn leader_pid(pid: u32) -> std::io::Result<Pid> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| std::io::Error::other(format!("pid {pid} out of range")))
}

#[derive(Debug)]
enum Outcome {
    Exited(std::io::Result<Exit>),
    TimedOut,
    MemoryExceeded,
    Cancelled,
}

#[async_trait]
impl ProcessRunner for ExecutionSandbox {
    async fn execute(
        &self,
        command: &SandboxCommand,
        limits: &ResourceLimits,
        cancel: &CancellationToken,
    ) -> AppResult<ExecutionResult> {
        if cancel.is_cancelled() {
            return Err(JudgeError::Cancelled);
        }

        let stdin = match &command.stdin {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| JudgeError::workspace(path, e))?;
                Stdio::from(file.into_std().await)
            }
            None => Stdio::null(),
        };

        let child_limits = ChildLimits::new(&self.config, limits, command.limit_address_space);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.workdir)
            .env_clear()
            .env("PATH", SANDBOX_PATH)
            .env("HOME", &command.workdir)
            .env("TMPDIR", &command.workdir)
            .env("LANG", "C.UTF-8")
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_os_str())))
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        // SAFETY: the hook only calls setrlimit(2), prctl(2) and unshare(2),
        // all async-signal-safe, and allocates nothing.
        unsafe {
            cmd.pre_exec(move || child_limits.apply());
        }

        let started = Instant::now();
        let spawn_error = |source: std::io::Error| JudgeError::Spawn {
            program: command.display_program(),
            source,
        };
        let mut child = process_tree::spawn_leader(&mut cmd).map_err(spawn_error)?;
        let pid = leader_pid(child.id()).map_err(|e| JudgeError::Sandbox(e.to_string()))?;
        let mut leader = Leader::new(pid);
        let mut waiter = tokio::task::spawn_blocking(move || process_tree::wait_leader(pid));

        tracing::debug!(
            program = %command.display_program(),
            %pid,
            wall_time_ms = limits.wall_time_ms,
            memory_kb = limits.memory_kb,
            "Spawned sandboxed process"
        );

        let stdout = child.stdout.take().map(ChildStdout::from_std).transpose();
        let stderr = child.stderr.take().map(ChildStderr::from_std).transpose();
        let (stdout, stderr) = match (stdout, stderr) {
            (Ok(stdout), Ok(stderr)) => (stdout, stderr),
            (Err(e), _) | (_, Err(e)) => {
                return Err(JudgeError::Sandbox(format!("cannot read process output: {e}")));
            }
        };
        let cap = self.config.output_limit_bytes;
        let mut stdout_task = tokio::spawn(capture(stdout, cap));
        let mut stderr_task = tokio::spawn(capture(stderr, cap));

        let peak_kb = AtomicU64::new(0);
        let timer = Duration::from_millis(limits.wall_time_ms + self.config.time_limit_grace_ms);
        let poll = Duration::from_millis(self.config.memory_poll_interval_ms);

        let outcome = tokio::select! {
            exit = &mut waiter => Outcome::Exited(exit.unwrap_or_else(|e| Err(std::io::Error::other(e)))),
            _ = tokio::time::sleep(timer) => Outcome::TimedOut,
            _ = watch_memory(pid, limits.memory_kb, poll, &peak_kb) => Outcome::MemoryExceeded,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };
        let wall_time_ms = started.elapsed().as_millis() as u64;

        let stop = match &outcome {
            Outcome::TimedOut => Some(Stop::Timer),
            Outcome::MemoryExceeded => Some(Stop::MemoryWatcher),
            _ => None,
        };
        let cancelled = matches!(outcome, Outcome::Cancelled);
        let exit = match outcome {
            Outcome::Exited(exit) => exit
                .inspect_err(|e| tracing::warn!(%pid, error = %e, "Waiting for sandboxed process failed"))
                .ok(),
            Outcome::TimedOut | Outcome::MemoryExceeded | Outcome::Cancelled => {
                blocking(move || process_tree::terminate(pid)).await;
                reap(&mut waiter).await
            }
        };
        leader.reaped = exit.is_some();

        // Natural exit or not, nothing the process started may outlive the call.
        blocking(move || {
            process_tree::kill_group(pid);
            process_tree::sweep_orphans();
        })
        .await;
        leader.contained = true;

        if cancelled {
            stdout_task.abort();
            stderr_task.abort();
            tracing::debug!(%pid, "Sandboxed process cancelled");
            return Err(JudgeError::Cancelled);
        }

        let stdout = join_capture(&mut stdout_task).await;
        let stderr = join_capture(&mut stderr_task).await;

        let Some(exit) = exit else {
            return Err(JudgeError::Sandbox(format!("process {pid} could not be reaped")));
        };
        let signal = exit.status.signal();
        let exit_code = exit
            .status
            .code()
            .unwrap_or_else(|| signal.map(|s| 128 + s).unwrap_or(1));
        let usage = Usage {
            exit_code,
            signal,
            wall_time_ms,
            peak_memory_kb: peak_kb.load(Ordering::Relaxed).max(exit.max_rss_kb),
        };
        let (timed_out, memory_exceeded) = usage.limit_flags(stop, limits);

        tracing::debug!(
            %pid,
            exit_code,
            wall_time_ms,
            peak_memory_kb = usage.peak_memory_kb,
            timed_out,
            memory_exceeded,
            "Sandboxed process finished"
        );

        Ok(ExecutionResult {
            stdout: stdout.bytes,
            stderr: stderr.bytes,
            exit_code,
            signal,
            timed_out,
            memory_exceeded,
            wall_time_ms,
            peak_memory_kb: usage.peak_memory_kb,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
        })
    }
}

/// Which supervisor stopped the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Timer,
    MemoryWatcher,
}

/// Observed usage of a finished process
#[derive(Debug, Clone, Copy)]
struct Usage {
    exit_code: i32,
    signal: Option<i32>,
    wall_time_ms: u64,
    peak_memory_kb: u64,
}

impl Usage {
    /// Derive `(timed_out, memory_exceeded)`.
    ///
    /// A natural exit past the wall limit still counts as a timeout, as does
    /// SIGXCPU from RLIMIT_CPU. The peak is exact (`ru_maxrss` of the reaped
    /// process), so any peak above the limit is a memory breach even when
    /// the watcher sampled too late to catch it. An abnormal exit whose peak
    /// reached the limit also counts (allocation failure under RLIMIT_AS
    /// usually ends in an abort).
    fn limit_flags(&self, stop: Option<Stop>, limits: &ResourceLimits) -> (bool, bool) {
        let timed_out = stop == Some(Stop::Timer)
            || self.wall_time_ms > limits.wall_time_ms
            || self.signal == Some(Signal::SIGXCPU as i32);
        let memory_exceeded = stop == Some(Stop::MemoryWatcher)
            || self.peak_memory_kb > limits.memory_kb
            || (self.exit_code != 0 && self.peak_memory_kb >= limits.memory_kb);
        (timed_out, memory_exceeded)
    }
}

/// Limits applied in the child between fork and exec
#[derive(Debug, Clone, Copy)]
struct ChildLimits {
    address_space_bytes: Option<u64>,
    cpu_secs: u64,
    file_size_bytes: u64,
    max_processes: Option<u64>,
    isolate_network: bool,
}

impl ChildLimits {
    fn new(config: &SandboxConfig, limits: &ResourceLimits, limit_address_space: bool) -> Self {
        let address_space_bytes = (limit_address_space && config.address_space_factor > 0)
            .then(|| limits.memory_bytes().saturating_mul(config.address_space_factor));
        Self {
            address_space_bytes,
            // Backstop only; the wall-clock timer fires first.
            cpu_secs: limits.wall_time_ms.div_ceil(1000) + 1,
            file_size_bytes: config.max_file_size_bytes,
            max_processes: (config.max_processes > 0).then_some(config.max_processes),
            isolate_network: config.isolate_network,
        }
    }

    fn apply(&self) -> std::io::Result<()> {
        if let Some(bytes) = self.address_space_bytes {
            setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
        }
        setrlimit(Resource::RLIMIT_CPU, self.cpu_secs, self.cpu_secs)?;
        setrlimit(Resource::RLIMIT_FSIZE, self.file_size_bytes, self.file_size_bytes)?;
        setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
        setrlimit(
            Resource::RLIMIT_NOFILE,
            SANDBOX_MAX_OPEN_FILES,
            SANDBOX_MAX_OPEN_FILES,
        )?;
        if let Some(count) = self.max_processes {
            setrlimit(Resource::RLIMIT_NPROC, count, count)?;
        }
        // Orphans of the process's own children stay below it.
        prctl::set_child_subreaper(true)?;
        if self.isolate_network {
            // Failing here fails the spawn: no silent fallback to the host network.
            isolate_network()?;
        }
        Ok(())
    }
}

/// Sandboxed leader; its whole tree is killed if the call ends before
/// containment ran, e.g. when the execution future is dropped
struct Leader {
    pid: Pid,
    reaped: bool,
    contained: bool,
}

impl Leader {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            reaped: false,
            contained: false,
        }
    }
}

impl Drop for Leader {
    fn drop(&mut self) {
        if self.contained {
            return;
        }
        if !self.reaped {
            process_tree::terminate(self.pid);
        }
        process_tree::sweep_orphans();
    }
}

/// Run process-tree work off the async workers
async fn blocking<F>(work: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(e) = tokio::task::spawn_blocking(work).await {
        tracing::warn!(error = %e, "Process containment task failed");
    }
}

/// Wait for the killed leader, bounded so a stuck reap cannot hang judging
async fn reap(waiter: &mut JoinHandle<std::io::Result<Exit>>) -> Option<Exit> {
    let drain = Duration::from_millis(OUTPUT_DRAIN_TIMEOUT_MS);
    match tokio::time::timeout(drain, waiter).await {
        Ok(Ok(Ok(exit))) => Some(exit),
        Ok(Ok(Err(e))) => {
            tracing::warn!(error = %e, "Failed to reap killed process");
            None
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Reaper task failed");
            None
        }
        Err(_) => None,
    }
}

async fn capture<R>(stream: Option<R>, cap: usize) -> CapturedOutput
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return CapturedOutput::default();
    };
    match read_capped(stream, cap).await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read process output");
            CapturedOutput::default()
        }
    }
}

/// Collect a reader task. A stream still open after the group was killed
/// belongs to an escaped process; what was read so far is lost.
async fn join_capture(task: &mut JoinHandle<CapturedOutput>) -> CapturedOutput {
    let drain = Duration::from_millis(OUTPUT_DRAIN_TIMEOUT_MS);
    match tokio::time::timeout(drain, &mut *task).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Output reader task failed");
            CapturedOutput::default()
        }
        Err(_) => {
            task.abort();
            tracing::warn!("Output stream still open after the process tree was killed");
            CapturedOutput {
                bytes: Vec::new(),
                truncated: true,
            }
        }
    }
}

/// Sample peak RSS until it exceeds `limit_kb`; never returns otherwise
async fn watch_memory(pid: Pid, limit_kb: u64, poll: Duration, peak_kb: &AtomicU64) {
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Ok(status) = tokio::fs::read_to_string(format!("/proc/{pid}/status")).await else {
            continue;
        };
        if let Some(kb) = parse_vm_hwm(&status) {
            peak_kb.fetch_max(kb, Ordering::Relaxed);
            if kb > limit_kb {
                return;
            }
        }
    }
}

/// Extract `VmHWM` (peak resident set, kB) from `/proc/<pid>/status`
fn parse_vm_hwm(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmHWM:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}
