//! Process tree containment
//!
//! Every sandboxed leader is made a child subreaper before exec, so while it
//! is alive all of its descendants stay below it, including ones that called
//! `setsid` or `setpgid`. The engine process is a subreaper too: descendants
//! left behind by a leader that exited on its own are reparented to the
//! engine, where [`sweep_orphans`] kills and reaps them.
//!
//! The engine's children are therefore either tracked leaders or orphans.
//! Leaders are registered while the table lock is held across `spawn`, so a
//! concurrent sweep never mistakes a fresh leader for an orphan.

use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::prctl;
use nix::sys::signal::{Signal, kill, killpg};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;

/// Kill-then-rescan rounds before a tree is reported as uncontained
const MAX_KILL_ROUNDS: usize = 100;

/// Pause between rounds while SIGKILLed processes finish dying
const KILL_ROUND_PAUSE: Duration = Duration::from_millis(2);

static LEADERS: LazyLock<Mutex<HashMap<i32, usize>>> = LazyLock::new(Default::default);

static ADOPTS_ORPHANS: LazyLock<bool> = LazyLock::new(|| match prctl::set_child_subreaper(true) {
    Ok(()) => true,
    Err(e) => {
        tracing::warn!(
            error = %e,
            "Cannot become a child subreaper; processes left behind by exited submissions are not contained"
        );
        false
    }
});

/// Make the engine adopt orphaned descendants. Returns whether it does.
pub(crate) fn adopt_orphans() -> bool {
    *ADOPTS_ORPHANS
}

fn leaders() -> MutexGuard<'static, HashMap<i32, usize>> {
    LEADERS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Final state of a reaped leader
#[derive(Debug, Clone, Copy)]
pub(crate) struct Exit {
    pub status: ExitStatus,
    /// Peak resident set of the leader and the children it waited for
    pub max_rss_kb: u64,
}

/// Spawn `command` and track the child as a leader until [`wait_leader`]
/// reaps it.
pub(crate) fn spawn_leader(command: &mut Command) -> io::Result<Child> {
    let mut leaders = leaders();
    let child = command.spawn()?;
    *leaders.entry(raw_pid(child.id())).or_insert(0) += 1;
    Ok(child)
}

/// Block until leader `pid` exits, then reap it with its resource usage
pub(crate) fn wait_leader(pid: Pid) -> io::Result<Exit> {
    let exit = wait4(pid);
    let mut leaders = leaders();
    if let Some(count) = leaders.get_mut(&pid.as_raw()) {
        *count -= 1;
        if *count == 0 {
            leaders.remove(&pid.as_raw());
        }
    }
    exit
}

fn wait4(pid: Pid) -> io::Result<Exit> {
    let mut status = 0;
    // SAFETY: rusage is plain old data; all-zero is a valid value.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        // SAFETY: both out-pointers live for the duration of the call.
        let reaped = unsafe { libc::wait4(pid.as_raw(), &mut status, 0, &mut usage) };
        if reaped == pid.as_raw() {
            return Ok(Exit {
                status: ExitStatus::from_raw(status),
                max_rss_kb: u64::try_from(usage.ru_maxrss).unwrap_or(0),
            });
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Stop the leader's group, kill every descendant of the still-living
/// leader, then kill the group and the leader itself.
pub(crate) fn terminate(leader: Pid) {
    let _ = killpg(leader, Signal::SIGSTOP);
    let killed = kill_descendants(leader);
    kill_group(leader);
    let _ = kill(leader, Signal::SIGKILL);
    if killed > 0 {
        tracing::debug!(%leader, killed, "Killed processes outside the leader's group");
    }
}

/// SIGKILL the process group led by `leader`
pub(crate) fn kill_group(leader: Pid) {
    match killpg(leader, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid = %leader, error = %e, "Failed to kill process group"),
    }
}

/// SIGKILL everything below `root` until nothing alive is left. `root` must
/// be a living subreaper so orphans of killed processes stay below it.
fn kill_descendants(root: Pid) -> usize {
    let mut killed = HashSet::new();
    for _ in 0..MAX_KILL_ROUNDS {
        let alive = descendants(root.as_raw(), &process_table());
        if alive.is_empty() {
            return killed.len();
        }
        for pid in alive {
            if kill(Pid::from_raw(pid), Signal::SIGKILL).is_ok() {
                killed.insert(pid);
            }
        }
        std::thread::sleep(KILL_ROUND_PAUSE);
    }
    tracing::error!(%root, "Descendants still alive after repeated SIGKILL");
    killed.len()
}

/// Kill and reap every child of the engine that is not a tracked leader.
/// Returns how many were reaped.
pub(crate) fn sweep_orphans() -> usize {
    if !adopt_orphans() {
        return 0;
    }
    let engine = raw_pid(std::process::id());
    let mut reaped = 0;
    for _ in 0..MAX_KILL_ROUNDS {
        let orphans: Vec<ProcEntry> = {
            let leaders = leaders();
            let orphans: Vec<_> = process_table()
                .into_iter()
                .filter(|entry| entry.ppid == engine && !leaders.contains_key(&entry.pid))
                .collect();
            for orphan in orphans.iter().filter(|entry| !entry.zombie) {
                let _ = kill(Pid::from_raw(orphan.pid), Signal::SIGKILL);
            }
            orphans
        };
        if orphans.is_empty() {
            if reaped > 0 {
                tracing::debug!(reaped, "Swept orphaned sandbox processes");
            }
            return reaped;
        }
        for orphan in orphans {
            if reap(Pid::from_raw(orphan.pid)) {
                reaped += 1;
            }
        }
    }
    tracing::error!(reaped, "Orphaned sandbox processes keep appearing");
    reaped
}

fn reap(pid: Pid) -> bool {
    loop {
        match waitpid(pid, None) {
            Ok(_) => return true,
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return false,
            Err(e) => {
                tracing::warn!(%pid, error = %e, "Failed to reap orphaned process");
                return false;
            }
        }
    }
}

fn raw_pid(pid: u32) -> i32 {
    i32::try_from(pid).unwrap_or(i32::MAX)
}

/// One row of `/proc/<pid>/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcEntry {
    pid: i32,
    ppid: i32,
    zombie: bool,
}

/// Parse `pid (comm) state ppid ...`. `comm` may itself contain spaces and
/// parentheses, so fields are read after the last `)`.
fn parse_stat(stat: &str) -> Option<ProcEntry> {
    let (head, rest) = stat.rsplit_once(')')?;
    let pid = head.split_once('(')?.0.trim().parse().ok()?;
    let mut fields = rest.split_whitespace();
    let state = fields.next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some(ProcEntry {
        pid,
        ppid,
        zombie: state == "Z",
    })
}

fn process_table() -> Vec<ProcEntry> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        .filter_map(|pid| std::fs::read_to_string(format!("/proc/{pid}/stat")).ok())
        .filter_map(|stat| parse_stat(&stat))
        .collect()
}

/// Live (non-zombie) processes below `root`
fn descendants(root: i32, table: &[ProcEntry]) -> Vec<i32> {
    let mut children: HashMap<i32, Vec<&ProcEntry>> = HashMap::new();
    for entry in table {
        children.entry(entry.ppid).or_default().push(entry);
    }

    let mut seen = HashSet::from([root]);
    let mut stack = vec![root];
    let mut alive = Vec::new();
    while let Some(parent) = stack.pop() {
        for child in children.get(&parent).into_iter().flatten() {
            if !seen.insert(child.pid) {
                continue;
            }
            stack.push(child.pid);
            if !child.zombie {
                alive.push(child.pid);
            }
        }
    }
    alive
}
