//! Process liveness probing and the control seam over player processes.

use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::error::Result;
use crate::model::LoopRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcStatus {
    Running,
    /// Exited but unreaped; treated the same as gone by reconciliation.
    Zombie,
    Gone,
}

/// Probe a pid through procfs. The state letter follows the
/// parenthesized comm field, which may itself contain parentheses, so
/// scan from the last ')'.
pub fn process_status(pid: i32) -> ProcStatus {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => match stat
            .rfind(')')
            .and_then(|i| stat[i + 1..].trim_start().chars().next())
        {
            Some('Z') => ProcStatus::Zombie,
            Some(_) => ProcStatus::Running,
            None => ProcStatus::Gone,
        },
        // No procfs entry: either the pid is free or procfs is absent;
        // fall back to a null signal probe (cannot distinguish zombies).
        Err(_) => match signal::kill(Pid::from_raw(pid), None) {
            Ok(()) => ProcStatus::Running,
            Err(Errno::EPERM) => ProcStatus::Running,
            Err(_) => ProcStatus::Gone,
        },
    }
}

/// Spawning and terminating player processes for loops.
pub trait ProcessControl: Send + Sync {
    /// Start a player for the loop and return its pid.
    fn spawn(&self, loop_id: &str, media: &Path, record: &LoopRecord) -> Result<i32>;

    fn status(&self, pid: i32) -> ProcStatus;

    /// Terminate and, when possible, reap. A pid that is already gone
    /// is a no-op.
    fn despawn(&self, pid: i32);
}

/// SIGTERM a process this supervisor does not own. ESRCH means it beat
/// us to the grave.
pub fn terminate(pid: i32) {
    if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM)
        && e != Errno::ESRCH
    {
        tracing::warn!(pid, error = %e, "could not signal player");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_running() {
        assert_eq!(process_status(std::process::id() as i32), ProcStatus::Running);
    }

    #[test]
    fn free_pid_is_gone() {
        // Linux caps pids well below this by default.
        assert_eq!(process_status(i32::MAX - 1), ProcStatus::Gone);
    }

    #[test]
    fn unreaped_child_is_zombie() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        // Give it time to exit; without wait() it lingers as a zombie.
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert_eq!(process_status(pid), ProcStatus::Zombie);
        let _ = child.wait();
    }
}
