//! Spawns player processes for loops and tracks the children it owns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{HerdError, Result};
use crate::keys;
use crate::model::{LoopRecord, LoopStatus};
use crate::player::proc::{self, ProcStatus, ProcessControl};
use crate::store::Store;

pub struct PlayerSupervisor {
    cfg: Config,
    /// Children spawned by this process; despawn reaps these directly.
    owned: Mutex<HashMap<i32, std::process::Child>>,
}

impl PlayerSupervisor {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            owned: Mutex::new(HashMap::new()),
        }
    }

    fn owned_lock(&self) -> std::sync::MutexGuard<'_, HashMap<i32, std::process::Child>> {
        self.owned.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProcessControl for PlayerSupervisor {
    fn spawn(&self, loop_id: &str, media: &Path, record: &LoopRecord) -> Result<i32> {
        let socket = self.cfg.socket_dir.join(loop_id);
        let mut cmd = Command::new(&self.cfg.player_bin);
        cmd.arg(format!("--input-ipc-server={}", socket.display()))
            .arg("--keep-open=yes");
        if let Some(start) = record.start.filter(|s| *s >= 0.0) {
            cmd.arg(format!("--start={start}"));
            cmd.arg(format!("--ab-loop-a={start}"));
        }
        if let Some(end) = record.end.filter(|e| *e >= 0.0) {
            cmd.arg(format!("--ab-loop-b={end}"));
        }
        if let Some(volume) = &record.volume {
            cmd.arg(format!("--volume={volume}"));
        }
        if record.status == LoopStatus::Muted {
            cmd.arg("--mute=yes");
        }
        cmd.arg(media)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = cmd.spawn().map_err(|e| HerdError::Spawn {
            loop_id: loop_id.to_string(),
            reason: e.to_string(),
        })?;
        let pid = child.id() as i32;
        info!(loop_id, pid, media = %media.display(), "player spawned");
        self.owned_lock().insert(pid, child);
        Ok(pid)
    }

    fn status(&self, pid: i32) -> ProcStatus {
        proc::process_status(pid)
    }

    fn despawn(&self, pid: i32) {
        let child = self.owned_lock().remove(&pid);
        match child {
            Some(mut child) => {
                let _ = child.kill();
                let _ = child.wait();
            }
            // Inherited from a previous run; signal it and let init reap.
            None => proc::terminate(pid),
        }
        debug!(pid, "player despawned");
    }
}

/// Locate a source file by name across the watched directories.
pub fn resolve_media(cfg: &Config, filename: &str) -> Option<PathBuf> {
    cfg.source_dirs
        .iter()
        .map(|d| d.join(filename))
        .find(|p| p.is_file())
}

/// Ensure the loop has a live player and the store knows its pid:
/// spawn, record the pid under both the running hash and the loop hash,
/// then give the player time to open its socket. Archived loops never
/// spawn. Returns the pid when a spawn happened.
pub async fn idempotent_create<S: Store, P: ProcessControl>(
    cfg: &Config,
    store: &S,
    procs: &P,
    loop_id: &str,
    record: &LoopRecord,
) -> Result<Option<i32>> {
    if record.status == LoopStatus::Archived {
        return Ok(None);
    }
    let media = resolve_media(cfg, &record.filename).ok_or_else(|| HerdError::Spawn {
        loop_id: loop_id.to_string(),
        reason: format!("source file not found: {}", record.filename),
    })?;
    let pid = procs.spawn(loop_id, &media, record)?;
    store
        .hash_set(
            &keys::running_key(cfg),
            vec![(loop_id.to_string(), pid.to_string().into())],
        )
        .await?;
    store
        .hash_set(
            &keys::loop_key(cfg, loop_id),
            vec![("pid".to_string(), pid.to_string().into())],
        )
        .await?;
    tokio::time::sleep(cfg.settle_delay).await;
    Ok(Some(pid))
}
