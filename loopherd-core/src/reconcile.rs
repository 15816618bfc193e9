//! One reconciliation pass: make the live player population agree with
//! the stored loop specifications.
//!
//! Convergence comes from repetition, not from any single pass being
//! atomic. A failure on one loop is logged and the pass moves on.

use std::collections::{HashMap, HashSet};

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::keys;
use crate::model::{LoopRecord, LoopStatus};
use crate::player::ipc::PlayerControl;
use crate::player::proc::{ProcStatus, ProcessControl};
use crate::player::supervisor;
use crate::store::Store;

/// What a property query actually told us.
#[derive(Debug, PartialEq)]
enum Live {
    /// No reply, null, or the player's "no" placeholder.
    Unset,
    Num(f64),
    Other,
}

fn live(value: Option<Value>) -> Live {
    match value {
        None | Some(Value::Null) => Live::Unset,
        Some(Value::String(s)) if s == "no" => Live::Unset,
        Some(Value::Number(n)) => n.as_f64().map(Live::Num).unwrap_or(Live::Other),
        Some(Value::String(s)) => s.parse().map(Live::Num).unwrap_or(Live::Other),
        Some(_) => Live::Other,
    }
}

pub async fn pass<S, P, C>(cfg: &Config, store: &S, procs: &P, players: &C) -> Result<()>
where
    S: Store,
    P: ProcessControl,
    C: PlayerControl,
{
    let running = store.hash_all(&keys::running_key(cfg)).await?;
    let loop_keys = store.keys(&keys::loop_pattern(cfg)).await?;
    let mut seen: HashSet<String> = HashSet::new();

    for key in &loop_keys {
        let Some(loop_id) = keys::loop_id_from_key(key) else {
            continue;
        };
        seen.insert(loop_id.to_string());
        if let Err(e) = reconcile_one(cfg, store, procs, players, loop_id, key, &running).await {
            warn!(loop_id, error = %e, "loop reconciliation failed");
        }
    }

    // Running entries whose loop record is gone: orphaned players.
    for (loop_id, pid) in &running {
        if seen.contains(loop_id) {
            continue;
        }
        if let Ok(pid) = pid.parse::<i32>() {
            procs.despawn(pid);
        }
        if let Err(e) = store.hash_del(&keys::running_key(cfg), loop_id).await {
            warn!(loop_id, error = %e, "could not drop orphaned running entry");
        }
    }
    Ok(())
}

async fn reconcile_one<S, P, C>(
    cfg: &Config,
    store: &S,
    procs: &P,
    players: &C,
    loop_id: &str,
    key: &str,
    running: &HashMap<String, String>,
) -> Result<()>
where
    S: Store,
    P: ProcessControl,
    C: PlayerControl,
{
    let fields = store.hash_all(key).await?;
    if fields.is_empty() {
        // Deleted between key listing and here.
        return Ok(());
    }
    let Some(record) = LoopRecord::from_fields(&fields) else {
        warn!(loop_id, "loop record missing uuid or filename, skipping");
        return Ok(());
    };

    if record.status == LoopStatus::Archived {
        if let Some(pid) = running.get(loop_id).and_then(|p| p.parse::<i32>().ok()) {
            debug!(loop_id, pid, "archived loop still running, stopping it");
            procs.despawn(pid);
            store.hash_del(&keys::running_key(cfg), loop_id).await?;
            store.hash_del(key, "pid").await?;
        }
        return Ok(());
    }

    // An unparseable pid entry counts as not running; a fresh spawn
    // overwrites it.
    match running.get(loop_id).and_then(|p| p.parse::<i32>().ok()) {
        None => {
            // Settled by the time create returns; verify right away.
            if supervisor::idempotent_create(cfg, store, procs, loop_id, &record)
                .await?
                .is_some()
            {
                verify_properties(players, loop_id, &record).await;
            }
        }
        Some(pid) => match procs.status(pid) {
            ProcStatus::Running => verify_properties(players, loop_id, &record).await,
            status => {
                debug!(loop_id, pid, ?status, "player dead, respawning");
                procs.despawn(pid);
                if supervisor::idempotent_create(cfg, store, procs, loop_id, &record)
                    .await?
                    .is_some()
                {
                    verify_properties(players, loop_id, &record).await;
                }
            }
        },
    }
    Ok(())
}

/// Compare the player's loop window and volume against the record and
/// push corrections. Properties the player cannot answer for are left
/// alone until the next pass.
async fn verify_properties<C: PlayerControl>(players: &C, loop_id: &str, record: &LoopRecord) {
    if let Some(start) = record.start.filter(|s| *s >= 0.0)
        && let Live::Num(actual) = live(players.get_property(loop_id, "ab-loop-a").await)
        && actual != start
    {
        debug!(loop_id, actual, wanted = start, "correcting loop start");
        players
            .set_property(loop_id, "ab-loop-a", json!(start))
            .await;
        // Jump back inside the window; an end correction never seeks.
        players.seek_absolute(loop_id, start).await;
    }

    if let Some(end) = record.end.filter(|e| *e >= 0.0)
        && let Live::Num(actual) = live(players.get_property(loop_id, "ab-loop-b").await)
        && actual != end
    {
        debug!(loop_id, actual, wanted = end, "correcting loop end");
        players.set_property(loop_id, "ab-loop-b", json!(end)).await;
    }

    if let Some(volume) = &record.volume {
        let reply = players.get_property(loop_id, "volume").await;
        let actual = match &reply {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        if let Some(actual) = actual {
            // Numeric compare when both sides parse; "70" and "70.0"
            // are the same volume.
            let agrees = match (volume.parse::<f64>(), actual.parse::<f64>()) {
                (Ok(wanted), Ok(actual)) => wanted == actual,
                _ => *volume == actual,
            };
            if !agrees {
                debug!(loop_id, actual, wanted = %volume, "correcting volume");
                let wanted = match volume.parse::<f64>() {
                    Ok(n) => json!(n),
                    Err(_) => json!(volume),
                };
                players.set_property(loop_id, "volume", wanted).await;
            }
        }
    }
}
