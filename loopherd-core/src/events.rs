//! Change-notification listener. Reacts immediately to loop deletions
//! and freshly queued ingest URLs, then runs a reconcile pass every
//! iteration so drift never outlives one poll window.

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::ingest::{FetchTool, Ingestor};
use crate::keys;
use crate::player::ipc::PlayerControl;
use crate::player::proc::ProcessControl;
use crate::reconcile;
use crate::store::events::EventSource;
use crate::store::{KeyEvent, Store};

/// Poll the notification feed until `stop` flips. Event handling and
/// reconciliation errors are logged, never fatal to the listener.
pub async fn listen<S, P, C, F, E>(
    cfg: &Config,
    store: &S,
    procs: &P,
    players: &C,
    ingestor: &Ingestor<F>,
    events: &mut E,
    mut stop: watch::Receiver<bool>,
) -> Result<()>
where
    S: Store,
    P: ProcessControl,
    C: PlayerControl,
    F: FetchTool,
    E: EventSource,
{
    loop {
        if *stop.borrow() {
            debug!("listener stopping");
            return Ok(());
        }
        let event = tokio::select! {
            ev = events.next_event(cfg.idle_wait) => ev?,
            _ = stop.changed() => continue,
        };
        if let Some(ev) = event {
            if let Err(e) = handle_event(cfg, store, procs, ingestor, &ev).await {
                warn!(key = %ev.key, op = %ev.op, error = %e, "event handling failed");
            }
        }
        if let Err(e) = reconcile::pass(cfg, store, procs, players).await {
            warn!(error = %e, "reconcile pass failed");
        }
    }
}

async fn handle_event<S, P, F>(
    cfg: &Config,
    store: &S,
    procs: &P,
    ingestor: &Ingestor<F>,
    event: &KeyEvent,
) -> Result<()>
where
    S: Store,
    P: ProcessControl,
    F: FetchTool,
{
    if event.op == "sadd" && keys::is_ingest_key(&event.key) {
        let Some(dest) = cfg.source_dirs.first() else {
            return Ok(());
        };
        ingestor.drain_queue(store, &event.key, dest).await?;
    } else if event.op == "del" && keys::is_loop_key(&event.key) {
        // The record is already gone; all that is left is its player.
        let Some(loop_id) = keys::loop_id_from_key(&event.key) else {
            return Ok(());
        };
        let running = keys::running_key(cfg);
        if let Some(pid) = store.hash_get(&running, loop_id).await? {
            debug!(loop_id, %pid, "loop deleted, stopping its player");
            if let Ok(pid) = pid.parse::<i32>() {
                procs.despawn(pid);
            }
            store.hash_del(&running, loop_id).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use crate::store::memory::MemoryStore;
    use crate::testutil::{FakeFetch, FakePlayers, FakeProcs};

    fn test_cfg(root: &Path) -> Config {
        Config {
            source_dirs: vec![root.to_path_buf()],
            idle_wait: Duration::from_millis(5),
            settle_delay: Duration::from_millis(1),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn ingest_queue_event_drains_the_queue() {
        let root = tempfile::tempdir().unwrap();
        let cfg = test_cfg(root.path());
        let store = MemoryStore::new();
        let ingestor = Ingestor::new(cfg.clone(), FakeFetch::default());
        let procs = FakeProcs::default();

        let queue = keys::ingest_key(&cfg);
        store
            .set_add(&queue, "https://example.com/watch/abc")
            .await
            .unwrap();
        let event = KeyEvent {
            key: queue.clone(),
            op: "sadd".into(),
        };
        handle_event(&cfg, &store, &procs, &ingestor, &event)
            .await
            .unwrap();

        assert_eq!(ingestor_downloads(&ingestor).len(), 1);
        assert!(store.set_members(&queue).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queue_keeps_urls_the_fetch_tool_could_not_resolve() {
        struct FailingFetch;

        impl FetchTool for FailingFetch {
            async fn resolve_filename(&self, _url: &str) -> crate::error::Result<String> {
                Err(crate::error::HerdError::Tool {
                    tool: "yt-dlp".into(),
                    status: "exit status: 1".into(),
                })
            }

            async fn start_download(
                &self,
                _url: &str,
                _dest: &Path,
            ) -> crate::error::Result<()> {
                Ok(())
            }
        }

        let root = tempfile::tempdir().unwrap();
        let cfg = test_cfg(root.path());
        let store = MemoryStore::new();
        let ingestor = Ingestor::new(cfg.clone(), FailingFetch);
        let procs = FakeProcs::default();

        let queue = keys::ingest_key(&cfg);
        let url = "https://example.com/watch/abc";
        store.set_add(&queue, url).await.unwrap();
        let event = KeyEvent {
            key: queue.clone(),
            op: "sadd".into(),
        };
        handle_event(&cfg, &store, &procs, &ingestor, &event)
            .await
            .unwrap();

        // Still queued and not in history: the next sweep retries it.
        assert_eq!(store.set_members(&queue).await.unwrap(), vec![url]);
        assert!(
            store
                .set_members(&keys::history_key(&cfg))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn loop_deletion_event_stops_its_player() {
        let root = tempfile::tempdir().unwrap();
        let cfg = test_cfg(root.path());
        let store = MemoryStore::new();
        let ingestor = Ingestor::new(cfg.clone(), FakeFetch::default());
        let procs = FakeProcs::default();

        store
            .hash_set(&keys::running_key(&cfg), vec![("u1".into(), "42".into())])
            .await
            .unwrap();
        let event = KeyEvent {
            key: keys::loop_key(&cfg, "u1"),
            op: "del".into(),
        };
        handle_event(&cfg, &store, &procs, &ingestor, &event)
            .await
            .unwrap();

        assert_eq!(procs.despawned(), vec![42]);
        assert!(
            store
                .hash_get(&keys::running_key(&cfg), "u1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unrelated_events_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        let cfg = test_cfg(root.path());
        let store = MemoryStore::new();
        let ingestor = Ingestor::new(cfg.clone(), FakeFetch::default());
        let procs = FakeProcs::default();

        for (key, op) in [
            (keys::history_key(&cfg), "sadd".to_string()),
            (keys::loop_key(&cfg, "u1"), "hset".to_string()),
            ("source:abcd".to_string(), "hset".to_string()),
        ] {
            let event = KeyEvent { key, op };
            handle_event(&cfg, &store, &procs, &ingestor, &event)
                .await
                .unwrap();
        }
        assert!(procs.despawned().is_empty());
        assert!(ingestor_downloads(&ingestor).is_empty());
    }

    #[tokio::test]
    async fn listener_reacts_to_live_mutations_and_honors_stop() {
        let root = tempfile::tempdir().unwrap();
        let cfg = test_cfg(root.path());
        let store = MemoryStore::new();
        let ingestor = Ingestor::new(cfg.clone(), FakeFetch::default());
        let procs = FakeProcs::default();
        let players = FakePlayers::default();
        let mut events = store.event_source();
        let (tx, rx) = watch::channel(false);

        let listener = listen(&cfg, &store, &procs, &players, &ingestor, &mut events, rx);
        let driver = async {
            store
                .set_add(&keys::ingest_key(&cfg), "https://example.com/watch/abc")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(listener, driver);
        result.unwrap();

        assert_eq!(ingestor_downloads(&ingestor).len(), 1);
    }

    fn ingestor_downloads(ing: &Ingestor<FakeFetch>) -> Vec<(String, std::path::PathBuf)> {
        ing.fetcher().downloads()
    }
}
