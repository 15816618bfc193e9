//! Directory sweeps: find media files in the watched directories and
//! run each new one through the colormap pipeline.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use crate::colormap::builder::ColormapBuilder;
use crate::colormap::extract::FrameExtractor;
use crate::config::Config;
use crate::error::Result;
use crate::keys;
use crate::store::{Store, text_fields};

/// Sweep one directory, registering every media file not already in
/// `tracked` (filename to fingerprint). A file that fails to register
/// is logged and retried on the next sweep.
pub async fn sweep_dir<S, E>(
    store: &S,
    builder: &ColormapBuilder<E>,
    dir: &Path,
    tracked: &mut HashMap<String, String>,
) -> Result<()>
where
    S: Store,
    E: FrameExtractor,
{
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_none_or(|x| x != "mp4") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if tracked.contains_key(name) {
            continue;
        }
        match builder.process(store, path).await {
            Ok(fingerprint) => {
                tracked.insert(name.to_string(), fingerprint);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "source registration failed"),
        }
    }
    Ok(())
}

/// Publish the filename-to-fingerprint map under this server's sources
/// key so loop authors can look sources up by name.
pub async fn publish_sources<S: Store>(
    cfg: &Config,
    store: &S,
    tracked: &HashMap<String, String>,
) -> Result<()> {
    if tracked.is_empty() {
        return Ok(());
    }
    let fields = text_fields(
        tracked
            .iter()
            .map(|(name, fp)| (name.clone(), fp.clone()))
            .collect(),
    );
    store.hash_set(&keys::sources_key(cfg), fields).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::memory::MemoryStore;

    /// Produces no frames; sweeps only care that registration ran.
    struct NullExtractor {
        calls: Arc<AtomicUsize>,
    }

    impl FrameExtractor for NullExtractor {
        async fn extract(&self, _source: &Path, dest: &Path, _prefix: &str) -> Result<Vec<PathBuf>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(dest)?;
            Ok(Vec::new())
        }
    }

    fn builder(root: &Path) -> (ColormapBuilder<NullExtractor>, Arc<AtomicUsize>) {
        let cfg = Config {
            data_dir: root.join("data"),
            temp_dir: root.join("tmp"),
            socket_dir: root.join("sock"),
            source_dirs: vec![root.to_path_buf()],
            resolutions: vec![1],
            ..Config::default()
        };
        cfg.ensure_dirs().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let builder = ColormapBuilder::new(
            cfg,
            NullExtractor {
                calls: calls.clone(),
            },
        );
        (builder, calls)
    }

    #[tokio::test]
    async fn sweep_registers_media_and_ignores_the_rest() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.mp4"), b"aa").unwrap();
        std::fs::write(root.path().join("b.mp4"), b"bb").unwrap();
        std::fs::write(root.path().join("notes.txt"), b"text").unwrap();
        let (builder, _calls) = builder(root.path());
        let store = MemoryStore::new();
        let mut tracked = HashMap::new();

        sweep_dir(&store, &builder, root.path(), &mut tracked)
            .await
            .unwrap();

        assert_eq!(tracked.len(), 2);
        assert!(tracked.contains_key("a.mp4"));
        assert!(tracked.contains_key("b.mp4"));
        assert_ne!(tracked["a.mp4"], tracked["b.mp4"]);
    }

    #[tokio::test]
    async fn tracked_files_are_not_reprocessed() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.mp4"), b"aa").unwrap();
        let (builder, calls) = builder(root.path());
        let store = MemoryStore::new();
        let mut tracked = HashMap::new();

        sweep_dir(&store, &builder, root.path(), &mut tracked)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sweep_dir(&store, &builder, root.path(), &mut tracked)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sources_map_is_published() {
        let root = tempfile::tempdir().unwrap();
        let cfg = Config {
            source_dirs: vec![root.path().to_path_buf()],
            ..Config::default()
        };
        let store = MemoryStore::new();
        let tracked: HashMap<String, String> =
            [("a.mp4".to_string(), "fp-a".to_string())].into();

        publish_sources(&cfg, &store, &tracked).await.unwrap();

        assert_eq!(
            store
                .hash_get(&keys::sources_key(&cfg), "a.mp4")
                .await
                .unwrap()
                .as_deref(),
            Some("fp-a")
        );
    }
}
