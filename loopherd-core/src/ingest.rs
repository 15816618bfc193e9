//! URL ingestion: turn queued remote URLs into files in a watched
//! directory. Downloads run detached; the scanner picks the file up on
//! a later sweep once it is complete.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{HerdError, Result};
use crate::keys;
use crate::store::Store;

const FETCH_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/mp4";

/// Resolves what a download would be named and kicks downloads off.
#[allow(async_fn_in_trait)]
pub trait FetchTool: Send + Sync {
    /// Dry run: the filename the tool would produce for `url`.
    async fn resolve_filename(&self, url: &str) -> Result<String>;

    /// Start a detached download of `url` into `dest` and return
    /// without waiting for it.
    async fn start_download(&self, url: &str, dest: &Path) -> Result<()>;
}

pub struct YtDlp {
    bin: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }
}

impl FetchTool for YtDlp {
    async fn resolve_filename(&self, url: &str) -> Result<String> {
        let mut cmd = tokio::process::Command::new(&self.bin);
        cmd.args(["-f", FETCH_FORMAT, "--get-filename", url])
            .stdin(Stdio::null())
            .stderr(Stdio::null());
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| HerdError::ToolTimeout {
                tool: self.bin.clone(),
            })??;
        if !output.status.success() {
            return Err(HerdError::Tool {
                tool: self.bin.clone(),
                status: output.status.to_string(),
            });
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name.is_empty() {
            return Err(HerdError::Tool {
                tool: self.bin.clone(),
                status: "empty filename".into(),
            });
        }
        Ok(name)
    }

    async fn start_download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut cmd = tokio::process::Command::new(&self.bin);
        cmd.args(["-f", FETCH_FORMAT, url])
            .current_dir(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd.spawn()?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Download initiated for this filename.
    Started(String),
    /// URL already in the ingest history.
    Duplicate,
    /// Target file already on disk.
    Exists(String),
    Rejected(String),
}

pub struct Ingestor<F> {
    cfg: Config,
    fetcher: F,
}

impl<F: FetchTool> Ingestor<F> {
    pub fn new(cfg: Config, fetcher: F) -> Self {
        Self { cfg, fetcher }
    }

    #[cfg(test)]
    pub(crate) fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Ingest one URL into `dest`. The URL lands in the history set as
    /// soon as a download is initiated, so a crash mid-download costs a
    /// partial file, never a duplicate fetch.
    pub async fn ingest<S: Store>(&self, store: &S, url: &str, dest: &Path) -> Result<IngestOutcome> {
        if let Err(reason) = validate(url) {
            warn!(url, reason, "rejecting ingest URL");
            return Ok(IngestOutcome::Rejected(reason.to_string()));
        }
        let history = keys::history_key(&self.cfg);
        if store.set_members(&history).await?.iter().any(|u| u == url) {
            return Ok(IngestOutcome::Duplicate);
        }
        let filename = self.fetcher.resolve_filename(url).await?;
        if dest.join(&filename).exists() {
            store.set_add(&history, url).await?;
            return Ok(IngestOutcome::Exists(filename));
        }
        self.fetcher.start_download(url, dest).await?;
        store.set_add(&history, url).await?;
        info!(url, filename, "download started");
        Ok(IngestOutcome::Started(filename))
    }

    /// Drain every ingest queue in the namespace into the primary
    /// source directory.
    pub async fn sweep<S: Store>(&self, store: &S) -> Result<()> {
        let Some(dest) = self.cfg.source_dirs.first().cloned() else {
            return Ok(());
        };
        for queue in store.keys(&keys::ingest_pattern(&self.cfg)).await? {
            self.drain_queue(store, &queue, &dest).await?;
        }
        Ok(())
    }

    /// Handled URLs (started, duplicate, rejected, already on disk)
    /// leave the queue; a URL whose tool call fails stays queued for
    /// the next sweep.
    pub async fn drain_queue<S: Store>(&self, store: &S, queue: &str, dest: &Path) -> Result<()> {
        for url in store.set_members(queue).await? {
            match self.ingest(store, &url, dest).await {
                Ok(_) => store.set_remove(queue, &url).await?,
                Err(e) => warn!(url, error = %e, "ingest failed, leaving queued"),
            }
        }
        Ok(())
    }
}

/// A usable ingest URL has a scheme, a host and a path.
fn validate(url: &str) -> std::result::Result<(), &'static str> {
    let parsed = Url::parse(url).map_err(|_| "not a URL")?;
    if !parsed.host_str().is_some_and(|h| !h.is_empty()) {
        return Err("no host");
    }
    // The parser normalizes an absent path to "/"; a bare
    // "http://host" only passes if the input spelled the slash out.
    if parsed.path().is_empty() || (parsed.path() == "/" && !explicit_path(url)) {
        return Err("no path");
    }
    Ok(())
}

fn explicit_path(raw: &str) -> bool {
    let rest = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    rest.split(['?', '#'])
        .next()
        .is_some_and(|authority| authority.contains('/'))
}
