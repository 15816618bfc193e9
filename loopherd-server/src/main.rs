//! The reconciliation daemon. Each cycle runs a notification listener
//! alongside directory and ingest sweeps, publishes the source map,
//! then rests until the next cycle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use loopherd_core::colormap::builder::ColormapBuilder;
use loopherd_core::colormap::extract::FfmpegExtractor;
use loopherd_core::ingest::{Ingestor, YtDlp};
use loopherd_core::player::ipc::IpcBridge;
use loopherd_core::player::supervisor::PlayerSupervisor;
use loopherd_core::store::redis::RedisStore;
use loopherd_core::{Config, Result, events, scan};

#[derive(Parser)]
#[command(author, version, about = "loopherd media loop daemon", long_about = None)]
struct Args {
    /// State store to reconcile against
    #[arg(long, default_value = "redis://127.0.0.1/")]
    redis_url: String,

    #[arg(long, default_value = "loopherd")]
    namespace: String,

    #[arg(long, default_value = "lhd")]
    server_id: String,

    /// Durable colormap artifacts
    #[arg(long, default_value = "/var/lib/loopherd")]
    data_dir: PathBuf,

    /// Scratch space for extracted frames
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Player control sockets
    #[arg(long)]
    socket_dir: Option<PathBuf>,

    /// Watched media directory; repeat for several. The first one also
    /// receives ingested downloads.
    #[arg(long = "source-dir", required = true)]
    source_dirs: Vec<PathBuf>,

    /// Seconds between directory sweeps
    #[arg(long, default_value_t = 10)]
    scan_interval: u64,

    /// Seconds between ingest-queue sweeps
    #[arg(long, default_value_t = 30)]
    ingest_interval: u64,

    #[arg(long, default_value = "mpv")]
    player_bin: String,

    #[arg(long, default_value = "ffmpeg")]
    ffmpeg_bin: String,

    #[arg(long, default_value = "yt-dlp")]
    fetch_bin: String,
}

impl Args {
    fn to_config(&self) -> Config {
        let defaults = Config::default();
        Config {
            namespace: self.namespace.clone(),
            server_id: self.server_id.clone(),
            data_dir: self.data_dir.clone(),
            temp_dir: self
                .temp_dir
                .clone()
                .unwrap_or_else(|| defaults.temp_dir.clone()),
            socket_dir: self
                .socket_dir
                .clone()
                .unwrap_or_else(|| defaults.socket_dir.clone()),
            source_dirs: self.source_dirs.clone(),
            scan_interval: Duration::from_secs(self.scan_interval),
            ingest_interval: Duration::from_secs(self.ingest_interval),
            player_bin: self.player_bin.clone(),
            ffmpeg_bin: self.ffmpeg_bin.clone(),
            fetch_bin: self.fetch_bin.clone(),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = args.to_config();
    cfg.ensure_dirs()?;

    info!(url = %args.redis_url, namespace = %cfg.namespace, server = %cfg.server_id, "connecting to store");
    let store = Arc::new(RedisStore::connect(&args.redis_url).await?);
    store.enable_keyspace_events().await?;

    run(cfg, store).await
}

async fn run(cfg: Config, store: Arc<RedisStore>) -> Result<()> {
    let supervisor = Arc::new(PlayerSupervisor::new(cfg.clone()));
    let bridge = Arc::new(IpcBridge::new(&cfg.socket_dir));
    let builder = ColormapBuilder::new(
        cfg.clone(),
        FfmpegExtractor::new(&cfg.ffmpeg_bin, cfg.tool_timeout),
    );
    let ingestor = Arc::new(Ingestor::new(
        cfg.clone(),
        YtDlp::new(&cfg.fetch_bin, cfg.tool_timeout),
    ));

    // Filename -> fingerprint, accumulated across cycles.
    let mut tracked: HashMap<String, String> = HashMap::new();
    let mut last_ingest: Option<Instant> = None;

    info!("entering reconciliation cycles");
    loop {
        let (stop_tx, stop_rx) = watch::channel(false);
        let listener_events = store.event_source().await?;
        let listener = {
            let cfg = cfg.clone();
            let store = store.clone();
            let supervisor = supervisor.clone();
            let bridge = bridge.clone();
            let ingestor = ingestor.clone();
            tokio::spawn(async move {
                let mut listener_events = listener_events;
                if let Err(e) = events::listen(
                    &cfg,
                    &*store,
                    &*supervisor,
                    &*bridge,
                    &*ingestor,
                    &mut listener_events,
                    stop_rx,
                )
                .await
                {
                    error!(error = %e, "listener failed");
                }
            })
        };

        for dir in &cfg.source_dirs {
            if let Err(e) = scan::sweep_dir(&*store, &builder, dir, &mut tracked).await {
                warn!(dir = %dir.display(), error = %e, "directory sweep failed");
            }
        }
        if last_ingest.is_none_or(|t| t.elapsed() >= cfg.ingest_interval) {
            if let Err(e) = ingestor.sweep(&*store).await {
                warn!(error = %e, "ingest sweep failed");
            }
            last_ingest = Some(Instant::now());
        }
        if let Err(e) = scan::publish_sources(&cfg, &*store, &tracked).await {
            warn!(error = %e, "could not publish sources");
        }

        let shutdown = tokio::select! {
            _ = tokio::time::sleep(cfg.scan_interval) => false,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                true
            }
        };

        // Stop the cycle's listener before reconnecting a fresh feed;
        // players stay up and are re-adopted on the next start.
        let _ = stop_tx.send(true);
        let _ = listener.await;
        if shutdown {
            return Ok(());
        }
    }
}
