//! Operator CLI. Writes loop specifications and ingest requests into
//! the store; the daemon notices and does the rest.

use clap::{Parser, Subcommand};
use uuid::Uuid;

use loopherd_core::colormap::artifact::Colormap;
use loopherd_core::colormap::builder::MAP_NAME;
use loopherd_core::store::redis::RedisStore;
use loopherd_core::store::{Store, text_fields};
use loopherd_core::{Config, HerdError, LoopRecord, LoopStatus, Result, keys};

#[derive(Parser)]
#[command(author, version, about = "loopherd control CLI", long_about = None)]
struct Cli {
    #[arg(long, default_value = "redis://127.0.0.1/")]
    redis_url: String,

    #[arg(long, default_value = "loopherd")]
    namespace: String,

    #[arg(long, default_value = "lhd")]
    server_id: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Loop(LoopCommands),

    /// Queue a URL for download into the watched directory
    Ingest { url: String },

    #[command(subcommand)]
    Source(SourceCommands),

    #[command(subcommand)]
    Map(MapCommands),
}

#[derive(Subcommand)]
enum LoopCommands {
    /// Create a loop over a source file; prints the new loop id
    Add {
        /// Source filename as the daemon's scanner sees it
        filename: String,

        /// Loop window start in seconds
        #[arg(long)]
        start: Option<f64>,

        /// Loop window end in seconds
        #[arg(long)]
        end: Option<f64>,

        #[arg(long)]
        volume: Option<String>,

        /// Content fingerprint of the source, if known
        #[arg(long)]
        filehash: Option<String>,
    },

    /// List this server's loops
    Ls,

    /// Update fields on an existing loop
    Set {
        id: String,

        #[arg(long)]
        start: Option<f64>,

        #[arg(long)]
        end: Option<f64>,

        #[arg(long)]
        volume: Option<String>,

        /// "active", "muted" or "archived"
        #[arg(long)]
        status: Option<String>,
    },

    /// Delete a loop; the daemon stops its player
    Rm { id: String },
}

#[derive(Subcommand)]
enum SourceCommands {
    /// List registered sources
    Ls,
}

#[derive(Subcommand)]
enum MapCommands {
    /// Colormap summary for one source
    Info {
        fingerprint: String,

        #[arg(long, default_value_t = 8)]
        resolution: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config {
        namespace: cli.namespace.clone(),
        server_id: cli.server_id.clone(),
        ..Config::default()
    };
    let store = RedisStore::connect(&cli.redis_url).await?;

    match cli.command {
        Commands::Loop(cmd) => handle_loop(&cfg, &store, cmd).await,
        Commands::Ingest { url } => {
            store.set_add(&keys::ingest_key(&cfg), &url).await?;
            println!("queued {url}");
            Ok(())
        }
        Commands::Source(SourceCommands::Ls) => {
            for key in store.keys(&keys::source_pattern()).await? {
                let row = store.hash_all(&key).await?;
                let filename = row.get("filename").map(String::as_str).unwrap_or("?");
                let duration = row.get("duration").map(String::as_str).unwrap_or("?");
                let fp = key.strip_prefix("source:").unwrap_or(&key);
                println!("{fp}  {duration:>6}s  {filename}");
            }
            Ok(())
        }
        Commands::Map(MapCommands::Info {
            fingerprint,
            resolution,
        }) => {
            let field = keys::map_resolution_field(MAP_NAME, resolution);
            let bytes = store
                .hash_get_bytes(&keys::source_key(&fingerprint), &field)
                .await?
                .ok_or_else(|| {
                    HerdError::Artifact(format!("no {field} for source {fingerprint}"))
                })?;
            let map = Colormap::read_from(bytes.as_slice())?;
            println!("resolution: {}", map.resolution);
            println!("frames:     {}", map.frame_count);
            if map.frame_count > 0 {
                let [r, g, b] = map.rgb(0, 0);
                println!("frame 0:    #{r:02x}{g:02x}{b:02x}");
            }
            Ok(())
        }
    }
}

async fn handle_loop(cfg: &Config, store: &RedisStore, cmd: LoopCommands) -> Result<()> {
    match cmd {
        LoopCommands::Add {
            filename,
            start,
            end,
            volume,
            filehash,
        } => {
            let record = LoopRecord {
                uuid: Uuid::new_v4().to_string(),
                filename,
                filehash,
                status: LoopStatus::Active,
                start,
                end,
                volume,
                pid: None,
            };
            store
                .hash_set(
                    &keys::loop_key(cfg, &record.uuid),
                    text_fields(record.to_fields()),
                )
                .await?;
            println!("{}", record.uuid);
        }

        LoopCommands::Ls => {
            for key in store.keys(&keys::loop_pattern(cfg)).await? {
                let row = store.hash_all(&key).await?;
                let Some(record) = LoopRecord::from_fields(&row) else {
                    continue;
                };
                let window = match (record.start, record.end) {
                    (Some(a), Some(b)) => format!("{a}..{b}"),
                    (Some(a), None) => format!("{a}.."),
                    (None, Some(b)) => format!("..{b}"),
                    (None, None) => "-".to_string(),
                };
                let pid = record
                    .pid
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<38} {:<9} {:<12} pid={:<8} {}",
                    record.uuid,
                    record.status.as_str(),
                    window,
                    pid,
                    record.filename
                );
            }
        }

        LoopCommands::Set {
            id,
            start,
            end,
            volume,
            status,
        } => {
            let mut fields: Vec<(String, String)> = Vec::new();
            if let Some(start) = start {
                fields.push(("start".into(), start.to_string()));
            }
            if let Some(end) = end {
                fields.push(("end".into(), end.to_string()));
            }
            if let Some(volume) = volume {
                fields.push(("volume".into(), volume));
            }
            if let Some(status) = status {
                fields.push(("status".into(), LoopStatus::parse(&status).as_str().into()));
            }
            if fields.is_empty() {
                println!("nothing to change");
                return Ok(());
            }
            store
                .hash_set(&keys::loop_key(cfg, &id), text_fields(fields))
                .await?;
            println!("updated {id}");
        }

        LoopCommands::Rm { id } => {
            store.delete(&keys::loop_key(cfg, &id)).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}
