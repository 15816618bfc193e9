use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

pub const DEFAULT_RESOLUTIONS: [u16; 5] = [1, 4, 8, 16, 32];

/// Runtime context shared by every coordinator. Built once in the binary
/// and passed by reference; no globals.
#[derive(Clone, Debug)]
pub struct Config {
    /// Key-namespace prefix for all server-scoped keys.
    pub namespace: String,
    /// Identifier of this server inside the namespace.
    pub server_id: String,
    /// Durable colormap artifacts live here, keyed by fingerprint.
    pub data_dir: PathBuf,
    /// Extracted frame sequences (scratch, safe to delete).
    pub temp_dir: PathBuf,
    /// Per-loop player control sockets.
    pub socket_dir: PathBuf,
    /// Directories watched for source files.
    pub source_dirs: Vec<PathBuf>,
    /// Candidate colormap resolutions; artifacts exist only for these.
    pub resolutions: Vec<u16>,
    /// Wait after spawning a player before its socket accepts connections.
    pub settle_delay: Duration,
    /// Listener wait per poll iteration when no notification is ready.
    pub idle_wait: Duration,
    /// Pause between directory sweeps.
    pub scan_interval: Duration,
    /// Pause between ingest-queue sweeps.
    pub ingest_interval: Duration,
    /// Upper bound on any blocking external tool call.
    pub tool_timeout: Duration,
    pub player_bin: String,
    pub ffmpeg_bin: String,
    pub fetch_bin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "loopherd".into(),
            server_id: "lhd".into(),
            data_dir: PathBuf::from("/var/lib/loopherd"),
            temp_dir: std::env::temp_dir().join("loopherd"),
            socket_dir: std::env::temp_dir().join("loopherd-sock"),
            source_dirs: vec![PathBuf::from(".")],
            resolutions: DEFAULT_RESOLUTIONS.to_vec(),
            settle_delay: Duration::from_millis(750),
            idle_wait: Duration::from_millis(50),
            scan_interval: Duration::from_secs(10),
            ingest_interval: Duration::from_secs(30),
            tool_timeout: Duration::from_secs(300),
            player_bin: "mpv".into(),
            ffmpeg_bin: "ffmpeg".into(),
            fetch_bin: "yt-dlp".into(),
        }
    }
}

impl Config {
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.temp_dir, &self.socket_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
