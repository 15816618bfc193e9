//! Frame extraction seam. Production runs ffmpeg; tests substitute a
//! synthetic extractor.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tracing::debug;

use crate::error::{HerdError, Result};

/// Samples a media file at one frame per second into numbered PNGs.
#[allow(async_fn_in_trait)]
pub trait FrameExtractor: Send + Sync {
    /// Write `<prefix>_<n>.png` files under `dest` and return their
    /// paths in frame order.
    async fn extract(&self, source: &Path, dest: &Path, prefix: &str) -> Result<Vec<PathBuf>>;
}

pub struct FfmpegExtractor {
    bin: String,
    timeout: Duration,
}

impl FfmpegExtractor {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }
}

impl FrameExtractor for FfmpegExtractor {
    async fn extract(&self, source: &Path, dest: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dest)?;
        let pattern = dest.join(format!("{prefix}_%08d.png"));
        debug!(source = %source.display(), "sampling frames");
        let mut cmd = tokio::process::Command::new(&self.bin);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(source)
            .args(["-vf", "fps=1"])
            .arg(&pattern)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let status = tokio::time::timeout(self.timeout, cmd.status())
            .await
            .map_err(|_| HerdError::ToolTimeout {
                tool: self.bin.clone(),
            })??;
        if !status.success() {
            return Err(HerdError::Tool {
                tool: self.bin.clone(),
                status: status.to_string(),
            });
        }
        collect_frames(dest, prefix)
    }
}

/// Gather extracted frames for `prefix` from `dest`, sorted so the
/// zero-padded sequence numbers give frame order.
pub fn collect_frames(dest: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let lead = format!("{prefix}_");
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dest)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|x| x == "png")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&lead))
        })
        .collect();
    frames.sort();
    Ok(frames)
}
