//! Drives a source file through fingerprinting, frame extraction,
//! quantization and artifact persistence, then mirrors the results into
//! the store.
//!
//! The filesystem is the durability boundary: artifacts on disk are
//! authoritative and the store copy is rebuilt from them on every pass,
//! so a flushed store heals on the next sweep.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::colormap::artifact::{self, Colormap};
use crate::colormap::extract::FrameExtractor;
use crate::colormap::quantize;
use crate::config::Config;
use crate::error::{HerdError, Result};
use crate::store::{Store, StoreValue};
use crate::{fingerprint, keys};

pub const MAP_NAME: &str = "rgb_map";

pub struct ColormapBuilder<E> {
    cfg: Config,
    extractor: E,
    /// One guard per fingerprint so concurrent sweeps of the same
    /// content do the expensive work once.
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl<E: FrameExtractor> ColormapBuilder<E> {
    pub fn new(cfg: Config, extractor: E) -> Self {
        Self {
            cfg,
            extractor,
            inflight: DashMap::new(),
        }
    }

    pub fn artifact_path(&self, fingerprint: &str, resolution: u16) -> PathBuf {
        self.cfg
            .data_dir
            .join(format!("{fingerprint}_{resolution}.cmap"))
    }

    fn artifacts_complete(&self, fingerprint: &str) -> bool {
        self.cfg
            .resolutions
            .iter()
            .all(|&r| self.artifact_path(fingerprint, r).exists())
    }

    /// Ensure artifacts and store rows exist for `source`; returns its
    /// fingerprint. Idempotent: complete artifacts skip extraction
    /// entirely, and the store sync runs unconditionally.
    pub async fn process<S: Store>(&self, store: &S, source: &Path) -> Result<String> {
        let fp = fingerprint::file_digest(source)?;
        let guard = self
            .inflight
            .entry(fp.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _held = guard.lock().await;

        if !self.artifacts_complete(&fp) {
            info!(source = %source.display(), fingerprint = %fp, "building colormaps");
            let frames = self
                .extractor
                .extract(source, &self.cfg.temp_dir, &fp)
                .await?;
            for &resolution in &self.cfg.resolutions {
                let path = self.artifact_path(&fp, resolution);
                if path.exists() {
                    continue;
                }
                let map = build_map(&frames, resolution)?;
                map.write_file(&path)?;
                debug!(path = %path.display(), "artifact written");
            }
        }
        self.sync_store(store, source, &fp).await?;
        Ok(fp)
    }

    /// Mirror on-disk artifacts for `fingerprint` into its source hash.
    async fn sync_store<S: Store>(&self, store: &S, source: &Path, fingerprint: &str) -> Result<()> {
        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                HerdError::Artifact(format!("source has no file name: {}", source.display()))
            })?;
        let mut fields: Vec<(String, StoreValue)> = vec![
            ("filename".into(), filename.into()),
            ("filehash".into(), fingerprint.into()),
        ];
        let mut duration: Option<u32> = None;
        for &resolution in &self.cfg.resolutions {
            let path = self.artifact_path(fingerprint, resolution);
            let bytes = std::fs::read(&path)?;
            if duration.is_none() {
                duration = Some(artifact::read_frame_count(&path)?);
            }
            fields.push((
                keys::map_resolution_field(MAP_NAME, resolution),
                StoreValue::Blob(bytes),
            ));
        }
        if let Some(seconds) = duration {
            fields.push(("duration".into(), seconds.to_string().into()));
        }
        if let Some(&widest) = self.cfg.resolutions.iter().max() {
            let map = Colormap::read_file(&self.artifact_path(fingerprint, widest))?;
            if let Some(image) = encode_preview(&map) {
                fields.push((
                    keys::map_image_field(MAP_NAME, "preview"),
                    StoreValue::Blob(image),
                ));
            }
        }
        store.hash_set(&keys::source_key(fingerprint), fields).await
    }
}

/// PNG rendering of a colormap, one pixel per cell, one row per frame.
fn encode_preview(map: &Colormap) -> Option<Vec<u8>> {
    if map.frame_count == 0 || map.resolution == 0 {
        return None;
    }
    let mut out = Vec::new();
    let mut enc = png::Encoder::new(&mut out, u32::from(map.resolution), map.frame_count);
    enc.set_color(png::ColorType::Rgb);
    enc.set_depth(png::BitDepth::Eight);
    let mut writer = enc.write_header().ok()?;
    writer.write_image_data(&map.cells).ok()?;
    writer.finish().ok()?;
    Some(out)
}

/// Quantize each sampled frame to `resolution` colors and pack the rows.
pub fn build_map(frames: &[PathBuf], resolution: u16) -> Result<Colormap> {
    let mut palettes = Vec::with_capacity(frames.len());
    for frame in frames {
        let pixels = frame_pixels(frame)?;
        palettes.push(quantize::palette(&pixels, resolution as usize));
    }
    Ok(Colormap::from_palettes(resolution, &palettes))
}

/// Decode a PNG frame to flat RGB, widening grayscale and dropping alpha.
fn frame_pixels(path: &Path) -> Result<Vec<[u8; 3]>> {
    let file = std::fs::File::open(path)?;
    let decoder = png::Decoder::new(std::io::BufReader::new(file));
    let mut reader = decoder
        .read_info()
        .map_err(|e| HerdError::Artifact(format!("decode {}: {e}", path.display())))?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| HerdError::Artifact(format!("decode {}: {e}", path.display())))?;
    let data = &buf[..info.buffer_size()];
    let pixels = match info.color_type {
        png::ColorType::Rgb => data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
        png::ColorType::Rgba => data.chunks_exact(4).map(|c| [c[0], c[1], c[2]]).collect(),
        png::ColorType::Grayscale => data.iter().map(|&g| [g, g, g]).collect(),
        png::ColorType::GrayscaleAlpha => data.chunks_exact(2).map(|c| [c[0]; 3]).collect(),
        other => {
            return Err(HerdError::Artifact(format!(
                "unsupported color type {other:?} in {}",
                path.display()
            )));
        }
    };
    Ok(pixels)
}
