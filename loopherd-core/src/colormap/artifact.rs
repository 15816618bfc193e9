//! On-disk colormap artifact: the durability boundary of the pipeline.
//!
//! Layout: magic, version u16 LE, resolution u16 LE, frame count u32 LE,
//! then frame_count x resolution x 3 bytes of RGB cells in frame order.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::{HerdError, Result};

pub const MAGIC: &[u8; 4] = b"LHCM";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 4 + 2 + 2 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Colormap {
    pub resolution: u16,
    pub frame_count: u32,
    /// frame_count * resolution * 3 bytes, frame-major.
    pub cells: Vec<u8>,
}

impl Colormap {
    /// Lay out per-frame palettes as a dense array. Frames with fewer
    /// than `resolution` entries are zero-padded.
    pub fn from_palettes(resolution: u16, frames: &[Vec<(u32, [u8; 3])>]) -> Self {
        let row = resolution as usize * 3;
        let mut cells = vec![0u8; frames.len() * row];
        for (f, palette) in frames.iter().enumerate() {
            for (i, (_, rgb)) in palette.iter().take(resolution as usize).enumerate() {
                let at = f * row + i * 3;
                cells[at..at + 3].copy_from_slice(rgb);
            }
        }
        Self {
            resolution,
            frame_count: frames.len() as u32,
            cells,
        }
    }

    pub fn rgb(&self, frame: u32, cell: u16) -> [u8; 3] {
        let at = (frame as usize * self.resolution as usize + cell as usize) * 3;
        [self.cells[at], self.cells[at + 1], self.cells[at + 2]]
    }

    pub fn write_to(&self, mut w: impl Write) -> std::io::Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        w.write_all(&self.resolution.to_le_bytes())?;
        w.write_all(&self.frame_count.to_le_bytes())?;
        w.write_all(&self.cells)?;
        Ok(())
    }

    pub fn read_from(mut r: impl Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(HerdError::Artifact("bad magic".into()));
        }
        let mut v = [0u8; 2];
        r.read_exact(&mut v)?;
        let version = u16::from_le_bytes(v);
        if version != VERSION {
            return Err(HerdError::Artifact(format!("unknown version {version}")));
        }
        let mut res = [0u8; 2];
        r.read_exact(&mut res)?;
        let resolution = u16::from_le_bytes(res);
        let mut fc = [0u8; 4];
        r.read_exact(&mut fc)?;
        let frame_count = u32::from_le_bytes(fc);
        // The header is untrusted; let the body grow only as far as the
        // input actually reaches instead of allocating the claimed size.
        let len = frame_count as u64 * resolution as u64 * 3;
        let mut cells = Vec::new();
        let read = r.take(len).read_to_end(&mut cells)?;
        if read as u64 != len {
            return Err(HerdError::Artifact(format!(
                "truncated artifact: expected {len} cell bytes, got {read}"
            )));
        }
        Ok(Self {
            resolution,
            frame_count,
            cells,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.cells.len());
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&self.resolution.to_le_bytes());
        buf.extend_from_slice(&self.frame_count.to_le_bytes());
        buf.extend_from_slice(&self.cells);
        buf
    }

    /// Persist via a temp file in the same directory so readers never
    /// observe a partial artifact.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let dir = path.parent().ok_or_else(|| {
            HerdError::Artifact(format!("artifact path has no parent: {}", path.display()))
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        self.write_to(&mut tmp)?;
        tmp.persist(path)
            .map_err(|e| HerdError::Artifact(format!("persist {}: {}", path.display(), e.error)))?;
        Ok(())
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::read_from(std::io::BufReader::new(file))
    }
}

/// Duration (frame count) from an artifact header without loading cells.
pub fn read_frame_count(path: &Path) -> Result<u32> {
    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; HEADER_LEN];
    file.read_exact(&mut header)?;
    if &header[..4] != MAGIC {
        return Err(HerdError::Artifact("bad magic".into()));
    }
    Ok(u32::from_le_bytes([header[8], header[9], header[10], header[11]]))
}
