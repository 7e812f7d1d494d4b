use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use super::FrameWriter;
use crate::image_io::{self, OutputFormat};

/// Writes each RGB24 frame as `frame_NNNN.<ext>` inside a directory.
pub struct ImageSequenceWriter {
    dir: PathBuf,
    width: u32,
    height: u32,
    format: OutputFormat,
    next: u32,
    started: bool,
}

impl ImageSequenceWriter {
    pub fn new(dir: impl AsRef<Path>, width: u32, height: u32, format: OutputFormat) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            width,
            height,
            format,
            next: 0,
            started: false,
        }
    }

    pub fn frame_path(&self, frame_id: u32) -> PathBuf {
        self.dir
            .join(format!("frame_{:04}.{}", frame_id, self.format.extension()))
    }

    pub fn frames_written(&self) -> u32 {
        self.next
    }
}

impl FrameWriter for ImageSequenceWriter {
    fn start(&mut self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("image sequence width and height must be set");
        }
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
        }
        self.started = true;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if !self.started {
            bail!("image sequence writer not started");
        }
        let path = self.frame_path(self.next);
        image_io::write(&path, self.width, self.height, frame)?;
        self.next += 1;
        log::debug!("wrote {}", path.display());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }
}
