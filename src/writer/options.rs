use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CHANNELS: u32 = 3;
pub const DEFAULT_FPS: f64 = 25.0;
pub const DEFAULT_CODEC: &str = "mpeg4";
pub const DEFAULT_PIX_FMT: &str = "rgb24";

/// Settings for a [`VideoWriter`](super::VideoWriter).
///
/// Zero or empty fields take their defaults in [`VideoOptions::resolve`];
/// width and height have no default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VideoOptions {
    pub width: u32,
    pub height: u32,
    /// Informational only, the pipe layout follows `pix_fmt`.
    pub channels: u32,
    /// Target bitrate in bits per second, 0 leaves it to the encoder.
    pub bitrate: u32,
    pub fps: f64,
    pub codec: String,
    pub pix_fmt: String,
    /// Encoder binary, looked up on `PATH` when unset.
    pub ffmpeg: Option<PathBuf>,
    /// Exit the process with status 1 after killing the encoder on
    /// SIGINT/SIGTERM.
    pub exit_on_signal: bool,
    /// Forward encoder stderr instead of discarding it.
    pub show_encoder_output: bool,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            channels: 0,
            bitrate: 0,
            fps: 0.0,
            codec: String::new(),
            pix_fmt: String::new(),
            ffmpeg: None,
            exit_on_signal: true,
            show_encoder_output: false,
        }
    }
}

impl VideoOptions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    pub fn with_pix_fmt(mut self, pix_fmt: impl Into<String>) -> Self {
        self.pix_fmt = pix_fmt.into();
        self
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Validates the options and fills in defaults.
    pub fn resolve(mut self) -> Result<Self> {
        if self.width == 0 || self.height == 0 {
            bail!(
                "video width and height must be set (got {}x{})",
                self.width,
                self.height
            );
        }
        if !self.fps.is_finite() || self.fps < 0.0 {
            bail!("invalid frame rate: {}", self.fps);
        }
        if self.channels == 0 {
            self.channels = DEFAULT_CHANNELS;
        }
        if self.fps == 0.0 {
            self.fps = DEFAULT_FPS;
        }
        if self.codec.is_empty() {
            self.codec = DEFAULT_CODEC.to_string();
        }
        if self.pix_fmt.is_empty() {
            self.pix_fmt = DEFAULT_PIX_FMT.to_string();
        }
        self.frame_size()?;
        Ok(self)
    }

    /// Bytes per frame for `pix_fmt`, if the layout is known.
    pub fn frame_size(&self) -> Result<Option<usize>> {
        frame_size(&self.pix_fmt, self.width, self.height)
    }
}

/// Size in bytes of one raw frame of the given ffmpeg pixel format.
///
/// Returns `None` for formats without a fixed table entry; frames in those
/// formats are passed through unchecked. Sizes that do not fit in `usize`
/// are an error.
pub fn frame_size(pix_fmt: &str, width: u32, height: u32) -> Result<Option<usize>> {
    let overflow = || anyhow!("{}x{} {} frame size overflows", width, height, pix_fmt);
    let (w, h) = (width as usize, height as usize);
    let luma = w.checked_mul(h).ok_or_else(overflow)?;
    let planar = |cols: usize, rows: usize| {
        cols.checked_mul(rows)
            .and_then(|n| n.checked_mul(2))
            .and_then(|n| n.checked_add(luma))
    };
    let size = match pix_fmt {
        "gray" => Some(luma),
        "gray16le" | "gray16be" => luma.checked_mul(2),
        "rgb24" | "bgr24" | "yuv444p" => luma.checked_mul(3),
        "rgba" | "bgra" | "argb" | "abgr" | "rgb0" | "bgr0" | "0rgb" | "0bgr" => {
            luma.checked_mul(4)
        }
        "rgb48le" | "rgb48be" => luma.checked_mul(6),
        "yuv420p" | "nv12" => planar(w.div_ceil(2), h.div_ceil(2)),
        "yuv422p" => planar(w.div_ceil(2), h),
        _ => return Ok(None),
    };
    size.map(Some).ok_or_else(overflow)
}
