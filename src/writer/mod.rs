use anyhow::Result;

mod ffmpeg;
mod options;
mod pipe;
mod sequence;
mod signal;

pub use {
    ffmpeg::{is_ffmpeg_available, VideoWriter},
    options::{frame_size, VideoOptions, DEFAULT_CHANNELS, DEFAULT_CODEC, DEFAULT_FPS, DEFAULT_PIX_FMT},
    pipe::{write_full, FramePipe, WRITE_HINT},
    sequence::ImageSequenceWriter,
    signal::SignalGuard,
};

/// A destination for raw frames: configured up front, then started, fed and
/// closed.
pub trait FrameWriter {
    fn start(&mut self) -> Result<()>;
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}
