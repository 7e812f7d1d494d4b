//! Still-image I/O and raw video frame streaming into an `ffmpeg` subprocess.
//!
//! Pixel codecs come from the `image` crate and video encoding is done by an
//! external `ffmpeg` binary reading raw frames from its standard input.

pub mod image_io;
pub mod writer;

pub use image_io::{OutputFormat, RgbBuffer};
pub use writer::{
    frame_size, is_ffmpeg_available, write_full, FramePipe, FrameWriter, ImageSequenceWriter,
    SignalGuard, VideoOptions, VideoWriter, WRITE_HINT,
};
