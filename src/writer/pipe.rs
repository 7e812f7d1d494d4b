use anyhow::{bail, Context, Result};
use std::io::{self, ErrorKind, Write};

/// Attached to pipe write failures, which ffmpeg usually causes by exiting
/// early on arguments that do not match the frames being sent.
pub const WRITE_HINT: &str = "likely cause is invalid parameters to ffmpeg";

/// Writes all of `buf`, looping over partial writes.
///
/// `Interrupted` is retried; a writer that accepts zero bytes fails with
/// `WriteZero`.
pub fn write_full<W: Write + ?Sized>(out: &mut W, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match out.write(buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "pipe accepted no bytes",
                ))
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Raw frame stream into an encoder's input, one unframed buffer per frame.
#[derive(Debug)]
pub struct FramePipe<W: Write> {
    inner: W,
    frame_size: Option<usize>,
    frames: u64,
}

impl<W: Write> FramePipe<W> {
    /// `frame_size` is the exact length every frame must have, when known.
    pub fn new(inner: W, frame_size: Option<usize>) -> Self {
        Self {
            inner,
            frame_size,
            frames: 0,
        }
    }

    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        if let Some(expected) = self.frame_size {
            if frame.len() != expected {
                bail!(
                    "frame size mismatch: expected {} bytes, got {}",
                    expected,
                    frame.len()
                );
            }
        }
        write_full(&mut self.inner, frame)
            .with_context(|| format!("failed to write frame {} ({})", self.frames, WRITE_HINT))?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flushes and hands back the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
