use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use which::which;

use super::{FramePipe, FrameWriter, SignalGuard, VideoOptions};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

type ChildSlot = Arc<Mutex<Option<Child>>>;

/// Whether an `ffmpeg` binary can be found on `PATH`.
pub fn is_ffmpeg_available() -> bool {
    which("ffmpeg").is_ok()
}

#[derive(Debug)]
enum State {
    Configured,
    Running(Session),
    Closed,
}

#[derive(Debug)]
struct Session {
    child: ChildSlot,
    pipe: FramePipe<ChildStdin>,
    guard: SignalGuard,
}

/// Streams raw frames into an `ffmpeg` process that encodes them to a file.
///
/// `new` only validates the options; the encoder is spawned by `start`.
/// Frames are written unframed to the encoder's stdin and must match
/// `pix_fmt` and the configured dimensions exactly.
#[derive(Debug)]
pub struct VideoWriter {
    path: PathBuf,
    options: VideoOptions,
    frame_size: Option<usize>,
    state: State,
    frames: u64,
}

fn lock(slot: &Mutex<Option<Child>>) -> MutexGuard<'_, Option<Child>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl VideoWriter {
    pub fn new(path: impl AsRef<Path>, options: VideoOptions) -> Result<Self> {
        let options = options.resolve()?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            frame_size: options.frame_size()?,
            options,
            state: State::Configured,
            frames: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &VideoOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Process id of the running encoder.
    pub fn encoder_pid(&self) -> Option<u32> {
        match &self.state {
            State::Running(session) => lock(&session.child).as_ref().map(Child::id),
            _ => None,
        }
    }

    /// Arguments passed to the encoder, output path last.
    pub fn command_args(&self) -> Vec<OsString> {
        let opts = &self.options;
        let mut args: Vec<OsString> = [
            "-y".to_string(),
            "-f".into(),
            "rawvideo".into(),
            "-vcodec".into(),
            "rawvideo".into(),
            "-s".into(),
            format!("{}x{}", opts.width, opts.height),
            "-pix_fmt".into(),
            opts.pix_fmt.clone(),
            "-r".into(),
            format!("{:.6}", opts.fps),
            "-i".into(),
            "-".into(),
            "-an".into(),
            "-vcodec".into(),
            opts.codec.clone(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        if opts.bitrate > 0 {
            args.push("-b:v".into());
            args.push(opts.bitrate.to_string().into());
        }
        args.push(self.path.clone().into_os_string());
        args
    }

    fn encoder_path(&self) -> Result<PathBuf> {
        match &self.options.ffmpeg {
            Some(path) => Ok(path.clone()),
            None => which("ffmpeg").map_err(|_| anyhow!("ffmpeg not found")),
        }
    }

    /// Spawns the encoder and arms the signal guard.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            State::Configured => {}
            State::Running(_) => bail!("video writer already started"),
            State::Closed => bail!("video writer already closed"),
        }

        let ffmpeg_path = self.encoder_path()?;
        let args = self.command_args();

        let child: ChildSlot = Arc::default();
        let guard =
            SignalGuard::install(self.options.exit_on_signal, teardown(Arc::clone(&child)))?;

        let stderr = if self.options.show_encoder_output {
            Stdio::inherit()
        } else {
            Stdio::null()
        };
        // the slot stays locked from spawn until it holds the child, so a
        // signal in between waits and then finds something to kill
        let stdin = {
            let mut slot = lock(&child);
            let process = slot.insert(
                Command::new(&ffmpeg_path)
                    .args(&args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::null())
                    .stderr(stderr)
                    .spawn()
                    .with_context(|| format!("failed to spawn {}", ffmpeg_path.display()))?,
            );
            match process.stdin.take() {
                Some(stdin) => stdin,
                None => {
                    let _ = process.kill();
                    let _ = process.wait();
                    *slot = None;
                    bail!("failed to open ffmpeg stdin");
                }
            }
        };

        log::info!(
            "started {} {}",
            ffmpeg_path.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        self.state = State::Running(Session {
            child,
            pipe: FramePipe::new(stdin, self.frame_size),
            guard,
        });
        Ok(())
    }

    /// Sends one raw frame, blocking until the encoder has taken all of it.
    pub fn write(&mut self, frame: &[u8]) -> Result<()> {
        let session = match &mut self.state {
            State::Running(session) => session,
            State::Configured => bail!("video writer not started"),
            State::Closed => bail!("video writer already closed"),
        };
        session.pipe.send(frame)?;
        self.frames += 1;
        log::debug!("wrote frame {} to {}", self.frames, self.path.display());
        Ok(())
    }

    /// Closes the pipe and waits for the encoder to finish the file.
    ///
    /// A writer that was never started is left as is.
    pub fn close(&mut self) -> Result<()> {
        let session = match std::mem::replace(&mut self.state, State::Closed) {
            State::Running(session) => session,
            other => {
                self.state = other;
                return Ok(());
            }
        };
        let status = session.finish()?;
        if !status.success() {
            bail!("ffmpeg exited with status {}", status);
        }
        log::info!("encoded {} frame(s) to {}", self.frames, self.path.display());
        Ok(())
    }
}

impl Session {
    fn finish(self) -> Result<ExitStatus> {
        let Session {
            child,
            pipe,
            mut guard,
        } = self;

        // dropping stdin is the encoder's end of input
        let flushed = pipe.into_inner().map(drop);
        let status = wait_for_exit(&child);
        guard.cancel();

        flushed.context("failed to flush ffmpeg stdin")?;
        status
    }
}

/// Polls so the lock is free for the signal guard between checks.
fn wait_for_exit(child: &Mutex<Option<Child>>) -> Result<ExitStatus> {
    loop {
        {
            let mut slot = lock(child);
            let process = slot
                .as_mut()
                .ok_or_else(|| anyhow!("ffmpeg process handle missing"))?;
            if let Some(status) = process.try_wait().context("failed to wait for ffmpeg")? {
                return Ok(status);
            }
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn teardown(child: ChildSlot) -> impl FnOnce() + Send + 'static {
    move || {
        if let Some(process) = lock(&child).as_mut() {
            if let Err(e) = process.kill() {
                log::warn!("failed to kill ffmpeg: {}", e);
            }
            let _ = process.wait();
        }
    }
}

impl FrameWriter for VideoWriter {
    fn start(&mut self) -> Result<()> {
        VideoWriter::start(self)
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.write(frame)
    }

    fn close(&mut self) -> Result<()> {
        VideoWriter::close(self)
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close video writer for {}: {:#}", self.path.display(), e);
        }
    }
}
