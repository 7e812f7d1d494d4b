//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// A per-test directory under the system temp dir, removed on drop.
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    pub fn new(tag: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("vidio_{}_{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Writes an executable shell script standing in for ffmpeg. The script
    /// receives the usual encoder arguments, output path last.
    #[cfg(unix)]
    pub fn stub_encoder(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Copies stdin to `<output>.part`, then renames it to the output path a
/// little later, so the file only appears once the stub has finished.
pub const CAPTURE_STUB: &str = r#"for last; do :; done
cat > "$last.part"
sleep 0.2
mv "$last.part" "$last""#;

/// Exits without reading any input.
pub const EARLY_EXIT_STUB: &str = "exit 3";

/// Ignores its input and never finishes on its own.
pub const HANG_STUB: &str = "exec sleep 30";

/// Sends `signal` (e.g. "TERM") to `pid` with the system `kill` command.
#[cfg(unix)]
pub fn send_signal(signal: &str, pid: u32) {
    let status = std::process::Command::new("kill")
        .arg(format!("-{}", signal))
        .arg(pid.to_string())
        .status()
        .unwrap();
    assert!(status.success(), "kill -{} {} failed", signal, pid);
}

/// Whether `pid` still names a live process.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn frame(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[shade, (x % 256) as u8, (y % 256) as u8]);
        }
    }
    data
}

/// Starts `writer`, retrying while a freshly written stub script is still
/// busy (ETXTBSY) because a parallel test forked with it open.
pub fn start_writer(writer: &mut vidio::VideoWriter) {
    const ETXTBSY: i32 = 26;
    for _ in 0..40 {
        match writer.start() {
            Ok(()) => return,
            Err(e)
                if e.chain().any(|cause| {
                    cause
                        .downcast_ref::<std::io::Error>()
                        .and_then(std::io::Error::raw_os_error)
                        == Some(ETXTBSY)
                }) =>
            {
                std::thread::sleep(std::time::Duration::from_millis(25));
            }
            Err(e) => panic!("failed to start writer: {:#}", e),
        }
    }
    panic!("stub encoder stayed busy");
}
