//! SIGINT/SIGTERM handling. Signals are delivered to the whole test process,
//! so these live in their own binary. Tests that expect the process to exit
//! re-run this binary filtered to themselves and check the child's status.
#![cfg(unix)]

use std::{
    process::{Command, Output},
    thread,
    time::Duration,
};

use vidio::{SignalGuard, VideoOptions, VideoWriter};

mod common;
use common::{is_alive, send_signal, start_writer, Scratch, HANG_STUB};

const CHILD_ENV: &str = "VIDIO_SIGNAL_CHILD";
const STUB_ENV: &str = "VIDIO_SIGNAL_STUB";
const PID_PREFIX: &str = "encoder pid ";

fn in_child(name: &str) -> bool {
    std::env::var(CHILD_ENV).as_deref() == Ok(name)
}

fn rerun(name: &str, configure: impl FnOnce(&mut Command)) -> Output {
    let mut cmd = Command::new(std::env::current_exe().unwrap());
    cmd.args([name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, name);
    configure(&mut cmd);
    cmd.output().unwrap()
}

/// Signals the current process and waits for the listener to act on it.
fn signal_self_and_wait(signal: &str) -> ! {
    send_signal(signal, std::process::id());
    thread::sleep(Duration::from_secs(5));
    eprintln!("SIG{} did not end the process", signal);
    std::process::exit(0);
}

#[test]
fn sigterm_kills_encoder_without_exiting() {
    let scratch = Scratch::new("sigterm_kills_encoder_without_exiting");
    let stub = scratch.stub_encoder("hang.sh", HANG_STUB);
    let mut opts = VideoOptions::new(4, 4);
    opts.ffmpeg = Some(stub);
    opts.exit_on_signal = false;

    let mut writer = VideoWriter::new(scratch.path("hang.raw"), opts).unwrap();
    start_writer(&mut writer);
    writer.write(&[0u8; 48]).unwrap();
    let pid = writer.encoder_pid().unwrap();

    send_signal("TERM", std::process::id());
    // close would otherwise wait on the stub for 30 seconds
    let err = writer.close().unwrap_err();
    assert!(err.to_string().contains("exited with status"), "{:#}", err);
    assert!(!is_alive(pid));
}

#[test]
fn signal_after_close_terminates_process() {
    const NAME: &str = "signal_after_close_terminates_process";
    if in_child(NAME) {
        let mut guard = SignalGuard::install(true, || {}).unwrap();
        guard.cancel();
        assert!(!guard.is_active());
        signal_self_and_wait("INT");
    }

    let output = rerun(NAME, |_| {});
    assert_eq!(
        output.status.code(),
        Some(130),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn signal_while_encoding_kills_encoder_and_exits() {
    const NAME: &str = "signal_while_encoding_kills_encoder_and_exits";
    if in_child(NAME) {
        let stub = std::env::var_os(STUB_ENV).unwrap();
        let mut opts = VideoOptions::new(4, 4);
        opts.ffmpeg = Some(stub.into());
        let mut writer = VideoWriter::new("/dev/null", opts).unwrap();
        start_writer(&mut writer);
        println!("{}{}", PID_PREFIX, writer.encoder_pid().unwrap());
        signal_self_and_wait("INT");
    }

    // the script lives with the parent so it is cleaned up despite the
    // child exiting without unwinding
    let scratch = Scratch::new(NAME);
    let stub = scratch.stub_encoder("hang.sh", HANG_STUB);
    let output = rerun(NAME, |cmd| {
        cmd.env(STUB_ENV, &stub);
    });
    assert_eq!(
        output.status.code(),
        Some(1),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let pid: u32 = stdout
        .lines()
        .find_map(|line| line.strip_prefix(PID_PREFIX))
        .expect("child did not report the encoder pid")
        .trim()
        .parse()
        .unwrap();
    assert!(!is_alive(pid));
}
