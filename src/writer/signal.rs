use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;

type Teardown = Box<dyn FnOnce() + Send>;

struct Armed {
    on_signal: Teardown,
    exit_on_signal: bool,
}

static ARMED: Mutex<BTreeMap<u64, Armed>> = Mutex::new(BTreeMap::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(0);
static LISTENER: OnceLock<Result<(), String>> = OnceLock::new();

fn armed() -> MutexGuard<'static, BTreeMap<u64, Armed>> {
    ARMED.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a teardown action if the process receives SIGINT or SIGTERM while
/// the guard is armed.
///
/// One listener thread per process parks in a current-thread runtime and
/// serves every guard. A signal that arrives while no guard is armed ends
/// the process with the conventional `128 + signo` status, so installing a
/// guard never leaves the process deaf to Ctrl+C.
#[derive(Debug)]
pub struct SignalGuard {
    id: Option<u64>,
}

impl SignalGuard {
    /// Arms `on_signal`. When `exit_on_signal` is set the process exits with
    /// status 1 once every armed action has run.
    pub fn install<F>(exit_on_signal: bool, on_signal: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        ensure_listener()?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        armed().insert(
            id,
            Armed {
                on_signal: Box::new(on_signal),
                exit_on_signal,
            },
        );
        Ok(Self { id: Some(id) })
    }

    /// Still waiting for a signal: neither cancelled nor fired.
    pub fn is_active(&self) -> bool {
        self.id.is_some_and(|id| armed().contains_key(&id))
    }

    /// Disarms without running the action. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(id) = self.id.take() {
            armed().remove(&id);
        }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn ensure_listener() -> Result<()> {
    LISTENER
        .get_or_init(|| spawn_listener().map_err(|e| format!("{:#}", e)))
        .clone()
        .map_err(|e| anyhow!(e))
}

fn spawn_listener() -> Result<()> {
    let (ready_tx, ready_rx) = mpsc::sync_channel::<io::Result<()>>(1);

    thread::Builder::new()
        .name("vidio-signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            runtime.block_on(async move {
                let mut shutdown = match ShutdownSignal::register() {
                    Ok(shutdown) => shutdown,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                loop {
                    let (name, status) = shutdown.recv().await;
                    dispatch(name, status);
                }
            });
        })
        .context("failed to spawn signal listener")?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow!(e).context("failed to register signal handlers")),
        Err(_) => Err(anyhow!("signal listener exited before registering")),
    }
}

fn dispatch(name: &str, default_status: i32) {
    let fired = std::mem::take(&mut *armed());
    if fired.is_empty() {
        log::warn!("received {} with no encoder running, exiting", name);
        std::process::exit(default_status);
    }

    log::warn!("received {}, stopping {} encoder(s)", name, fired.len());
    let mut exit = false;
    for armed in fired.into_values() {
        exit |= armed.exit_on_signal;
        (armed.on_signal)();
    }
    if exit {
        std::process::exit(1);
    }
}

#[cfg(unix)]
struct ShutdownSignal {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignal {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> (&'static str, i32) {
        tokio::select! {
            _ = self.interrupt.recv() => ("SIGINT", 130),
            _ = self.terminate.recv() => ("SIGTERM", 143),
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignal;

#[cfg(not(unix))]
impl ShutdownSignal {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> (&'static str, i32) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ("ctrl-c", 130),
            Err(_) => std::future::pending().await,
        }
    }
}
