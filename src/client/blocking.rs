use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Once};
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use super::{sleep_unless_interrupted, IncrementerClient, SumOutcome};
use crate::{log_debug, log_info, log_warn, Result, RpcConfig, TransportBuilder};

/// Exit status of a process stopped by SIGINT (128 + 2).
const SIGINT_EXIT_STATUS: i32 = 130;

/// Blocking calls currently listening for Ctrl+C, process-wide.
static CALLS_IN_PROGRESS: AtomicUsize = AtomicUsize::new(0);

static SIGINT_WATCHER: Once = Once::new();

/// Blocking facade over [`IncrementerClient`].
///
/// Owns a current-thread tokio runtime; every call blocks the calling thread
/// and drives the runtime until the call reaches a terminal state. Must not
/// be used from inside another async runtime.
///
/// [`sum`](Self::sum), [`sum_detailed`](Self::sum_detailed) and
/// [`sleep_unless_interrupted`](Self::sleep_unless_interrupted) listen for
/// Ctrl+C while they run.
pub struct BlockingIncrementerClient {
    runtime: Runtime,
    client: IncrementerClient,
}

impl BlockingIncrementerClient {
    /// Connect to `server_id` over the global memory hub, with
    /// `config.transport_id` as this client's node id.
    pub fn new(server_id: impl Into<String>, config: &RpcConfig) -> Result<Self> {
        let builder = TransportBuilder::new()
            .node_id(config.transport_id.clone())
            .client_mode();
        Self::with_builder(builder, server_id, config)
    }

    /// Connect using a caller-prepared transport builder.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Runtime` if the runtime cannot be created, or any
    /// error from building the transport or the client.
    pub fn with_builder(
        builder: TransportBuilder,
        server_id: impl Into<String>,
        config: &RpcConfig,
    ) -> Result<Self> {
        // ---
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let server_id = server_id.into();

        let client = runtime.block_on(async {
            let transport = builder.build().await?;
            IncrementerClient::with_transport(transport, server_id, config).await
        })?;

        Ok(Self { runtime, client })
    }

    /// The async client this facade drives.
    pub fn client(&self) -> &IncrementerClient {
        &self.client
    }

    /// Run a future on the owned runtime.
    ///
    /// Tasks spawned here (a co-located server, for instance) make progress
    /// whenever the facade is blocked in a call.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Compute `a + b`, cancelling on Ctrl+C.
    ///
    /// Ctrl+C cancels the call only while it runs. Outside Ctrl+C-aware
    /// calls the process still stops on Ctrl+C, with exit status 130.
    pub fn sum(&self, a: i64, b: i64, interruptible: bool) -> Result<i64> {
        self.sum_detailed(a, b, interruptible)
            .map(|outcome| outcome.result)
    }

    /// Like [`sum`](Self::sum), but also reports whether a cancellation was
    /// sent for a call that still completed.
    pub fn sum_detailed(&self, a: i64, b: i64, interruptible: bool) -> Result<SumOutcome> {
        let _scope = InterruptScope::enter();
        self.runtime
            .block_on(self.client.sum_detailed(a, b, interruptible, ctrl_c()))
    }

    /// Compute `a + b`, cancelling when `interrupt` completes.
    pub fn sum_until<F>(&self, a: i64, b: i64, interruptible: bool, interrupt: F) -> Result<i64>
    where
        F: Future<Output = ()>,
    {
        self.runtime
            .block_on(self.client.sum_until(a, b, interruptible, interrupt))
    }

    /// Sleep for `duration`; Ctrl+C ends the sleep with `RpcError::Interrupted`.
    pub fn sleep_unless_interrupted(&self, duration: Duration) -> Result<()> {
        let _scope = InterruptScope::enter();
        self.runtime
            .block_on(sleep_unless_interrupted(duration, ctrl_c()))
    }

    /// Number of blocking calls, across all clients in the process, that
    /// currently turn Ctrl+C into a cancellation.
    pub fn calls_in_progress() -> usize {
        CALLS_IN_PROGRESS.load(Ordering::SeqCst)
    }
}

/// Marks a Ctrl+C-aware call as running.
///
/// tokio keeps its SIGINT handler installed once any listener has existed, so
/// the first scope also starts a watcher thread. The watcher exits the
/// process on Ctrl+C whenever no scope is open.
struct InterruptScope;

impl InterruptScope {
    fn enter() -> Self {
        SIGINT_WATCHER.call_once(spawn_sigint_watcher);
        CALLS_IN_PROGRESS.fetch_add(1, Ordering::SeqCst);
        Self
    }
}

impl Drop for InterruptScope {
    fn drop(&mut self) {
        CALLS_IN_PROGRESS.fetch_sub(1, Ordering::SeqCst);
    }
}

fn spawn_sigint_watcher() {
    // ---
    let (ready_tx, ready_rx) = mpsc::channel();

    let spawned = std::thread::Builder::new()
        .name("sigint-watcher".into())
        .spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(_err) => {
                    log_warn!("cannot start Ctrl+C watcher: {_err}");
                    return;
                }
            };
            if let Err(_err) = runtime.block_on(watch_sigint(ready_tx)) {
                log_warn!("cannot watch for Ctrl+C: {_err}");
            }
        });

    match spawned {
        // An error only means the watcher gave up before registering.
        Ok(_) => {
            let _ = ready_rx.recv();
        }
        Err(_err) => log_warn!("cannot spawn Ctrl+C watcher: {_err}"),
    }
}

#[cfg(unix)]
async fn watch_sigint(ready: mpsc::Sender<()>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let _ = ready.send(());
    while sigint.recv().await.is_some() {
        exit_if_idle();
    }
    Ok(())
}

#[cfg(windows)]
async fn watch_sigint(ready: mpsc::Sender<()>) -> std::io::Result<()> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
    let _ = ready.send(());
    while ctrl_c.recv().await.is_some() {
        exit_if_idle();
    }
    Ok(())
}

fn exit_if_idle() {
    if CALLS_IN_PROGRESS.load(Ordering::SeqCst) == 0 {
        log_info!("Ctrl+C outside a call, exiting");
        std::process::exit(SIGINT_EXIT_STATUS);
    }
}

/// Resolves on Ctrl+C. If the listener cannot be installed it never resolves.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log_debug!("Ctrl+C received"),
        Err(_err) => {
            log_warn!("cannot listen for Ctrl+C: {_err}");
            std::future::pending::<()>().await;
        }
    }
}
