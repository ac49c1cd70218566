//! Start/stop control and the fault-tolerant accept loop.
//!
//! Each `start()` creates a new worker generation identified by a token
//! compared by pointer, never by value. Every generation checks under the
//! lifecycle lock that its token is still the current one before acting, so
//! a loop from before a `stop()`/`start()` cycle exits quietly instead of
//! competing with its successor.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_rustls::TlsAcceptor;

use crate::acceptor::Acceptor;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::monitor::Monitor;
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    /// A worker exists but has no listening socket yet (binding or backing off).
    Starting,
    Running,
    /// No worker is current; superseded loops are still unwinding.
    Stopping,
}

#[derive(Debug)]
struct WorkerToken {
    id: u64,
}

struct Worker {
    token: Arc<WorkerToken>,
    shutdown: watch::Sender<bool>,
}

struct Lifecycle {
    worker: Option<Worker>,
    state: ServerState,
    state_tx: watch::Sender<ServerState>,
    local_addr: Option<SocketAddr>,
    draining: usize,
    next_id: u64,
}

impl Lifecycle {
    fn is_current(&self, token: &Arc<WorkerToken>) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| Arc::ptr_eq(&worker.token, token))
    }

    fn set_state(&mut self, state: ServerState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

struct Shared {
    lifecycle: Mutex<Lifecycle>,
    /// Held by whichever generation currently owns a listening socket.
    listener_slot: AsyncMutex<()>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A worker generation's view of the lifecycle.
#[derive(Clone)]
pub struct WorkerClaim {
    token: Arc<WorkerToken>,
    shared: Arc<Shared>,
}

impl WorkerClaim {
    pub fn id(&self) -> u64 {
        self.token.id
    }

    /// Whether this generation is still the authoritative loop.
    pub fn is_authoritative(&self) -> bool {
        self.shared.lock().is_current(&self.token)
    }

    fn mark_running(&self, addr: SocketAddr) -> bool {
        let mut lifecycle = self.shared.lock();
        if !lifecycle.is_current(&self.token) {
            return false;
        }
        lifecycle.local_addr = Some(addr);
        lifecycle.set_state(ServerState::Running);
        true
    }

    fn mark_backing_off(&self) {
        let mut lifecycle = self.shared.lock();
        if lifecycle.is_current(&self.token) {
            lifecycle.local_addr = None;
            lifecycle.set_state(ServerState::Starting);
        }
    }

    fn retire(&self) {
        let mut lifecycle = self.shared.lock();
        if lifecycle.is_current(&self.token) {
            // Only reachable when the loop dies without being stopped.
            lifecycle.worker = None;
            lifecycle.local_addr = None;
            lifecycle.set_state(ServerState::Stopped);
            return;
        }

        lifecycle.draining = lifecycle.draining.saturating_sub(1);
        if lifecycle.worker.is_none() && lifecycle.draining == 0 {
            lifecycle.set_state(ServerState::Stopped);
        }
    }
}

/// Returns the lifecycle to a consistent state however the loop ends,
/// including unwinding from a panic.
struct LoopGuard {
    claim: WorkerClaim,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::error!("Mobile server worker {} terminated abnormally", self.claim.id());
        } else {
            log::info!("Mobile server worker {} stopped", self.claim.id());
        }
        self.claim.retire();
    }
}

struct LoopSettings {
    config: ServerConfig,
    tls: TlsAcceptor,
    context: Arc<SessionContext>,
}

/// The mobile status server.
///
/// `start()` and `stop()` never block and may be called from any thread;
/// the accept loop runs on the runtime passed to [`MobileServer::new`].
pub struct MobileServer {
    settings: Arc<LoopSettings>,
    shared: Arc<Shared>,
    runtime: Handle,
}

impl MobileServer {
    pub fn new(
        config: ServerConfig,
        monitor: Arc<dyn Monitor>,
        tls: TlsAcceptor,
        runtime: Handle,
    ) -> Self {
        let context = Arc::new(SessionContext::new(monitor, config.session.locale.clone()));
        let (state_tx, _) = watch::channel(ServerState::Stopped);

        Self {
            settings: Arc::new(LoopSettings {
                config,
                tls,
                context,
            }),
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle {
                    worker: None,
                    state: ServerState::Stopped,
                    state_tx,
                    local_addr: None,
                    draining: 0,
                    next_id: 0,
                }),
                listener_slot: AsyncMutex::new(()),
            }),
            runtime,
        }
    }

    /// Starts a new accept loop unless one is already current.
    ///
    /// Returns `false` when nothing changed.
    pub fn start(&self) -> bool {
        let mut lifecycle = self.shared.lock();
        if lifecycle.worker.is_some() {
            return false;
        }

        lifecycle.next_id += 1;
        let token = Arc::new(WorkerToken {
            id: lifecycle.next_id,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        lifecycle.worker = Some(Worker {
            token: token.clone(),
            shutdown: shutdown_tx,
        });
        lifecycle.local_addr = None;
        lifecycle.set_state(ServerState::Starting);

        let claim = WorkerClaim {
            token,
            shared: self.shared.clone(),
        };
        self.runtime
            .spawn(run_loop(claim, shutdown_rx, self.settings.clone()));
        true
    }

    /// Signals the current loop to stop without waiting for it.
    ///
    /// In-flight sessions are not cancelled. Returns `false` when no loop
    /// was current.
    pub fn stop(&self) -> bool {
        let mut lifecycle = self.shared.lock();
        let Some(worker) = lifecycle.worker.take() else {
            return false;
        };

        worker.shutdown.send_replace(true);
        lifecycle.draining += 1;
        lifecycle.local_addr = None;
        lifecycle.set_state(ServerState::Stopping);
        log::info!("Stopping mobile server worker {}", worker.token.id);
        true
    }

    pub fn state(&self) -> ServerState {
        self.shared.lock().state
    }

    /// Address of the current listener while [`ServerState::Running`].
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.lock().local_addr
    }

    /// Watches lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.shared.lock().state_tx.subscribe()
    }
}

impl Drop for MobileServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    claim: WorkerClaim,
    mut shutdown: watch::Receiver<bool>,
    settings: Arc<LoopSettings>,
) {
    let _guard = LoopGuard {
        claim: claim.clone(),
    };
    let retry_delay = settings.config.retry_delay();
    log::info!("Mobile server worker {} started", claim.id());

    while claim.is_authoritative() {
        match serve_once(&claim, &mut shutdown, &settings).await {
            Ok(()) => break,
            Err(err) => {
                claim.mark_backing_off();
                log::error!(
                    "Mobile listener failed: {}. Retrying in {}s",
                    err,
                    retry_delay.as_secs_f32()
                );
                if !back_off(&mut shutdown, retry_delay).await {
                    break;
                }
            }
        }
    }
}

/// Binds one listening socket and accepts on it until stopped or failed.
async fn serve_once(
    claim: &WorkerClaim,
    shutdown: &mut watch::Receiver<bool>,
    settings: &LoopSettings,
) -> Result<()> {
    // A superseded generation may still be releasing the port.
    let _slot = tokio::select! {
        slot = claim.shared.listener_slot.lock() => slot,
        _ = shutdown.wait_for(|stop| *stop) => return Ok(()),
    };
    if !claim.is_authoritative() {
        return Ok(());
    }

    let acceptor = Acceptor::bind(
        &settings.config.listener,
        settings.tls.clone(),
        settings.context.clone(),
    )
    .await?;
    let addr = acceptor.local_addr()?;
    if !claim.mark_running(addr) {
        return Ok(());
    }
    log::info!("Mobile server listening on {}", addr);

    acceptor.run(claim, shutdown).await
}

/// Sleeps for `delay`; returns `false` if a stop request cut it short.
async fn back_off(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.wait_for(|stop| *stop) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
