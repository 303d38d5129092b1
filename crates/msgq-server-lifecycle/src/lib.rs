//! Process-wide graceful shutdown coordination.
//!
//! An [`Activity`] guard is held by any task that should delay shutdown
//! until it completes. [`ShutdownSubscription`] lets a long-running loop
//! notice that shutdown has begun. [`LifeCycle`] owns the process-wide
//! signal handling and drives the shutdown sequence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc::{channel, Receiver as MPSCReceiver, Sender as MPSCSender};
use tokio::sync::watch::{channel as watch_channel, Receiver as WatchReceiver, Sender as WatchSender};
use uuid::Uuid;

static ACTIVE: OnceLock<Mutex<Option<Activity>>> = OnceLock::new();
static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);
static STOPPING: OnceLock<ShutdownState> = OnceLock::new();

fn active_labels() -> &'static Mutex<HashMap<Uuid, String>> {
    static LABELS: OnceLock<Mutex<HashMap<Uuid, String>>> = OnceLock::new();
    LABELS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A guard that represents outstanding work the process should wait for
/// before exiting. Dropping the last clone releases the root hold.
pub struct Activity {
    tx: MPSCSender<()>,
    uuid: Uuid,
}

impl Activity {
    /// Registers a new unit of activity under `label`. Returns `None` if
    /// the process has already begun shutting down.
    pub fn get_opt<S: Into<String>>(label: S) -> Option<Self> {
        if is_shutting_down() {
            return None;
        }
        let lc = STOPPING.get()?;
        let uuid = Uuid::new_v4();
        active_labels().lock().unwrap().insert(uuid, label.into());
        Some(Self {
            tx: lc.activity_tx.clone(),
            uuid,
        })
    }

    pub fn get<S: Into<String>>(label: S) -> anyhow::Result<Self> {
        Self::get_opt(label).ok_or_else(|| anyhow::anyhow!("shutting down"))
    }

    pub fn is_shutting_down() -> bool {
        is_shutting_down()
    }

    /// Re-labels this activity, producing an independent clone that keeps
    /// the process alive for as long as either is held.
    pub fn rebind<S: Into<String>>(&self, label: S) -> Self {
        let uuid = Uuid::new_v4();
        active_labels().lock().unwrap().insert(uuid, label.into());
        Self {
            tx: self.tx.clone(),
            uuid,
        }
    }
}

impl Drop for Activity {
    fn drop(&mut self) {
        active_labels().lock().unwrap().remove(&self.uuid);
        // Closing a clone of the sender is itself the signal; LifeCycle
        // observes channel closure via recv() returning None once every
        // Activity has dropped.
        let _ = self.tx.try_send(());
    }
}

pub fn is_shutting_down() -> bool {
    SHUTTING_DOWN.load(Ordering::Relaxed)
}

struct ShutdownState {
    tx: WatchSender<()>,
    rx: WatchReceiver<()>,
    request_shutdown_tx: MPSCSender<()>,
    stop_requested: AtomicBool,
    activity_tx: MPSCSender<()>,
}

/// Lets a loop `select!` on shutdown without holding an `Activity`.
#[derive(Clone)]
pub struct ShutdownSubscription {
    rx: WatchReceiver<()>,
}

impl ShutdownSubscription {
    pub fn get() -> Self {
        let rx = STOPPING
            .get()
            .expect("LifeCycle::new must run before ShutdownSubscription::get")
            .rx
            .clone();
        Self { rx }
    }

    pub async fn shutting_down(&mut self) {
        let _ = self.rx.changed().await;
    }
}

/// Owns the process-wide signal handling. Constructed once at startup.
pub struct LifeCycle {
    activity_rx: MPSCReceiver<()>,
    request_shutdown_rx: MPSCReceiver<()>,
}

impl LifeCycle {
    pub fn new() -> Self {
        let (tx, rx) = watch_channel(());
        let (request_shutdown_tx, request_shutdown_rx) = channel(4);
        let (activity_tx, activity_rx) = channel(128);

        STOPPING
            .set(ShutdownState {
                tx,
                rx,
                request_shutdown_tx,
                stop_requested: AtomicBool::new(false),
                activity_tx: activity_tx.clone(),
            })
            .unwrap_or_else(|_| panic!("LifeCycle::new called more than once"));

        ACTIVE
            .set(Mutex::new(Some(Activity {
                tx: activity_tx,
                uuid: Uuid::new_v4(),
            })))
            .unwrap_or_else(|_| panic!("LifeCycle::new called more than once"));

        Self {
            activity_rx,
            request_shutdown_rx,
        }
    }

    /// Requests shutdown from anywhere in the process (e.g. an admin
    /// endpoint, or a fatal internal error).
    pub async fn request_shutdown() {
        if let Some(state) = STOPPING.get() {
            if state
                .stop_requested
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let _ = state.request_shutdown_tx.send(()).await;
            }
        }
    }

    /// Blocks until a termination signal (or an explicit
    /// [`LifeCycle::request_shutdown`]) arrives, then drains outstanding
    /// [`Activity`] holders before returning.
    pub async fn wait_for_shutdown(&mut self) {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        let mut sigquit = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::quit())
            .expect("failed to install SIGQUIT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
            _ = sigquit.recv() => {
                tracing::info!("received SIGQUIT, shutting down");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = self.request_shutdown_rx.recv() => {
                tracing::info!("shutdown requested programmatically");
            }
        }

        SHUTTING_DOWN.store(true, Ordering::Relaxed);
        // Drop the root activity; this unblocks anyone only waiting on the
        // process never shutting down, and lets the drain loop below
        // converge once every other holder also drops theirs.
        ACTIVE.get().unwrap().lock().unwrap().take();
        let _ = STOPPING.get().unwrap().tx.send(());

        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    let remaining = active_labels().lock().unwrap();
                    if !remaining.is_empty() {
                        tracing::info!(
                            "still waiting on {} active task(s): {:?}",
                            remaining.len(),
                            remaining.values().collect::<Vec<_>>()
                        );
                    }
                }
                msg = self.activity_rx.recv() => {
                    if msg.is_none() {
                        return;
                    }
                    if active_labels().lock().unwrap().is_empty() {
                        return;
                    }
                }
            }
        }
    }
}

impl Default for LifeCycle {
    fn default() -> Self {
        Self::new()
    }
}
