// crates/cip-rs-monitor/src/lib.rs
//! Web-based diagnostic monitor for a `cip-rs` device.
//!
//! The device thread captures [`DiagnosticSnapshot`]s and hands them to a
//! [`SnapshotPublisher`]. The monitor runs on a separate, non-real-time
//! thread inside a tokio runtime and pushes every snapshot to the browsers
//! connected on `/ws`.

pub mod model;
mod server;

pub use model::{ConnectionInfo, DiagnosticCounters, DiagnosticSnapshot, EventRecord};

#[cfg(feature = "in-process")]
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::info;
#[cfg(feature = "in-process")]
use log::warn;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Snapshots buffered for slow WebSocket clients before they start lagging.
const BROADCAST_CAPACITY: usize = 16;

/// The device-side end of the snapshot channel.
///
/// [`SnapshotPublisher::try_publish`] never blocks, so it is safe to call
/// from the thread that drives the device.
#[cfg(feature = "in-process")]
#[derive(Clone, Debug)]
pub struct SnapshotPublisher {
    sender: Sender<DiagnosticSnapshot>,
}

#[cfg(feature = "in-process")]
impl SnapshotPublisher {
    /// Creates a publisher and the receiver to pass to
    /// [`start_in_process_monitor`]. At most `capacity` snapshots are queued.
    pub fn new(capacity: usize) -> (Self, Receiver<DiagnosticSnapshot>) {
        let (sender, receiver) = bounded(capacity);
        (Self { sender }, receiver)
    }

    /// Queues a snapshot. Returns false if it was dropped because the queue
    /// is full or the monitor has stopped.
    pub fn try_publish(&self, snapshot: DiagnosticSnapshot) -> bool {
        match self.sender.try_send(snapshot) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Starts the web monitor in "in-process" mode.
///
/// Snapshots arriving on `receiver` are forwarded to every WebSocket client.
/// Returns when the web server stops.
#[cfg(feature = "in-process")]
pub async fn start_in_process_monitor(
    receiver: Receiver<DiagnosticSnapshot>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (snapshot_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

    // crossbeam receivers block, so the bridge runs on a blocking thread.
    let bridge_tx = snapshot_tx.clone();
    tokio::task::spawn_blocking(move || bridge(receiver, bridge_tx));

    server::start_web_server(addr, snapshot_tx).await?;
    Ok(())
}

#[cfg(feature = "in-process")]
fn bridge(receiver: Receiver<DiagnosticSnapshot>, snapshot_tx: broadcast::Sender<DiagnosticSnapshot>) {
    while let Ok(snapshot) = receiver.recv() {
        // An error only means no client is connected right now.
        let _ = snapshot_tx.send(snapshot);
    }
    warn!("Snapshot channel closed; monitor stops receiving updates.");
}

/// Serves the monitor for snapshots already on a tokio broadcast channel.
pub async fn serve(
    snapshot_tx: broadcast::Sender<DiagnosticSnapshot>,
    addr: SocketAddr,
) -> std::io::Result<()> {
    info!("Starting web monitor on {}", addr);
    server::start_web_server(addr, snapshot_tx).await
}
