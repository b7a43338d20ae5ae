use std::sync::Arc;

use tokio::net::unix::OwnedReadHalf;
use tokio::net::UnixStream;
use tokio::process::Child;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use fission_common::protocol::{Packet, Result};
use fission_common::transport::{read_frame, write_frame_locked};

use crate::orchestrator::ORCHESTRATOR_ID;

/// Capacity of each worker's mailbox into the orchestrator.
const MAILBOX_CAPACITY: usize = 100;

/// One live worker endpoint: the orchestrator's side of a worker connection.
///
/// A worker is usually backed by a spawned subprocess, but may also be an
/// endpoint attached over an existing stream (in-process workers, tests), in
/// which case there is no child handle.
///
/// The worker's lifecycle ends when its connection closes: the reader loop
/// exits and the mailbox closes with it.
pub struct Worker {
    id: String,
    target: String,
    binary_path: String,
    /// Write side of the connection, serialized so concurrent frame writes
    /// cannot interleave.
    writer: Mutex<tokio::net::unix::OwnedWriteHalf>,
    child: std::sync::Mutex<Option<Child>>,
}

impl Worker {
    /// Wraps a connected stream as a worker and starts its reader loop.
    ///
    /// Returns the worker together with the receiving end of its mailbox;
    /// the caller owns mailbox consumption.
    pub(crate) fn start(
        id: String,
        target: String,
        binary_path: String,
        stream: UnixStream,
        child: Option<Child>,
    ) -> (Arc<Self>, mpsc::Receiver<Packet>) {
        let (read_half, write_half) = stream.into_split();
        let worker = Arc::new(Self {
            id,
            target,
            binary_path,
            writer: Mutex::new(write_half),
            child: std::sync::Mutex::new(child),
        });

        let (mailbox_tx, mailbox_rx) = mpsc::channel(MAILBOX_CAPACITY);
        worker.clone().listen(read_half, mailbox_tx);
        (worker, mailbox_rx)
    }

    /// Reader loop: every frame the worker sends gets the orchestrator hop
    /// appended and lands in the mailbox. Ends on connection close.
    fn listen(self: Arc<Self>, mut reader: OwnedReadHalf, mailbox: mpsc::Sender<Packet>) {
        tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(mut packet)) => {
                        packet.context.add_hop(ORCHESTRATOR_ID);
                        if mailbox.send(packet).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(worker_id = %self.id, "error reading from worker: {e}");
                        break;
                    }
                }
            }
            info!(worker_id = %self.id, "worker connection closed");
        });
    }

    pub(crate) async fn send_packet(&self, packet: &Packet) -> Result<()> {
        write_frame_locked(&self.writer, packet).await
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    /// Pid of the backing subprocess, when there is one.
    pub fn pid(&self) -> Option<u32> {
        self.child.lock().unwrap().as_ref().and_then(|c| c.id())
    }
}
