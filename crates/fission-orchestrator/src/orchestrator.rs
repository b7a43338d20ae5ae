use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

use fission_common::protocol::{Direction, FissionError, Packet, Result};

use crate::pool::{PoolPolicy, WorkerPool};
use crate::worker::Worker;

/// Hop id the orchestrator stamps onto packets passing through it.
pub const ORCHESTRATOR_ID: &str = "orchestrator";

/// File descriptor slot where a spawned worker finds its duplex socket.
const WORKER_FD_SLOT: i32 = 3;

/// The parent of the worker fleet. See the crate docs for an overview.
pub struct Orchestrator {
    /// Pools keyed by fully qualified method address.
    pools: RwLock<HashMap<String, Arc<WorkerPool>>>,
    /// In-flight requests awaiting a response, keyed by packet id. Each
    /// slot is removed exactly once, by the first of completion, timeout,
    /// or send failure.
    response_slots: std::sync::Mutex<HashMap<String, oneshot::Sender<Packet>>>,
}

impl Orchestrator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pools: RwLock::new(HashMap::new()),
            response_slots: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Spawns `count` worker subprocesses for `target`.
    ///
    /// Each worker gets its own connected socketpair; the child's end is
    /// placed at the well-known descriptor slot and the worker is started
    /// as `binary_path --id "{target}-{uuid4[..4]}"`. Workers register in
    /// the pool for `target`, which is created with the default policy when
    /// absent.
    pub async fn spawn(self: &Arc<Self>, target: &str, binary_path: &str, count: usize) -> Result<()> {
        for _ in 0..count {
            let (orch_end, worker_end) = socketpair(
                AddressFamily::Unix,
                SockType::Stream,
                None,
                SockFlag::SOCK_CLOEXEC,
            )
            .map_err(|e| FissionError::Transport(format!("socketpair failed: {e}")))?;

            let suffix = uuid::Uuid::new_v4().to_string();
            let id = format!("{target}-{}", &suffix[..4]);

            let mut command = tokio::process::Command::new(binary_path);
            command.arg("--id").arg(&id);
            let raw = worker_end.as_raw_fd();
            // Runs between fork and exec: move the child's socket end into
            // the well-known slot. dup2 clears close-on-exec on the copy.
            unsafe {
                command.pre_exec(move || {
                    if raw == WORKER_FD_SLOT {
                        let flags = libc::fcntl(raw, libc::F_GETFD);
                        if flags < 0
                            || libc::fcntl(raw, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0
                        {
                            return Err(std::io::Error::last_os_error());
                        }
                    } else if libc::dup2(raw, WORKER_FD_SLOT) < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }

            let child = command.spawn()?;
            // Close the parent's copy of the child's end.
            drop(worker_end);

            let stream = std::os::unix::net::UnixStream::from(orch_end);
            stream.set_nonblocking(true)?;
            let stream = tokio::net::UnixStream::from_std(stream)?;

            info!(worker_id = %id, target, pid = child.id(), "worker spawned");

            let (worker, mailbox) = Worker::start(
                id,
                target.to_string(),
                binary_path.to_string(),
                stream,
                Some(child),
            );
            self.register(target, worker, mailbox).await;
        }
        Ok(())
    }

    /// Registers an already-connected worker endpoint for `target`.
    ///
    /// The surface for workers that live in this process (or in a process
    /// someone else spawned): no subprocess is created, the stream is the
    /// worker's duplex channel.
    pub async fn attach_worker(self: &Arc<Self>, target: &str, stream: tokio::net::UnixStream, id: &str) {
        let (worker, mailbox) = Worker::start(
            id.to_string(),
            target.to_string(),
            String::new(),
            stream,
            None,
        );
        info!(worker_id = %id, target, "worker attached");
        self.register(target, worker, mailbox).await;
    }

    /// Creates or updates the dispatch policy of the pool for `target`.
    pub async fn set_pool_policy(&self, target: &str, timeout: Duration, retries: u32) {
        let mut pools = self.pools.write().await;
        let pool = pools
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(WorkerPool::new(PoolPolicy::default())));
        pool.set_policy(PoolPolicy { timeout, retries });
    }

    pub async fn worker_count(&self, target: &str) -> usize {
        match self.pools.read().await.get(target) {
            Some(pool) => pool.worker_count(),
            None => 0,
        }
    }

    async fn register(
        self: &Arc<Self>,
        target: &str,
        worker: Arc<Worker>,
        mailbox: mpsc::Receiver<Packet>,
    ) {
        {
            let mut pools = self.pools.write().await;
            let pool = pools
                .entry(target.to_string())
                .or_insert_with(|| Arc::new(WorkerPool::new(PoolPolicy::default())));
            pool.add_worker(worker.clone());
        }

        let orch = self.clone();
        tokio::spawn(async move {
            orch.consume_mailbox(worker, mailbox).await;
        });
    }

    /// Drains one worker's mailbox, dispatching by packet direction:
    /// requests a worker originates go to their target pool, responses
    /// complete the matching in-flight slot.
    async fn consume_mailbox(self: Arc<Self>, worker: Arc<Worker>, mut mailbox: mpsc::Receiver<Packet>) {
        while let Some(packet) = mailbox.recv().await {
            match packet.direction {
                Direction::Request => {
                    let orch = self.clone();
                    let requester = worker.clone();
                    tokio::spawn(async move {
                        orch.dispatch_internal(requester, packet).await;
                    });
                }
                Direction::Response => self.correlate_response(packet),
            }
        }
    }

    /// Routes an externally originated request and returns the correlated
    /// response.
    ///
    /// Fails immediately when no pool exists for the target; otherwise runs
    /// the pool's retry budget and reports the last error when every
    /// attempt fails.
    pub async fn route_request(self: &Arc<Self>, mut packet: Packet) -> Result<Packet> {
        // The orchestrator is the first node to receive an external packet.
        packet.context.add_hop(ORCHESTRATOR_ID);

        debug!(packet_id = %packet.id, target = %packet.target, "routing request");
        let pool = self.lookup_pool(&packet.target).await?;
        self.dispatch(&pool, &packet).await
    }

    /// Worker-to-worker hop: dispatch a request a worker originated, then
    /// forward the response frame back to the original requester.
    async fn dispatch_internal(self: Arc<Self>, requester: Arc<Worker>, packet: Packet) {
        let pool = match self.lookup_pool(&packet.target).await {
            Ok(pool) => pool,
            Err(e) => {
                error!(packet_id = %packet.id, "cannot dispatch internal request: {e}");
                return;
            }
        };

        match self.dispatch(&pool, &packet).await {
            Ok(response) => {
                if let Err(e) = requester.send_packet(&response).await {
                    error!(worker_id = %requester.id(), "failed to forward response: {e}");
                }
            }
            Err(e) => {
                error!(packet_id = %packet.id, "internal dispatch failed: {e}");
            }
        }
    }

    async fn lookup_pool(&self, target: &str) -> Result<Arc<WorkerPool>> {
        self.pools
            .read()
            .await
            .get(target)
            .cloned()
            .ok_or_else(|| FissionError::UnknownTarget(target.to_string()))
    }

    /// One retry loop: select a worker, install the response slot, send,
    /// and wait out the pool timeout. The slot is removed on every exit
    /// path of every attempt.
    async fn dispatch(&self, pool: &WorkerPool, packet: &Packet) -> Result<Packet> {
        let policy = pool.policy();
        let attempts = policy.retries + 1;
        let mut last_err: Option<FissionError> = None;

        for attempt in 0..attempts {
            let Some(worker) = pool.select_worker() else {
                last_err = Some(FissionError::NoWorkers(packet.target.clone()));
                continue;
            };

            let (tx, rx) = oneshot::channel();
            self.response_slots
                .lock()
                .unwrap()
                .insert(packet.id.clone(), tx);

            if let Err(e) = worker.send_packet(packet).await {
                self.response_slots.lock().unwrap().remove(&packet.id);
                warn!(worker_id = %worker.id(), attempt, "send failed: {e}");
                last_err = Some(e);
                continue;
            }

            match tokio::time::timeout(policy.timeout, rx).await {
                Ok(Ok(response)) => {
                    self.response_slots.lock().unwrap().remove(&packet.id);
                    return Ok(response);
                }
                Ok(Err(_)) => {
                    self.response_slots.lock().unwrap().remove(&packet.id);
                    last_err = Some(FissionError::Transport("response slot closed".into()));
                }
                Err(_) => {
                    self.response_slots.lock().unwrap().remove(&packet.id);
                    warn!(
                        packet_id = %packet.id,
                        worker_id = %worker.id(),
                        attempt,
                        "attempt timed out after {:?}",
                        policy.timeout
                    );
                    last_err = Some(FissionError::Timeout(policy.timeout));
                }
            }
        }

        Err(FissionError::Exhausted {
            attempts,
            last: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".into()),
        })
    }

    /// Completes the in-flight slot matching a response read from a worker.
    fn correlate_response(&self, packet: Packet) {
        let waiter = self.response_slots.lock().unwrap().remove(&packet.id);
        match waiter {
            Some(tx) => {
                if let Err(packet) = tx.send(packet) {
                    warn!(packet_id = %packet.id, "dropping response, waiter already gone");
                }
            }
            None => {
                warn!(packet_id = %packet.id, "no response slot for packet, dropping");
            }
        }
    }
}
