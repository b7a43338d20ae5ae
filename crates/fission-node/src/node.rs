use std::collections::HashMap;
use std::future::Future;
use std::os::unix::io::{FromRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use fission_common::protocol::{FissionError, Packet, Result, Status};
use fission_common::transport::{read_frame, write_frame_locked};

use crate::scope::RpcContext;

/// Well-known file descriptor slot where the orchestrator passes the duplex
/// socket to a spawned worker.
pub const WORKER_FD: RawFd = 3;

/// Capacity of the inbound request queue. When the queue is full, new
/// requests are dropped rather than back-pressuring the reader loop.
const INBOUND_QUEUE_CAPACITY: usize = 100;

/// Ceiling on any single outbound call.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The per-worker runtime object.
///
/// Owns the single duplex channel to the orchestrator, reads incoming
/// frames, and multiplexes them by packet id into either an outbound-call
/// waiter or the inbound request queue. See the crate docs for the
/// lifecycle a worker entry point runs through.
pub struct IoNode {
    id: String,
    /// Write side, serialized so header and body of a frame are never
    /// interleaved with another writer's.
    writer: tokio::sync::Mutex<BoxedWriter>,
    /// Read side, taken by the first `listen` call.
    reader: Mutex<Option<BoxedReader>>,
    /// Outbound calls awaiting a response, keyed by packet id. Each entry
    /// is inserted exactly once and removed exactly once, by whichever of
    /// response arrival, timeout, or send failure happens first.
    outstanding: Mutex<HashMap<String, oneshot::Sender<Packet>>>,
    inbound_tx: mpsc::Sender<Packet>,
    /// Inbound queue receiver, taken by the first `handle` call.
    inbound_rx: Mutex<Option<mpsc::Receiver<Packet>>>,
    listening: AtomicBool,
}

impl IoNode {
    fn new(id: impl Into<String>, reader: BoxedReader, writer: BoxedWriter) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        Arc::new(Self {
            id: id.into(),
            writer: tokio::sync::Mutex::new(writer),
            reader: Mutex::new(Some(reader)),
            outstanding: Mutex::new(HashMap::new()),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            listening: AtomicBool::new(false),
        })
    }

    /// Builds the node for this worker process.
    ///
    /// When the inherited descriptor at [`WORKER_FD`] is a usable duplex
    /// socket it becomes both reader and writer; otherwise the process
    /// falls back to stdin/stdout. The orchestrator always passes a socket,
    /// so the stdio path only matters for workers driven by hand.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(id: impl Into<String>) -> Arc<Self> {
        match inherited_socket() {
            Some(stream) => {
                info!(fd = WORKER_FD, "duplex socket detected");
                Self::from_stream(id, stream)
            }
            None => {
                info!("no inherited socket, falling back to stdio");
                Self::new(
                    id,
                    Box::new(tokio::io::stdin()),
                    Box::new(tokio::io::stdout()),
                )
            }
        }
    }

    /// Builds a node over an explicit duplex stream. This is the surface
    /// for in-process workers and tests.
    pub fn from_stream(id: impl Into<String>, stream: tokio::net::UnixStream) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();
        Self::new(id, Box::new(read_half), Box::new(write_half))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Starts the reader loop. Idempotent: calls after the first are no-ops.
    ///
    /// The loop reads frames until end of stream, appends this node's id to
    /// each inbound packet's hop trail, and routes by packet id.
    pub fn listen(self: &Arc<Self>) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(mut reader) = self.reader.lock().unwrap().take() else {
            return;
        };

        let node = self.clone();
        tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(mut packet)) => {
                        packet.context.add_hop(&node.id);
                        node.route_packet(packet);
                    }
                    Ok(None) => {
                        debug!(node_id = %node.id, "stream ended");
                        return;
                    }
                    Err(e) => {
                        error!(node_id = %node.id, "stream corrupted: {e}");
                        return;
                    }
                }
            }
        });
    }

    /// Routes one inbound packet: a packet whose id matches an outstanding
    /// call completes that call's waiter; anything else is a new request.
    fn route_packet(&self, packet: Packet) {
        let waiter = self.outstanding.lock().unwrap().remove(&packet.id);
        if let Some(tx) = waiter {
            if let Err(packet) = tx.send(packet) {
                warn!(packet_id = %packet.id, "dropping packet, waiter already gone");
            }
            return;
        }

        match self.inbound_tx.try_send(packet) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(p)) => {
                error!(packet_id = %p.id, "inbound queue full, dropping packet");
            }
            Err(mpsc::error::TrySendError::Closed(p)) => {
                warn!(packet_id = %p.id, "inbound queue closed, dropping packet");
            }
        }
    }

    /// Binds the typed request handler for this worker.
    ///
    /// Each inbound request runs in its own task: the payload is decoded,
    /// `logic` runs under the request's deadline, and the result (or its
    /// [`Status`]) is written back as a response with the request's id.
    /// When the deadline elapses first the response is discarded silently.
    ///
    /// Only one handler can be bound; later calls are ignored with a
    /// warning.
    pub fn handle<Req, Resp, F, Fut>(self: &Arc<Self>, logic: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(RpcContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Resp, Status>> + Send + 'static,
    {
        let Some(mut inbound) = self.inbound_rx.lock().unwrap().take() else {
            warn!(node_id = %self.id, "handler already bound, ignoring");
            return;
        };

        let node = self.clone();
        let logic = Arc::new(logic);
        tokio::spawn(async move {
            while let Some(request) = inbound.recv().await {
                let node = node.clone();
                let logic = logic.clone();
                tokio::spawn(async move {
                    let request_body: Req = match serde_json::from_slice(&request.payload) {
                        Ok(value) => value,
                        Err(e) => {
                            error!(packet_id = %request.id, "decode error: {e}");
                            return;
                        }
                    };

                    let scope =
                        RpcContext::from_context(request.context.clone(), Some(node.clone()));
                    let outcome =
                        tokio::time::timeout_at(scope.deadline(), logic(scope.clone(), request_body))
                            .await;
                    let result = match outcome {
                        Ok(result) => result,
                        Err(_) => {
                            info!(packet_id = %request.id, "deadline reached, skipping response");
                            return;
                        }
                    };

                    let (payload, status) = match &result {
                        Ok(response) => (Some(response), None),
                        Err(status) => (None, Some(status.clone())),
                    };
                    let response =
                        match Packet::response(request.id.clone(), scope.snapshot(), payload, status)
                        {
                            Ok(packet) => packet,
                            Err(e) => {
                                error!(packet_id = %request.id, "encode error: {e}");
                                return;
                            }
                        };

                    if let Err(e) = node.send_packet(&response).await {
                        error!(packet_id = %request.id, "write error: {e}");
                    }
                });
            }
        });
    }

    /// Sends a request to another worker through the orchestrator and waits
    /// for the matching response.
    ///
    /// Registers a single-use waiter keyed by the fresh packet id, writes
    /// the frame, and blocks up to a fixed 10 second ceiling. The waiter is
    /// removed on every exit path. On success the responder's context is
    /// merged back into `ctx` so the accumulated hops become visible, and a
    /// carried [`Status`] surfaces as [`FissionError::Handler`].
    pub async fn call<Req, Resp>(
        self: &Arc<Self>,
        target: &str,
        ctx: &RpcContext,
        request: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let packet = Packet::request(target, ctx.snapshot(), request)?;
        let (tx, rx) = oneshot::channel();
        self.outstanding
            .lock()
            .unwrap()
            .insert(packet.id.clone(), tx);

        if let Err(e) = self.send_packet(&packet).await {
            self.outstanding.lock().unwrap().remove(&packet.id);
            return Err(e);
        }

        let response = match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.outstanding.lock().unwrap().remove(&packet.id);
                return Err(FissionError::Transport("response waiter closed".into()));
            }
            Err(_) => {
                self.outstanding.lock().unwrap().remove(&packet.id);
                return Err(FissionError::Timeout(CALL_TIMEOUT));
            }
        };

        ctx.merge_response(response.context.clone());

        let (value, status) = response.deserialize::<Resp>()?;
        if let Some(status) = status {
            return Err(FissionError::Handler(status));
        }
        value.ok_or_else(|| FissionError::Decode("response payload was empty".into()))
    }

    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        write_frame_locked(&self.writer, packet).await
    }
}

/// Probes [`WORKER_FD`] for an inherited duplex socket.
fn inherited_socket() -> Option<tokio::net::UnixStream> {
    // Safety: the descriptor at this slot is placed by the parent for our
    // exclusive use; nothing else in the process touches it.
    let stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(WORKER_FD) };

    // getsockname fails with ENOTSOCK (or EBADF when the slot is empty)
    // unless the descriptor really is a socket. Dropping the probe closes
    // the slot, which is harmless on the stdio path.
    if stream.local_addr().is_err() {
        return None;
    }

    stream.set_nonblocking(true).ok()?;
    tokio::net::UnixStream::from_std(stream).ok()
}

/// Typed remote invocation through the node bound to `ctx`.
///
/// This is the call shape emitted by the transformer in place of a sibling
/// method call: the generic parameters are the sibling's request and
/// response types, `target` is its fully qualified method address, and the
/// context and request arguments are carried over verbatim.
pub async fn call<Req, Resp>(target: &str, ctx: RpcContext, request: Req) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let node = ctx.node()?;
    node.call(target, &ctx, &request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use fission_common::protocol::{CallContext, Direction};

    fn test_node(id: &str) -> (Arc<IoNode>, tokio::io::DuplexStream) {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let (read_half, write_half) = tokio::io::split(near);
        (
            IoNode::new(id, Box::new(read_half), Box::new(write_half)),
            far,
        )
    }

    #[tokio::test]
    async fn test_response_completes_waiter_and_clears_slot() {
        let (node, _far) = test_node("n1");
        let (tx, rx) = oneshot::channel();
        node.outstanding.lock().unwrap().insert("id-1".into(), tx);

        let response = Packet::response("id-1", CallContext::default(), Some(&1u32), None).unwrap();
        node.route_packet(response.clone());

        assert!(node.outstanding.lock().unwrap().is_empty());
        assert_eq!(rx.await.unwrap(), response);
    }

    #[tokio::test]
    async fn test_unknown_id_lands_in_inbound_queue() {
        let (node, _far) = test_node("n1");
        let request = Packet::request("pkg.Svc.M", CallContext::default(), &1u32).unwrap();
        node.route_packet(request.clone());

        let mut inbound = node.inbound_rx.lock().unwrap().take().unwrap();
        let queued = inbound.recv().await.unwrap();
        assert_eq!(queued.id, request.id);
        assert_eq!(queued.direction, Direction::Request);
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_panic() {
        let (node, _far) = test_node("n1");
        let (tx, rx) = oneshot::channel::<Packet>();
        node.outstanding.lock().unwrap().insert("id-1".into(), tx);
        drop(rx);

        let response = Packet::response("id-1", CallContext::default(), Some(&1u32), None).unwrap();
        node.route_packet(response);
        assert!(node.outstanding.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_send_failure_cleans_up_slot() {
        let (a, b) = tokio::net::UnixStream::pair().unwrap();
        let node = IoNode::from_stream("n1", a);
        drop(b);

        let ctx = RpcContext::root();
        let result: Result<u32> = node.call("pkg.Svc.M", &ctx, &1u32).await;
        assert!(result.is_err());
        assert!(node.outstanding.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listen_is_idempotent() {
        let (node, _far) = test_node("n1");
        node.listen();
        node.listen();
        assert!(node.reader.lock().unwrap().is_none());
    }
}
