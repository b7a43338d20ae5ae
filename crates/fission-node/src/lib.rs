//! Fission Worker Runtime
//!
//! Every worker process owns exactly one [`IoNode`]: the runtime object that
//! holds the worker's duplex channel to the orchestrator, its bounded inbound
//! request queue, and its outstanding-response table.
//!
//! # Lifecycle
//!
//! A generated worker entry point does four things:
//!
//! ```no_run
//! use fission_node::IoNode;
//! # async fn handler(_ctx: fission_node::RpcContext, n: u32)
//! #     -> Result<u32, fission_common::protocol::Status> { Ok(n) }
//! # #[tokio::main]
//! # async fn main() {
//! let node = IoNode::attach("worker-1");
//! node.listen();
//! node.handle(handler);
//! std::future::pending::<()>().await;
//! # }
//! ```
//!
//! # Multiplexing
//!
//! A single reader loop demultiplexes every inbound frame by packet id:
//! frames answering an outbound [`IoNode::call`] complete that call's
//! waiter; everything else is a new request and lands in the inbound queue
//! consumed by the bound handler.

pub mod node;
pub mod scope;

pub use node::{call, IoNode, WORKER_FD};
pub use scope::RpcContext;
