//! Fission Orchestrator
//!
//! The orchestrator is the parent process of the worker fleet. It spawns one
//! subprocess per worker over a connected Unix socketpair, groups workers
//! into round-robin pools keyed by method address, routes requests (both
//! externally originated and worker-to-worker), correlates responses by
//! packet id, and enforces a per-pool timeout and retry budget.
//!
//! # Design
//!
//! The orchestrator is a forwarder, not an executor. Its responsibilities
//! end at:
//!
//! 1. **Lifecycle**: spawn workers and hand each its socket at a well-known
//!    file descriptor slot
//! 2. **Load balancing**: round-robin selection within a pool
//! 3. **Routing**: deliver requests to a pool member and forward the
//!    correlated response back to whoever asked
//! 4. **Retry**: re-dispatch to pool siblings when an attempt times out
//!
//! # Example
//!
//! ```no_run
//! use fission_orchestrator::Orchestrator;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let orch = Orchestrator::new();
//! orch.spawn("pkg.BookService.GetBook", "./a1b2c3d4e5f6_GetBook", 2).await?;
//! # Ok(())
//! # }
//! ```

pub mod orchestrator;
pub mod pool;
pub mod worker;

pub use orchestrator::{Orchestrator, ORCHESTRATOR_ID};
pub use pool::{PoolPolicy, WorkerPool};
pub use worker::Worker;
