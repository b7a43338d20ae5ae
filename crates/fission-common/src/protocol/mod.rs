//! Fission Protocol Definitions
//!
//! This module defines the message types exchanged between the orchestrator
//! and its workers:
//!
//! - **[`Packet`]**: the unit of exchange, either a request or a response,
//!   correlated by a globally unique id
//! - **[`CallContext`]**: per-request metadata (deadline, trace id, hop
//!   trail) that travels with every packet
//! - **[`Status`]**: the structured error a handler returns, carried inside
//!   response packets
//! - **[`FissionError`]**: the runtime error type with one variant per
//!   failure kind
//!
//! # Error Handling
//!
//! Transport-level failures (short reads, decode failures, timeouts) surface
//! as [`FissionError`]; logical handler failures travel inside packets as
//! [`Status`] values and are authoritative when present.

pub mod context;
pub mod error;
pub mod packet;
pub mod status;


pub use context::{CallContext, Hop};
pub use error::{FissionError, Result};
pub use packet::{generate_packet_id, Direction, Packet};
pub use status::{code, Status};
