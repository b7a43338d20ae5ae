//! Fission Common Types and Transport
//!
//! This crate provides the core protocol definitions and the framed
//! byte-stream transport shared by every fission component.
//!
//! # Overview
//!
//! Fission turns a single-process service definition into a fleet of worker
//! processes coordinated by an orchestrator. Workers and orchestrator talk
//! over connected duplex sockets using one message shape, the [`Packet`],
//! carried in length-prefixed frames:
//!
//! - **Protocol Layer**: [`Packet`], [`CallContext`], [`Status`], and the
//!   [`FissionError`] error type
//! - **Transport Layer**: length-prefixed frame encode/decode over any
//!   async byte stream
//!
//! # Wire Format
//!
//! `[4-byte length prefix as u32 big-endian] + [JSON-encoded packet]`
//!
//! # Example
//!
//! ```
//! use fission_common::protocol::{CallContext, Direction, Packet};
//!
//! let ctx = CallContext::default();
//! let request = Packet::request("pkg.BookService.GetBook", ctx, &42u32).unwrap();
//! assert_eq!(request.direction, Direction::Request);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
