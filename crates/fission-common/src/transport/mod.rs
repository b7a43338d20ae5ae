//! Fission Transport Layer
//!
//! Length-prefixed framing over any async byte stream.
//!
//! # Wire Format
//!
//! `[4-byte length prefix as u32 big-endian] + [JSON-encoded packet]`
//!
//! The same framing runs over a socketpair end inside a worker, over the
//! orchestrator's end of each worker connection, and over stdio when no
//! inherited socket is available.
//!
//! # Message Size Limits
//!
//! Frames are capped at 100 MB on both the encode and decode paths to
//! prevent memory exhaustion from a corrupted length header.

pub mod frame;

pub use frame::{
    encode_packet, read_frame, write_frame, write_frame_locked, HEADER_SIZE, MAX_FRAME_SIZE,
};

#[cfg(test)]
mod tests;
