use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// One entry in a packet's trace trail: a node id and the instant that node
/// first received the packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub binary_id: String,
    pub timestamp: SystemTime,
}

impl Hop {
    pub fn new(binary_id: impl Into<String>, timestamp: SystemTime) -> Self {
        Self {
            binary_id: binary_id.into(),
            timestamp,
        }
    }
}

/// Per-request metadata propagated with every packet.
///
/// The context travels verbatim on requests. On a response, the responder's
/// context replaces the requester's view, so hops accumulated by the callee
/// chain become observable at the caller.
///
/// # Invariants
///
/// `hops` is append-only along a call's path: a node appends its own id when
/// it first receives the packet, and never rewrites earlier entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallContext {
    /// Absolute instant after which the callee should stop working.
    pub deadline: Option<SystemTime>,
    /// Opaque id, stable for the life of a logical call tree.
    pub trace_id: String,
    /// Ordered trail of nodes this call has traversed.
    pub hops: Vec<Hop>,
}

impl CallContext {
    pub fn new(deadline: Option<SystemTime>, trace_id: impl Into<String>, hops: Vec<Hop>) -> Self {
        Self {
            deadline,
            trace_id: trace_id.into(),
            hops,
        }
    }

    /// Appends `(binary_id, now)` to the hop trail.
    pub fn add_hop(&mut self, binary_id: &str) {
        self.hops.push(Hop::new(binary_id, SystemTime::now()));
    }
}
