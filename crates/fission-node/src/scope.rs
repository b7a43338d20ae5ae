use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use fission_common::protocol::{CallContext, FissionError, Result};

use crate::node::IoNode;

/// Fallback deadline applied when a request context carries none.
///
/// Deliberately the largest timeout in the system: a callee should keep
/// working as long as any reachable caller still cares.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// The host-side view of one request's [`CallContext`].
///
/// Handlers receive an `RpcContext` and outbound calls consume one. The
/// wrapped context is shared and mutable: hops appended by the handler (or
/// merged back from a callee's response) are visible at every clone,
/// including the serialization point that builds the response packet.
///
/// Cloning is cheap and clones observe the same underlying context.
#[derive(Clone)]
pub struct RpcContext {
    shared: Arc<Mutex<CallContext>>,
    deadline: tokio::time::Instant,
    node: Option<Arc<IoNode>>,
}

impl RpcContext {
    /// Wraps a wire context, resolving the effective deadline.
    ///
    /// A context without a deadline gets [`DEFAULT_DEADLINE`] from now.
    pub fn from_context(ctx: CallContext, node: Option<Arc<IoNode>>) -> Self {
        let remaining = match ctx.deadline {
            Some(when) => when
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO),
            None => DEFAULT_DEADLINE,
        };

        Self {
            shared: Arc::new(Mutex::new(ctx)),
            deadline: tokio::time::Instant::now() + remaining,
            node,
        }
    }

    /// A fresh scope for an externally originated call tree: new trace id,
    /// no deadline, no hops.
    pub fn root() -> Self {
        let ctx = CallContext::new(None, uuid::Uuid::new_v4().to_string(), Vec::new());
        Self::from_context(ctx, None)
    }

    /// Attaches the node used for outbound calls made through this scope.
    pub fn bind_node(mut self, node: Arc<IoNode>) -> Self {
        self.node = Some(node);
        self
    }

    /// Appends `(binary_id, now)` to the live hop trail.
    pub fn add_hop(&self, binary_id: &str) {
        self.shared.lock().unwrap().add_hop(binary_id);
    }

    /// A point-in-time copy of the wrapped context, for serialization.
    pub fn snapshot(&self) -> CallContext {
        self.shared.lock().unwrap().clone()
    }

    /// Replaces the wrapped context with a responder's returned context, so
    /// hops accumulated by the callee chain become visible here.
    pub fn merge_response(&self, ctx: CallContext) {
        *self.shared.lock().unwrap() = ctx;
    }

    pub fn deadline(&self) -> tokio::time::Instant {
        self.deadline
    }

    pub fn trace_id(&self) -> String {
        self.shared.lock().unwrap().trace_id.clone()
    }

    pub fn node(&self) -> Result<Arc<IoNode>> {
        self.node.clone().ok_or(FissionError::NoNode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_deadline_applied() {
        let scope = RpcContext::from_context(CallContext::default(), None);
        let remaining = scope.deadline() - tokio::time::Instant::now();
        assert!(remaining > Duration::from_secs(29));
        assert!(remaining <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_explicit_deadline_applied() {
        let ctx = CallContext::new(
            Some(SystemTime::now() + Duration::from_millis(100)),
            "t",
            Vec::new(),
        );
        let scope = RpcContext::from_context(ctx, None);
        let remaining = scope.deadline() - tokio::time::Instant::now();
        assert!(remaining <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_clones_share_the_wrapped_context() {
        let scope = RpcContext::root();
        let clone = scope.clone();
        clone.add_hop("somewhere");
        assert_eq!(scope.snapshot().hops.len(), 1);
    }

    #[tokio::test]
    async fn test_merge_response_replaces_view() {
        let scope = RpcContext::root();
        scope.add_hop("a");

        let mut from_callee = scope.snapshot();
        from_callee.add_hop("b");
        from_callee.add_hop("c");
        scope.merge_response(from_callee);

        let ids: Vec<String> = scope
            .snapshot()
            .hops
            .iter()
            .map(|h| h.binary_id.clone())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_root_scope_has_no_node() {
        let scope = RpcContext::root();
        assert!(scope.node().is_err());
    }
}
