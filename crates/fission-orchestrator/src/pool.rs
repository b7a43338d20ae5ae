use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::worker::Worker;

/// Per-pool dispatch policy: how long one attempt may take and how many
/// retries follow the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            retries: 1,
        }
    }
}

/// The interchangeable workers serving one method address, selected
/// round-robin.
pub struct WorkerPool {
    workers: RwLock<Vec<Arc<Worker>>>,
    /// Monotonically increasing selection cursor; wraps modulo the current
    /// worker count at each selection.
    next: AtomicU64,
    policy: Mutex<PoolPolicy>,
}

impl WorkerPool {
    pub fn new(policy: PoolPolicy) -> Self {
        Self {
            workers: RwLock::new(Vec::new()),
            next: AtomicU64::new(0),
            policy: Mutex::new(policy),
        }
    }

    pub fn add_worker(&self, worker: Arc<Worker>) {
        self.workers.write().unwrap().push(worker);
    }

    /// Returns the next worker in round-robin order, or `None` when the
    /// pool is empty.
    pub fn select_worker(&self) -> Option<Arc<Worker>> {
        let workers = self.workers.read().unwrap();
        let n = workers.len();
        if n == 0 {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) as usize;
        Some(workers[idx % n].clone())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.read().unwrap().len()
    }

    pub fn policy(&self) -> PoolPolicy {
        *self.policy.lock().unwrap()
    }

    pub fn set_policy(&self, policy: PoolPolicy) {
        *self.policy.lock().unwrap() = policy;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    async fn pool_of(n: usize) -> WorkerPool {
        let pool = WorkerPool::new(PoolPolicy::default());
        for i in 0..n {
            let (stream, _peer) = tokio::net::UnixStream::pair().unwrap();
            // The peer end is dropped; selection does not touch the socket.
            let (worker, _mailbox) = Worker::start(
                format!("w{i}"),
                "pkg.Svc.M".into(),
                String::new(),
                stream,
                None,
            );
            pool.add_worker(worker);
        }
        pool
    }

    #[tokio::test]
    async fn test_empty_pool_selects_none() {
        let pool = WorkerPool::new(PoolPolicy::default());
        assert!(pool.select_worker().is_none());
    }

    #[tokio::test]
    async fn test_selection_cycles_in_order() {
        let pool = pool_of(3).await;
        let ids: Vec<String> = (0..6)
            .map(|_| pool.select_worker().unwrap().id().to_string())
            .collect();
        assert_eq!(ids, ["w0", "w1", "w2", "w0", "w1", "w2"]);
    }

    /// For K selections over N workers, each worker is picked either
    /// floor(K/N) or ceil(K/N) times.
    #[tokio::test]
    async fn test_round_robin_fairness() {
        let pool = pool_of(3).await;
        let k = 100usize;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..k {
            let worker = pool.select_worker().unwrap();
            *counts.entry(worker.id().to_string()).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        for (_, count) in counts {
            assert!(count == k / 3 || count == k / 3 + 1);
        }
    }

    #[tokio::test]
    async fn test_default_policy() {
        let policy = PoolPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(3));
        assert_eq!(policy.retries, 1);
    }

    #[tokio::test]
    async fn test_set_policy_replaces() {
        let pool = WorkerPool::new(PoolPolicy::default());
        pool.set_policy(PoolPolicy {
            timeout: Duration::from_millis(100),
            retries: 4,
        });
        assert_eq!(pool.policy().timeout, Duration::from_millis(100));
        assert_eq!(pool.policy().retries, 4);
    }
}
