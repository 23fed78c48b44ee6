//! # Worker Pool Seam
//!
//! The rewriter never runs a worker pool; it only registers delegates with
//! one. The pool is injected through [`WorkerPool`] and shared by every
//! registration of an assembly.

use crate::{DelegatePlugin, Plugin, PoolDelegateRegistration, PoolHandle};

/// A worker pool that accepts delegate registrations.
pub trait WorkerPool: Send + Sync {
    /// Number of background workers.
    fn size(&self) -> usize;

    /// Register a delegate and return the plugin entry that carries it
    /// into the assembled configuration.
    fn register_delegate(&self, registration: PoolDelegateRegistration) -> Plugin;
}

/// A fixed-size pool of background workers, described by its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadPool {
    size: usize,
}

impl ThreadPool {
    /// Create a pool handle. A size of zero is raised to one.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
        }
    }

    fn handle(&self) -> PoolHandle {
        PoolHandle { size: self.size }
    }
}

impl WorkerPool for ThreadPool {
    fn size(&self) -> usize {
        self.size
    }

    fn register_delegate(&self, registration: PoolDelegateRegistration) -> Plugin {
        Plugin::Delegate(DelegatePlugin {
            delegate: registration,
            thread_pool: self.handle(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CachePolicy, RuleId, Step};

    #[test]
    fn size_is_at_least_one() {
        assert_eq!(ThreadPool::new(0).size(), 1);
        assert_eq!(ThreadPool::new(8).size(), 8);
    }

    #[test]
    fn registration_is_bound_to_pool() {
        let pool = ThreadPool::new(3);
        let registration = PoolDelegateRegistration::new(
            RuleId::new("jsx-0000abcd"),
            vec![Step::bare("babel-loader")],
            &CachePolicy::default(),
        );

        match pool.register_delegate(registration.clone()) {
            Plugin::Delegate(plugin) => {
                assert_eq!(plugin.delegate, registration);
                assert_eq!(plugin.thread_pool.size, 3);
            }
            Plugin::External(other) => unreachable!("unexpected plugin {other}"),
        }
    }
}
