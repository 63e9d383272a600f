//! Idle resource eviction and minimum-idle replenishment

use crate::factory::ResourceFactory;
use crate::handle::PooledHandle;
use crate::metrics::MetricsTracker;
use crate::pool::PoolInner;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one eviction pass
///
/// # Examples
///
/// ```
/// use sphinx_pool::{FactoryError, Pool, PoolConfiguration, ResourceFactory};
/// use std::time::Duration;
///
/// struct Sockets;
///
/// impl ResourceFactory for Sockets {
///     type Resource = u16;
///
///     fn create(&self) -> Result<u16, FactoryError> {
///         Ok(9312)
///     }
/// }
///
/// let config = PoolConfiguration::new()
///     .with_min_idle(2)
///     .with_min_evictable_idle(Duration::from_secs(60));
/// let pool = Pool::new(Sockets, config);
///
/// let report = pool.evict();
/// assert_eq!(report.evicted, 0);
/// assert_eq!(report.created, 2);
/// assert_eq!(pool.num_idle(), 2);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Idle resources destroyed for being stale or invalid
    pub evicted: usize,

    /// Resources created to restore `min_idle`
    pub created: usize,
}

impl<F: ResourceFactory> PoolInner<F> {
    /// Destroy stale idle handles, test the rest if configured, then top the
    /// idle set back up to `min_idle`.
    pub(crate) fn evict(&self) -> EvictionReport {
        let config = self.config();

        let (expired, to_test) = {
            let mut state = self.state.lock();
            let idle = std::mem::take(&mut state.idle);
            let mut kept = VecDeque::with_capacity(idle.len());
            let mut expired = Vec::new();
            let mut to_test = Vec::new();

            for handle in idle {
                if handle.is_evictable(config.min_evictable_idle) {
                    expired.push(handle);
                } else if config.test_while_idle {
                    to_test.push(handle);
                } else {
                    kept.push_back(handle);
                }
            }

            state.idle = kept;
            state.total -= expired.len();
            (expired, to_test)
        };

        let mut evicted = expired.len();
        if evicted > 0 {
            self.notify_all();
        }
        for handle in expired {
            self.evict_one(handle);
        }

        for handle in to_test {
            if self.factory.validate(handle.resource()) {
                self.restore_idle(handle);
            } else {
                MetricsTracker::incr(&self.metrics.validation_failures);
                self.state.lock().total -= 1;
                self.notify_one();
                self.evict_one(handle);
                evicted += 1;
            }
        }

        let created = self.ensure_min_idle();
        if evicted > 0 || created > 0 {
            debug!(evicted, created, "eviction run finished");
        }
        EvictionReport { evicted, created }
    }

    fn evict_one(&self, handle: PooledHandle<F::Resource>) {
        MetricsTracker::incr(&self.metrics.evicted);
        let _ = self.destroy(handle);
    }

    /// Put a handle that passed idle testing back at the cold end of the idle set.
    fn restore_idle(&self, handle: PooledHandle<F::Resource>) {
        let rejected = {
            let mut state = self.state.lock();
            if state.closed || handle.generation() != state.generation {
                state.total -= 1;
                Some(handle)
            } else {
                state.idle.push_front(handle);
                None
            }
        };
        self.notify_one();
        if let Some(handle) = rejected {
            let _ = self.destroy(handle);
        }
    }

    /// Create idle resources until `min_idle` (capped by `max_idle`) is met
    /// without exceeding `max_total`.
    pub(crate) fn ensure_min_idle(&self) -> usize {
        let mut created = 0;

        loop {
            let config = self.config();
            let generation = {
                let mut state = self.state.lock();
                if state.closed
                    || state.idle.len() + state.warming >= config.effective_min_idle()
                    || !config.allows_total(state.total)
                {
                    break;
                }
                state.total += 1;
                state.warming += 1;
                state.generation
            };

            if !self.warm_one(generation) {
                break;
            }
            created += 1;
        }

        created
    }

    /// Create, activate and passivate one resource straight into the idle set.
    fn warm_one(&self, generation: u64) -> bool {
        let mut resource = match self.factory.create() {
            Ok(resource) => resource,
            Err(err) => {
                warn!(error = %err, "failed to create idle resource");
                let mut state = self.state.lock();
                state.warming -= 1;
                state.total -= 1;
                drop(state);
                self.notify_one();
                return false;
            }
        };
        MetricsTracker::incr(&self.metrics.created);

        let prepared = self
            .factory
            .activate(&mut resource)
            .and_then(|()| self.factory.passivate(&mut resource));
        let mut handle = PooledHandle::new(self.next_id(), generation, resource);

        let rejected = {
            let mut state = self.state.lock();
            state.warming -= 1;
            if prepared.is_err() || state.closed || generation != state.generation {
                state.total -= 1;
                Some(handle)
            } else {
                handle.mark_idle();
                state.idle.push_back(handle);
                None
            }
        };
        self.notify_one();

        match rejected {
            Some(handle) => {
                if let Err(err) = &prepared {
                    warn!(id = handle.id(), error = %err, "failed to prepare idle resource");
                }
                let _ = self.destroy(handle);
                false
            }
            None => true,
        }
    }
}

/// Background thread running [`PoolInner::evict`] on a fixed period.
///
/// Holds only a weak reference so the pool can go away underneath it.
pub(crate) struct Evictor {
    shutdown: Sender<()>,
    thread: JoinHandle<()>,
}

impl Evictor {
    pub fn start<F: ResourceFactory>(pool: Weak<PoolInner<F>>, interval: Duration) -> io::Result<Self> {
        let (shutdown, signal) = channel::bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("sphinx-pool-evictor".to_string())
            .spawn(move || {
                debug!(?interval, "evictor started");
                loop {
                    match signal.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => match pool.upgrade() {
                            Some(pool) => {
                                pool.evict();
                            }
                            None => break,
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("evictor stopped");
            })?;

        Ok(Self { shutdown, thread })
    }

    /// Signal the thread and wait for it unless called from the evictor itself.
    pub fn stop(self) {
        let _ = self.shutdown.send(());
        if self.thread.thread().id() != thread::current().id() {
            let _ = self.thread.join();
        }
    }
}
