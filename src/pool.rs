//! Core resource pool implementation

use crate::config::PoolConfiguration;
use crate::errors::{FactoryError, PoolError, PoolResult};
use crate::evictor::{EvictionReport, Evictor};
use crate::factory::ResourceFactory;
use crate::handle::PooledHandle;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::proxy::ResourceProxy;

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Idle/active bookkeeping guarded by the pool lock.
pub(crate) struct PoolState<R> {
    pub idle: VecDeque<PooledHandle<R>>,
    pub active: HashSet<u64>,
    /// Idle, active, and resources currently being created or tested.
    pub total: usize,
    /// Resources being created to top the idle set up to `min_idle`.
    pub warming: usize,
    pub generation: u64,
    pub closed: bool,
}

impl<R> PoolState<R> {
    fn new() -> Self {
        Self {
            idle: VecDeque::new(),
            active: HashSet::new(),
            total: 0,
            warming: 0,
            generation: 0,
            closed: false,
        }
    }

    /// Take an idle handle or reserve capacity for a new one.
    fn take_claim(&mut self, config: &PoolConfiguration) -> Option<Claim<R>> {
        let idle = if config.lifo {
            self.idle.pop_back()
        } else {
            self.idle.pop_front()
        };

        if let Some(mut handle) = idle {
            handle.mark_active();
            self.active.insert(handle.id());
            return Some(Claim::Idle(handle));
        }

        if config.allows_total(self.total) {
            self.total += 1;
            return Some(Claim::Create {
                generation: self.generation,
            });
        }

        None
    }
}

/// Outcome of the locked part of a checkout.
pub(crate) enum Claim<R> {
    Idle(PooledHandle<R>),
    Create { generation: u64 },
}

pub(crate) struct PoolInner<F: ResourceFactory> {
    pub factory: F,
    pub config: RwLock<PoolConfiguration>,
    pub state: Mutex<PoolState<F::Resource>>,
    available: Condvar,
    released: Notify,
    pub metrics: MetricsTracker,
    next_id: AtomicU64,
    evictor: Mutex<Option<Evictor>>,
}

impl<F: ResourceFactory> PoolInner<F> {
    pub fn config(&self) -> PoolConfiguration {
        self.config.read().clone()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn notify_one(&self) {
        self.available.notify_one();
        self.released.notify_one();
    }

    pub fn notify_all(&self) {
        self.available.notify_all();
        self.released.notify_waiters();
    }

    /// Block until a claim is possible or the deadline passes.
    fn claim(&self, deadline: Option<Instant>, max_wait: Option<Duration>) -> PoolResult<Claim<F::Resource>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(PoolError::PoolClosed);
            }

            if let Some(claim) = state.take_claim(&self.config()) {
                return Ok(claim);
            }

            match deadline {
                None => self.available.wait(&mut state),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        MetricsTracker::incr(&self.metrics.wait_timeouts);
                        return Err(PoolError::Exhausted(max_wait.unwrap_or_default()));
                    }
                    let _ = self.available.wait_until(&mut state, deadline);
                }
            }
        }
    }

    async fn claim_async(
        &self,
        deadline: Option<tokio::time::Instant>,
        max_wait: Option<Duration>,
    ) -> PoolResult<Claim<F::Resource>> {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }
                if let Some(claim) = state.take_claim(&self.config()) {
                    return Ok(claim);
                }
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        MetricsTracker::incr(&self.metrics.wait_timeouts);
                        return Err(PoolError::Exhausted(max_wait.unwrap_or_default()));
                    }
                }
            }
        }
    }

    /// Give back capacity reserved by a claim that produced no resource.
    pub fn release_slot(&self) {
        self.state.lock().total -= 1;
        self.notify_one();
    }

    /// Drop a checked-out handle from circulation and destroy it.
    pub fn discard(&self, handle: PooledHandle<F::Resource>) {
        {
            let mut state = self.state.lock();
            state.active.remove(&handle.id());
            state.total -= 1;
        }
        self.notify_one();
        let _ = self.destroy(handle);
    }

    /// Run the factory's destroy hook. Bookkeeping must already be updated.
    pub fn destroy(&self, handle: PooledHandle<F::Resource>) -> Result<(), FactoryError> {
        let id = handle.id();
        let age = handle.age();
        MetricsTracker::incr(&self.metrics.destroyed);

        let result = self.factory.destroy(handle.into_resource());
        match &result {
            Ok(()) => debug!(id, ?age, "destroyed pooled resource"),
            Err(err) => warn!(id, error = %err, "failed to destroy pooled resource"),
        }
        result
    }

    /// Return a handle from a proxy. Every failure still leaves the handle
    /// either idle or destroyed, with counters updated.
    pub fn release(&self, mut handle: PooledHandle<F::Resource>) -> PoolResult<()> {
        let config = self.config();
        let mut failure = None;

        if let Err(err) = self.factory.passivate(handle.resource_mut()) {
            handle.invalidate();
            failure = Some(err);
        }

        if !handle.is_invalid() && config.test_on_return && !self.factory.validate(handle.resource()) {
            MetricsTracker::incr(&self.metrics.validation_failures);
            handle.invalidate();
        }

        let rejected = {
            let mut state = self.state.lock();
            state.active.remove(&handle.id());

            let keep = !handle.is_invalid()
                && !state.closed
                && handle.generation() == state.generation
                && config.allows_idle(state.idle.len());

            if keep {
                handle.mark_idle();
                state.idle.push_back(handle);
                None
            } else {
                state.total -= 1;
                Some(handle)
            }
        };
        self.notify_one();

        match rejected {
            Some(handle) => {
                if let Err(err) = self.destroy(handle) {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
            None => MetricsTracker::incr(&self.metrics.returned),
        }

        match failure {
            Some(err) => Err(PoolError::returning(err)),
            None => Ok(()),
        }
    }

    /// Destroy every idle handle and retire the current generation.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            state.generation += 1;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len();
            drained
        };

        let count = drained.len();
        if count > 0 {
            self.notify_all();
        }
        for handle in drained {
            let _ = self.destroy(handle);
        }
        debug!(count, "cleared idle resources");
        count
    }
}

impl<F: ResourceFactory> Drop for PoolInner<F> {
    /// Idle resources still held when the last handle goes away are destroyed
    /// through the factory.
    fn drop(&mut self) {
        let idle = std::mem::take(&mut self.state.get_mut().idle);
        if !idle.is_empty() {
            debug!(count = idle.len(), "destroying idle resources of dropped pool");
        }
        for handle in idle {
            let _ = self.destroy(handle);
        }
    }
}

/// Thread-safe pool of expensive, stateful resources
///
/// Resources are built on demand by a [`ResourceFactory`] up to `max_total`,
/// handed out wrapped in a [`ResourceProxy`], and returned when the proxy is
/// closed or dropped. Cloning a `Pool` yields another handle to the same pool.
///
/// # Examples
///
/// ```
/// use sphinx_pool::{FactoryError, Pool, PoolConfiguration, ResourceFactory};
///
/// struct Connections;
///
/// impl ResourceFactory for Connections {
///     type Resource = String;
///
///     fn create(&self) -> Result<String, FactoryError> {
///         Ok("connection".to_string())
///     }
/// }
///
/// let pool = Pool::new(Connections, PoolConfiguration::new().with_max_total(2));
/// let proxy = pool.acquire().unwrap();
/// assert_eq!(pool.num_active(), 1);
///
/// proxy.close().unwrap();
/// assert_eq!(pool.num_active(), 0);
/// assert_eq!(pool.num_idle(), 1);
/// ```
pub struct Pool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory> Pool<F> {
    /// Create a new pool backed by `factory`
    pub fn new(factory: F, config: PoolConfiguration) -> Self {
        let interval = config.time_between_eviction_runs;
        let pool = Self {
            inner: Arc::new(PoolInner {
                factory,
                config: RwLock::new(config),
                state: Mutex::new(PoolState::new()),
                available: Condvar::new(),
                released: Notify::new(),
                metrics: MetricsTracker::new(),
                next_id: AtomicU64::new(0),
                evictor: Mutex::new(None),
            }),
        };
        pool.restart_evictor(interval);
        pool
    }

    /// Check out a resource, waiting up to `max_wait` when the pool is at capacity
    pub fn acquire(&self) -> PoolResult<ResourceProxy<F>> {
        let max_wait = self.inner.config().wait_limit();
        self.acquire_with(max_wait)
    }

    /// Check out a resource with a per-call wait bound
    pub fn acquire_timeout(&self, timeout: Duration) -> PoolResult<ResourceProxy<F>> {
        self.acquire_with(Some(timeout))
    }

    /// Check out a resource without waiting for one to be returned
    pub fn try_acquire(&self) -> PoolResult<ResourceProxy<F>> {
        self.acquire_with(Some(Duration::ZERO))
    }

    fn acquire_with(&self, max_wait: Option<Duration>) -> PoolResult<ResourceProxy<F>> {
        let deadline = max_wait.map(|wait| Instant::now() + wait);
        let mut attempts = 0;

        loop {
            let claim = self.inner.claim(deadline, max_wait)?;
            if let Some(proxy) = self.checkout(claim, &mut attempts)? {
                return Ok(proxy);
            }
        }
    }

    /// Check out a resource without blocking the async runtime while waiting
    ///
    /// Dropping the returned future abandons the wait.
    pub async fn acquire_async(&self) -> PoolResult<ResourceProxy<F>> {
        let max_wait = self.inner.config().wait_limit();
        let deadline = max_wait.map(|wait| tokio::time::Instant::now() + wait);
        let mut attempts = 0;

        loop {
            let claim = self.inner.claim_async(deadline, max_wait).await?;
            if let Some(proxy) = self.checkout(claim, &mut attempts)? {
                return Ok(proxy);
            }
        }
    }

    /// Turn a claim into a ready proxy. `Ok(None)` means the resource was
    /// rejected and the caller should claim again.
    fn checkout(
        &self,
        claim: Claim<F::Resource>,
        attempts: &mut usize,
    ) -> PoolResult<Option<ResourceProxy<F>>> {
        let inner = &self.inner;
        let config = inner.config();

        let (mut handle, fresh) = match claim {
            Claim::Idle(handle) => (handle, false),
            Claim::Create { generation } => {
                let resource = match inner.factory.create() {
                    Ok(resource) => resource,
                    Err(err) => {
                        inner.release_slot();
                        warn!(error = %err, "failed to create pooled resource");
                        return Err(PoolError::creation(err));
                    }
                };
                MetricsTracker::incr(&inner.metrics.created);

                let handle = PooledHandle::new(inner.next_id(), generation, resource);
                debug!(id = handle.id(), "created pooled resource");
                inner.state.lock().active.insert(handle.id());
                (handle, true)
            }
        };

        let created_ok = !fresh || !config.test_on_create || inner.factory.validate(handle.resource());
        let ready = created_ok
            && match inner.factory.activate(handle.resource_mut()) {
                Ok(()) => true,
                Err(err) => {
                    debug!(id = handle.id(), error = %err, "failed to activate pooled resource");
                    false
                }
            }
            && (!config.test_on_borrow || inner.factory.validate(handle.resource()));

        if ready {
            MetricsTracker::incr(&inner.metrics.borrowed);
            return Ok(Some(ResourceProxy::new(handle, Arc::clone(inner))));
        }

        MetricsTracker::incr(&inner.metrics.validation_failures);
        handle.invalidate();
        inner.discard(handle);

        if fresh {
            *attempts += 1;
            if *attempts >= config.max_create_attempts {
                return Err(PoolError::ValidationExhausted);
            }
        }
        Ok(None)
    }

    /// Number of resources currently checked out
    pub fn num_active(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    /// Number of resources resting in the idle set
    pub fn num_idle(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// The factory backing this pool
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> PoolConfiguration {
        self.inner.config()
    }

    /// Apply a configuration change at runtime
    pub fn reconfigure(&self, change: impl FnOnce(&mut PoolConfiguration)) {
        let interval = {
            let mut config = self.inner.config.write();
            let before = config.time_between_eviction_runs;
            change(&mut config);
            (config.time_between_eviction_runs != before).then_some(config.time_between_eviction_runs)
        };

        // a larger capacity may unblock waiters
        self.inner.notify_all();

        if let Some(interval) = interval {
            self.restart_evictor(interval);
        }
    }

    pub fn set_min_idle(&self, count: usize) {
        self.reconfigure(|config| config.min_idle = count);
    }

    pub fn set_max_idle(&self, count: Option<usize>) {
        self.reconfigure(|config| config.max_idle = count);
    }

    /// Zero lifts the limit, same as `None`
    pub fn set_max_total(&self, count: Option<usize>) {
        self.reconfigure(|config| config.max_total = count.filter(|&max| max > 0));
    }

    pub fn set_test_on_create(&self, enabled: bool) {
        self.reconfigure(|config| config.test_on_create = enabled);
    }

    pub fn set_test_on_borrow(&self, enabled: bool) {
        self.reconfigure(|config| config.test_on_borrow = enabled);
    }

    pub fn set_test_on_return(&self, enabled: bool) {
        self.reconfigure(|config| config.test_on_return = enabled);
    }

    /// `None` or zero makes checkouts wait indefinitely
    pub fn set_max_wait(&self, max_wait: Option<Duration>) {
        self.reconfigure(|config| config.max_wait = max_wait);
    }

    pub fn set_min_evictable_idle(&self, idle: Option<Duration>) {
        self.reconfigure(|config| config.min_evictable_idle = idle);
    }

    pub fn set_time_between_eviction_runs(&self, interval: Option<Duration>) {
        self.reconfigure(|config| config.time_between_eviction_runs = interval);
    }

    /// Run one eviction pass on the calling thread
    pub fn evict(&self) -> EvictionReport {
        self.inner.evict()
    }

    /// Create idle resources until `min_idle` is met, returning how many were added
    pub fn ensure_min_idle(&self) -> usize {
        self.inner.ensure_min_idle()
    }

    /// Destroy all idle resources
    ///
    /// Resources checked out at the time are destroyed when they come back
    /// instead of rejoining the idle set.
    pub fn clear(&self) -> usize {
        self.inner.clear()
    }

    /// Shut the pool down
    ///
    /// Stops the evictor, destroys idle resources and fails current and
    /// future checkouts with [`PoolError::PoolClosed`].
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        let evictor = self.inner.evictor.lock().take();
        if let Some(evictor) = evictor {
            evictor.stop();
        }
        self.inner.clear();
        self.inner.notify_all();
        debug!("pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let (active, idle) = {
            let state = self.inner.state.lock();
            (state.active.len(), state.idle.len())
        };
        self.inner
            .metrics
            .get_metrics(active, idle, self.inner.config.read().total_limit())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    /// Replace the evictor. The slot stays locked until the new one is in
    /// place, so a concurrent `close` either sees it or prevents it.
    fn restart_evictor(&self, interval: Option<Duration>) {
        let previous = {
            let mut slot = self.inner.evictor.lock();
            let previous = slot.take();

            let interval = interval.filter(|interval| !interval.is_zero());
            if let Some(interval) = interval.filter(|_| !self.is_closed()) {
                match Evictor::start(Arc::downgrade(&self.inner), interval) {
                    Ok(evictor) => *slot = Some(evictor),
                    Err(err) => warn!(error = %err, "failed to start evictor thread"),
                }
            }
            previous
        };

        if let Some(evictor) = previous {
            evictor.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[derive(Default)]
    struct Counting {
        created: AtomicUsize,
        destroyed: Arc<AtomicUsize>,
        activated: AtomicUsize,
        passivated: AtomicUsize,
        validated: AtomicUsize,
        valid: AtomicBool,
        fail_create: AtomicBool,
        fail_passivate: AtomicBool,
        fail_activate: AtomicBool,
        fail_destroy: AtomicBool,
        rejected: AtomicUsize,
    }

    impl Counting {
        fn healthy() -> Self {
            let factory = Self::default();
            factory.valid.store(true, Ordering::SeqCst);
            factory.rejected.store(usize::MAX, Ordering::SeqCst);
            factory
        }
    }

    impl ResourceFactory for Counting {
        type Resource = usize;

        fn create(&self) -> Result<usize, FactoryError> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err("server unreachable".into());
            }
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }

        fn destroy(&self, _resource: usize) -> Result<(), FactoryError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            if self.fail_destroy.load(Ordering::SeqCst) {
                return Err("socket already gone".into());
            }
            Ok(())
        }

        fn activate(&self, _resource: &mut usize) -> Result<(), FactoryError> {
            self.activated.fetch_add(1, Ordering::SeqCst);
            if self.fail_activate.load(Ordering::SeqCst) {
                return Err("handshake failed".into());
            }
            Ok(())
        }

        fn passivate(&self, _resource: &mut usize) -> Result<(), FactoryError> {
            self.passivated.fetch_add(1, Ordering::SeqCst);
            if self.fail_passivate.load(Ordering::SeqCst) {
                return Err("socket close failed".into());
            }
            Ok(())
        }

        fn validate(&self, resource: &usize) -> bool {
            self.validated.fetch_add(1, Ordering::SeqCst);
            self.valid.load(Ordering::SeqCst) && *resource != self.rejected.load(Ordering::SeqCst)
        }
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    #[test]
    fn test_acquire_and_release() {
        let pool = Pool::new(Counting::healthy(), PoolConfiguration::default());

        let proxy = pool.acquire().unwrap();
        assert_eq!(pool.num_active(), 1);
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(count(&pool.factory().activated), 1);

        proxy.close().unwrap();
        assert_eq!(pool.num_active(), 0);
        assert_eq!(pool.num_idle(), 1);
        assert_eq!(count(&pool.factory().passivated), 1);
    }

    #[test]
    fn test_lifo_reuses_most_recent() {
        let pool = Pool::new(Counting::healthy(), PoolConfiguration::default());
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        let (first_value, second_value) = (*first.delegate().unwrap(), *second.delegate().unwrap());
        first.close().unwrap();
        second.close().unwrap();

        let again = pool.acquire().unwrap();
        assert_eq!(*again.delegate().unwrap(), second_value);
        assert_ne!(first_value, second_value);
    }

    #[test]
    fn test_fifo_reuses_oldest() {
        let pool = Pool::new(Counting::healthy(), PoolConfiguration::new().with_fifo());
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        let first_value = *first.delegate().unwrap();
        first.close().unwrap();
        second.close().unwrap();

        let again = pool.acquire().unwrap();
        assert_eq!(*again.delegate().unwrap(), first_value);
    }

    #[test]
    fn test_creation_error_releases_capacity() {
        let factory = Counting::healthy();
        factory.fail_create.store(true, Ordering::SeqCst);
        let pool = Pool::new(factory, PoolConfiguration::new().with_max_total(1));

        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, PoolError::ResourceCreation(_)));

        pool.factory().fail_create.store(false, Ordering::SeqCst);
        let proxy = pool.try_acquire().unwrap();
        assert_eq!(pool.num_active(), 1);
        drop(proxy);
    }

    #[test]
    fn test_validation_exhausted() {
        let factory = Counting::healthy();
        factory.valid.store(false, Ordering::SeqCst);
        let config = PoolConfiguration::new()
            .with_test_on_borrow(true)
            .with_max_create_attempts(3);
        let pool = Pool::new(factory, config);

        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, PoolError::ValidationExhausted));
        assert_eq!(count(&pool.factory().created), 3);
        assert_eq!(count(&pool.factory().destroyed), 3);
        assert_eq!(pool.num_active(), 0);
        assert_eq!(pool.num_idle(), 0);
    }

    #[test]
    fn test_create_validation_exhausted() {
        let factory = Counting::healthy();
        factory.valid.store(false, Ordering::SeqCst);
        let pool = Pool::new(factory, PoolConfiguration::new().with_test_on_create(true));

        assert!(matches!(pool.acquire().unwrap_err(), PoolError::ValidationExhausted));
        assert_eq!(count(&pool.factory().created), 3);
        assert_eq!(count(&pool.factory().destroyed), 3);
        assert_eq!(count(&pool.factory().activated), 0);
        assert_eq!(pool.num_active(), 0);
    }

    #[test]
    fn test_activation_failure_counts_toward_attempts() {
        let factory = Counting::healthy();
        factory.fail_activate.store(true, Ordering::SeqCst);
        let config = PoolConfiguration::new()
            .with_max_total(2)
            .with_max_create_attempts(2);
        let pool = Pool::new(factory, config);

        assert!(matches!(pool.acquire().unwrap_err(), PoolError::ValidationExhausted));
        assert_eq!(count(&pool.factory().created), 2);
        assert_eq!(count(&pool.factory().activated), 2);
        assert_eq!(count(&pool.factory().destroyed), 2);
        assert_eq!(pool.get_metrics().validation_failures, 2);
        assert_eq!(pool.num_active(), 0);
        assert_eq!(pool.num_idle(), 0);

        // capacity reserved by the failed attempts was given back
        pool.factory().fail_activate.store(false, Ordering::SeqCst);
        let _first = pool.try_acquire().unwrap();
        let _second = pool.try_acquire().unwrap();
    }

    #[test]
    fn test_invalid_idle_is_replaced() {
        let config = PoolConfiguration::new().with_test_on_borrow(true);
        let pool = Pool::new(Counting::healthy(), config);
        pool.acquire().unwrap().close().unwrap();
        assert_eq!(pool.num_idle(), 1);

        // the idle resource (0) now fails validation, a fresh one replaces it
        pool.factory().rejected.store(0, Ordering::SeqCst);
        let proxy = pool.acquire().unwrap();
        assert_eq!(*proxy.delegate().unwrap(), 1);
        assert_eq!(count(&pool.factory().created), 2);
        assert_eq!(count(&pool.factory().destroyed), 1);
        assert_eq!(pool.num_active(), 1);
        assert_eq!(pool.num_idle(), 0);
    }

    #[test]
    fn test_test_on_return_destroys_invalid() {
        let config = PoolConfiguration::new().with_test_on_return(true);
        let pool = Pool::new(Counting::healthy(), config);
        let proxy = pool.acquire().unwrap();

        pool.factory().valid.store(false, Ordering::SeqCst);
        proxy.close().unwrap();

        assert_eq!(pool.num_idle(), 0);
        assert_eq!(count(&pool.factory().destroyed), 1);
        assert_eq!(pool.get_metrics().validation_failures, 1);
    }

    #[test]
    fn test_passivate_failure_is_reported_and_destroyed() {
        let pool = Pool::new(Counting::healthy(), PoolConfiguration::default());
        let proxy = pool.acquire().unwrap();
        pool.factory().fail_passivate.store(true, Ordering::SeqCst);

        let err = proxy.close().unwrap_err();
        assert!(matches!(err, PoolError::Return(_)));
        assert!(proxy.is_closed());
        assert_eq!(pool.num_active(), 0);
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(count(&pool.factory().destroyed), 1);

        // a second close does not return the handle again
        proxy.close().unwrap();
        assert_eq!(count(&pool.factory().passivated), 1);
    }

    #[test]
    fn test_destroy_failure_still_frees_capacity() {
        let config = PoolConfiguration::new()
            .with_max_total(1)
            .with_test_on_return(true);
        let pool = Pool::new(Counting::healthy(), config);
        let proxy = pool.acquire().unwrap();

        pool.factory().valid.store(false, Ordering::SeqCst);
        pool.factory().fail_destroy.store(true, Ordering::SeqCst);
        let err = proxy.close().unwrap_err();
        assert!(matches!(err, PoolError::Return(_)));
        assert!(proxy.is_closed());
        assert_eq!(pool.num_active(), 0);
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(count(&pool.factory().destroyed), 1);

        pool.factory().valid.store(true, Ordering::SeqCst);
        pool.factory().fail_destroy.store(false, Ordering::SeqCst);
        let again = pool.try_acquire().unwrap();
        assert_eq!(*again.delegate().unwrap(), 1);
    }

    #[test]
    fn test_max_idle_destroys_extra() {
        let config = PoolConfiguration::new().with_max_total(4).with_max_idle(1);
        let pool = Pool::new(Counting::healthy(), config);
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();

        first.close().unwrap();
        second.close().unwrap();
        assert_eq!(pool.num_idle(), 1);
        assert_eq!(count(&pool.factory().destroyed), 1);
    }

    #[test]
    fn test_try_acquire_when_exhausted() {
        let pool = Pool::new(Counting::healthy(), PoolConfiguration::new().with_max_total(1));
        let _held = pool.acquire().unwrap();

        let err = pool.try_acquire().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(pool.get_metrics().wait_timeouts, 1);
    }

    #[test]
    fn test_clear_retires_active_generation() {
        let pool = Pool::new(Counting::healthy(), PoolConfiguration::default());
        let kept = pool.acquire().unwrap();
        pool.acquire().unwrap().close().unwrap();

        assert_eq!(pool.clear(), 1);
        assert_eq!(pool.num_idle(), 0);

        kept.close().unwrap();
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(count(&pool.factory().destroyed), 2);
    }

    #[test]
    fn test_close_rejects_checkouts() {
        let pool = Pool::new(Counting::healthy(), PoolConfiguration::default());
        let proxy = pool.acquire().unwrap();
        pool.close();

        assert!(matches!(pool.acquire().unwrap_err(), PoolError::PoolClosed));
        proxy.close().unwrap();
        assert_eq!(pool.num_idle(), 0);
        assert_eq!(count(&pool.factory().destroyed), 1);
    }

    #[test]
    fn test_raising_max_total_wakes_waiter() {
        let pool = Pool::new(Counting::healthy(), PoolConfiguration::new().with_max_total(1));
        let _held = pool.acquire().unwrap();

        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.acquire_timeout(Duration::from_secs(5)).map(|proxy| proxy.id()))
        };
        std::thread::sleep(Duration::from_millis(30));
        pool.set_max_total(Some(2));

        assert!(waiter.join().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_async_acquire_waits_for_release() {
        let pool = Pool::new(
            Counting::healthy(),
            PoolConfiguration::new()
                .with_max_total(1)
                .with_max_wait(Duration::from_secs(5)),
        );
        let held = pool.acquire_async().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire_async().await.map(|proxy| proxy.id()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let held_id = held.id();
        held.close().unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), held_id);
    }

    #[tokio::test]
    async fn test_async_acquire_times_out() {
        let pool = Pool::new(
            Counting::healthy(),
            PoolConfiguration::new()
                .with_max_total(1)
                .with_max_wait(Duration::from_millis(30)),
        );
        let _held = pool.acquire_async().await.unwrap();

        let err = pool.acquire_async().await.unwrap_err();
        assert!(matches!(err, PoolError::Exhausted(wait) if wait == Duration::from_millis(30)));
    }

    #[test]
    fn test_zero_max_total_is_unbounded() {
        let config = PoolConfiguration {
            max_total: Some(0),
            ..PoolConfiguration::default()
        };
        let pool = Pool::new(Counting::healthy(), config);

        let held: Vec<_> = (0..12).map(|_| pool.try_acquire().unwrap()).collect();
        assert_eq!(pool.num_active(), 12);
        assert_eq!(pool.get_metrics().max_capacity, 0);

        pool.set_max_total(Some(0));
        assert_eq!(pool.config().max_total, None);
        assert!(pool.try_acquire().is_ok());
        drop(held);
    }

    #[test]
    fn test_zero_max_wait_blocks_until_release() {
        let config = PoolConfiguration::new()
            .with_max_total(1)
            .with_max_wait(Duration::ZERO);
        let pool = Pool::new(Counting::healthy(), config);
        let held = pool.acquire().unwrap();

        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let started = std::time::Instant::now();
                pool.acquire().map(|proxy| (proxy.id(), started.elapsed()))
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        let held_id = held.id();
        held.close().unwrap();

        let (id, waited) = waiter.join().unwrap().unwrap();
        assert_eq!(id, held_id);
        assert!(waited >= Duration::from_millis(40));

        // the explicit non-blocking variant still fails fast
        let _again = pool.acquire().unwrap();
        assert!(pool.try_acquire().unwrap_err().is_timeout());
    }

    #[test]
    fn test_dropping_pool_destroys_idle() {
        let pool = Pool::new(Counting::healthy(), PoolConfiguration::default());
        let destroyed = Arc::clone(&pool.factory().destroyed);
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        first.close().unwrap();

        drop(pool);
        assert_eq!(count(&destroyed), 0);

        // the outstanding proxy keeps the pool alive until it comes back
        drop(second);
        assert_eq!(count(&destroyed), 2);
    }

    #[test]
    fn test_closed_pool_starts_no_evictor() {
        let config = PoolConfiguration::new().with_eviction_interval(Duration::from_millis(10));
        let pool = Pool::new(Counting::healthy(), config);
        assert!(pool.inner.evictor.lock().is_some());

        pool.close();
        assert!(pool.inner.evictor.lock().is_none());

        pool.set_time_between_eviction_runs(Some(Duration::from_millis(5)));
        assert!(pool.inner.evictor.lock().is_none());
    }

    #[test]
    fn test_metrics_export() {
        let pool = Pool::new(Counting::healthy(), PoolConfiguration::new().with_max_total(4));
        let _proxy = pool.acquire().unwrap();

        let exported = pool.export_metrics();
        assert_eq!(exported["total_created"], "1");
        assert_eq!(exported["active_resources"], "1");
        assert!(pool
            .export_metrics_prometheus("test", None)
            .contains("searchpool_resources_active{pool=\"test\"} 1"));
    }
}
