//! Caller-facing wrapper that returns its resource to the pool on close

use crate::errors::{PoolError, PoolResult};
use crate::factory::ResourceFactory;
use crate::handle::PooledHandle;
use crate::pool::PoolInner;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A checked-out resource that goes back to its pool exactly once
///
/// The resource is returned by [`close`](ResourceProxy::close) or, failing
/// that, when the proxy is dropped. Closing an already closed proxy is a
/// no-op; any other access after close fails with [`PoolError::Closed`].
pub struct ResourceProxy<F: ResourceFactory> {
    handle: Mutex<Option<PooledHandle<F::Resource>>>,
    id: u64,
    pool: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> ResourceProxy<F> {
    pub(crate) fn new(handle: PooledHandle<F::Resource>, pool: Arc<PoolInner<F>>) -> Self {
        Self {
            id: handle.id(),
            handle: Mutex::new(Some(handle)),
            pool,
        }
    }

    /// Pool-unique identity of the wrapped resource
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.handle.lock().is_none()
    }

    /// Borrow the underlying resource
    ///
    /// The guard keeps a concurrent [`close`](ResourceProxy::close) waiting
    /// until it is dropped. The lock is not reentrant: drop the guard before
    /// calling `close`, `with` or `delegate` again on the same thread, or the
    /// thread deadlocks on itself. Prefer [`with`](ResourceProxy::with) when
    /// the borrow does not need to outlive one call.
    pub fn delegate(&self) -> PoolResult<MappedMutexGuard<'_, F::Resource>> {
        MutexGuard::try_map(self.handle.lock(), |slot| slot.as_mut().map(PooledHandle::resource_mut))
            .map_err(|_| PoolError::Closed)
    }

    /// Run `op` against the underlying resource
    pub fn with<T>(&self, op: impl FnOnce(&mut F::Resource) -> T) -> PoolResult<T> {
        let mut resource = self.delegate()?;
        Ok(op(&mut resource))
    }

    /// Return the resource to the pool
    ///
    /// Waits for any outstanding [`delegate`](ResourceProxy::delegate) guard.
    ///
    /// The proxy counts as closed even when the return fails; the error only
    /// reports what went wrong while passivating or destroying the resource.
    pub fn close(&self) -> PoolResult<()> {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => self.pool.release(handle),
            None => Ok(()),
        }
    }
}

impl<F: ResourceFactory> Drop for ResourceProxy<F> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            if let Err(err) = self.pool.release(handle) {
                warn!(id = self.id, error = %err, "failed to return dropped resource to the pool");
            }
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for ResourceProxy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceProxy")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{FactoryError, Pool, PoolConfiguration, PoolError, ResourceFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Tracked {
        passivated: AtomicUsize,
    }

    impl ResourceFactory for Tracked {
        type Resource = Vec<String>;

        fn create(&self) -> Result<Vec<String>, FactoryError> {
            Ok(Vec::new())
        }

        fn passivate(&self, resource: &mut Vec<String>) -> Result<(), FactoryError> {
            self.passivated.fetch_add(1, Ordering::SeqCst);
            resource.clear();
            Ok(())
        }
    }

    #[test]
    fn test_forwarding_until_closed() {
        let pool = Pool::new(Tracked::default(), PoolConfiguration::default());
        let proxy = pool.acquire().unwrap();

        proxy.with(|log| log.push("query".to_string())).unwrap();
        assert_eq!(proxy.delegate().unwrap().len(), 1);

        proxy.close().unwrap();
        assert!(proxy.is_closed());
        assert!(matches!(proxy.with(|log| log.len()), Err(PoolError::Closed)));
        assert!(matches!(proxy.delegate(), Err(PoolError::Closed)));
    }

    #[test]
    fn test_double_close_returns_once() {
        let pool = Pool::new(Tracked::default(), PoolConfiguration::default());
        let proxy = pool.acquire().unwrap();

        proxy.close().unwrap();
        proxy.close().unwrap();
        drop(proxy);

        assert_eq!(pool.factory().passivated.load(Ordering::SeqCst), 1);
        assert_eq!(pool.num_idle(), 1);
    }

    #[test]
    fn test_concurrent_close_returns_once() {
        let pool = Pool::new(Tracked::default(), PoolConfiguration::default());
        let proxy = Arc::new(pool.acquire().unwrap());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let proxy = Arc::clone(&proxy);
                scope.spawn(move || proxy.close().unwrap());
            }
        });

        assert_eq!(pool.factory().passivated.load(Ordering::SeqCst), 1);
        assert_eq!(pool.num_idle(), 1);
        assert_eq!(pool.num_active(), 0);
    }

    #[test]
    fn test_close_waits_for_borrow() {
        let pool = Pool::new(Tracked::default(), PoolConfiguration::default());
        let proxy = Arc::new(pool.acquire().unwrap());
        let guard = proxy.delegate().unwrap();

        let closer = {
            let proxy = Arc::clone(&proxy);
            std::thread::spawn(move || proxy.close())
        };
        std::thread::sleep(std::time::Duration::from_millis(30));
        assert_eq!(pool.num_active(), 1);

        drop(guard);
        closer.join().unwrap().unwrap();
        assert!(proxy.is_closed());
        assert_eq!(pool.num_idle(), 1);
    }

    #[test]
    fn test_drop_returns_to_pool() {
        let pool = Pool::new(Tracked::default(), PoolConfiguration::default());
        {
            let proxy = pool.acquire().unwrap();
            assert!(format!("{:?}", proxy).contains("closed: false"));
        }
        assert_eq!(pool.num_idle(), 1);
        assert_eq!(pool.factory().passivated.load(Ordering::SeqCst), 1);
    }
}
