//! Pool bookkeeping attached to each managed resource

use std::time::{Duration, Instant};

/// Lifecycle state of a pooled handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleState {
    /// Resting in the idle set
    Idle,

    /// Checked out through a proxy
    Active,

    /// Failed passivation or validation; will be destroyed
    Invalid,
}

/// One resource together with the metadata the pool tracks for it.
#[derive(Debug)]
pub(crate) struct PooledHandle<R> {
    id: u64,
    generation: u64,
    state: HandleState,
    created_at: Instant,
    idle_since: Option<Instant>,
    resource: R,
}

impl<R> PooledHandle<R> {
    pub fn new(id: u64, generation: u64, resource: R) -> Self {
        Self {
            id,
            generation,
            state: HandleState::Active,
            created_at: Instant::now(),
            idle_since: None,
            resource,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut R {
        &mut self.resource
    }

    pub fn into_resource(self) -> R {
        self.resource
    }

    pub fn mark_idle(&mut self) {
        self.state = HandleState::Idle;
        self.idle_since = Some(Instant::now());
    }

    pub fn mark_active(&mut self) {
        self.state = HandleState::Active;
        self.idle_since = None;
    }

    pub fn invalidate(&mut self) {
        self.state = HandleState::Invalid;
    }

    pub fn is_invalid(&self) -> bool {
        self.state == HandleState::Invalid
    }

    /// Time spent in the idle set, zero while checked out.
    pub fn idle_time(&self) -> Duration {
        self.idle_since.map(|since| since.elapsed()).unwrap_or_default()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_evictable(&self, min_evictable_idle: Option<Duration>) -> bool {
        match (self.state(), min_evictable_idle) {
            (HandleState::Idle, Some(threshold)) => self.idle_time() > threshold,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_stamp_cleared_on_activate() {
        let mut handle = PooledHandle::new(1, 0, "conn");
        assert_eq!(handle.state(), HandleState::Active);
        assert_eq!(handle.idle_time(), Duration::ZERO);

        handle.mark_idle();
        std::thread::sleep(Duration::from_millis(5));
        assert!(handle.idle_time() >= Duration::from_millis(5));
        assert!(handle.is_evictable(Some(Duration::from_millis(1))));
        assert!(!handle.is_evictable(None));

        handle.mark_active();
        assert_eq!(handle.idle_time(), Duration::ZERO);
        assert!(!handle.is_evictable(Some(Duration::ZERO)));
    }

    #[test]
    fn test_invalidate() {
        let mut handle = PooledHandle::new(7, 3, 42);
        handle.invalidate();
        assert!(handle.is_invalid());
        assert_eq!(handle.id(), 7);
        assert_eq!(handle.generation(), 3);
        assert_eq!(handle.into_resource(), 42);
    }
}
