//! Error types for the resource pool

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error reported by a [`ResourceFactory`](crate::ResourceFactory) hook.
pub type FactoryError = Box<dyn StdError + Send + Sync>;

/// Shared form of a factory error, kept cheap to clone inside [`PoolError`].
pub type SharedError = Arc<dyn StdError + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Unable to create pooled resource: {0}")]
    ResourceCreation(#[source] SharedError),

    #[error("Pool exhausted - no resource became available within {0:?}")]
    Exhausted(Duration),

    #[error("Unable to validate object")]
    ValidationExhausted,

    #[error("Exception occurred while returning resource to the pool: {0}")]
    Return(#[source] SharedError),

    #[error("resource already closed")]
    Closed,

    #[error("Pool has been closed")]
    PoolClosed,
}

impl PoolError {
    pub(crate) fn creation(err: FactoryError) -> Self {
        PoolError::ResourceCreation(Arc::from(err))
    }

    pub(crate) fn returning(err: FactoryError) -> Self {
        PoolError::Return(Arc::from(err))
    }

    /// Whether waiting longer (or retrying later) could succeed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Exhausted(_))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
