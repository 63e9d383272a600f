//! # sphinx-pool
//!
//! Thread-safe pool of expensive, stateful resources, with bindings that
//! pool search-server client connections.
//!
//! ## Features
//!
//! - Bounded pool with idle reuse (LIFO or FIFO) and blocking checkout
//! - Create/activate/passivate/validate/destroy hooks via [`ResourceFactory`]
//! - Validation on create, borrow, return and while idle
//! - Proxies that return their resource exactly once, on close or drop
//! - Async checkout that waits without blocking the runtime
//! - Background eviction of stale idle resources with `min_idle` replenishment
//! - Metrics with Prometheus export
//! - Search-client data sources and a registry keyed by endpoint
//!
//! ## Quick Start
//!
//! ```rust
//! use sphinx_pool::{FactoryError, Pool, PoolConfiguration, ResourceFactory};
//!
//! struct Buffers;
//!
//! impl ResourceFactory for Buffers {
//!     type Resource = Vec<u8>;
//!
//!     fn create(&self) -> Result<Vec<u8>, FactoryError> {
//!         Ok(Vec::with_capacity(1024))
//!     }
//! }
//!
//! let pool = Pool::new(Buffers, PoolConfiguration::new().with_max_total(4));
//! {
//!     let buffer = pool.acquire().unwrap();
//!     buffer.with(|buf| buf.extend_from_slice(b"hello")).unwrap();
//!     // Resource automatically returned when `buffer` goes out of scope
//! }
//! assert_eq!(pool.num_idle(), 1);
//! ```

mod config;
mod data_source;
mod errors;
mod evictor;
mod factory;
mod handle;
mod metrics;
mod pool;
mod proxy;
mod registry;
mod search;

pub use config::{DataSourceConfig, PoolConfiguration};
pub use data_source::PooledSearchDataSource;
pub use errors::{FactoryError, PoolError, PoolResult, SharedError};
pub use evictor::EvictionReport;
pub use factory::ResourceFactory;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::Pool;
pub use proxy::ResourceProxy;
pub use registry::DataSourceRegistry;
pub use search::{
    ClientError, Connector, DEFAULT_PORT, Endpoint, SearchClient, SearchClientFactory, SearchClientProxy,
};
