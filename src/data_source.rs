//! Pooled data source handing out search clients

use crate::config::{DataSourceConfig, PoolConfiguration};
use crate::errors::PoolResult;
use crate::pool::Pool;
use crate::search::{ClientError, Connector, Endpoint, SearchClient, SearchClientFactory, SearchClientProxy};

use tracing::debug;

/// Thread-safe source of pooled search clients
///
/// Sockets are opened when a client is checked out and closed when it comes
/// back. Close every client you receive (or let it drop) to return it to the
/// pool. Keep `max_total` at or below the server's worker limit so the pool
/// never asks for more connections than the server accepts.
///
/// By default clients are validated on borrow and on return, but not on
/// creation since a freshly built client has not connected yet.
pub struct PooledSearchDataSource<C: SearchClient> {
    pool: Pool<SearchClientFactory<C>>,
}

impl<C: SearchClient> PooledSearchDataSource<C> {
    /// Data source for `endpoint` with default pool settings
    pub fn new<K>(endpoint: Endpoint, connector: K) -> Self
    where
        K: Fn(&Endpoint) -> Result<C, ClientError> + Send + Sync + 'static,
    {
        Self::with_factory(SearchClientFactory::new(endpoint, connector), PoolConfiguration::default())
    }

    pub fn with_connector(endpoint: Endpoint, connector: Connector<C>) -> Self {
        Self::with_factory(
            SearchClientFactory::with_connector(endpoint, connector),
            PoolConfiguration::default(),
        )
    }

    /// Wrap `factory` in a pool, forcing the data source's validation defaults
    pub fn with_factory(factory: SearchClientFactory<C>, config: PoolConfiguration) -> Self {
        let config = PoolConfiguration {
            test_on_borrow: true,
            test_on_return: true,
            test_on_create: false,
            ..config
        };
        Self {
            pool: Pool::new(factory, config),
        }
    }

    /// Data source built from externally loaded settings
    pub fn from_config(config: &DataSourceConfig, connector: Connector<C>) -> Self {
        let factory = SearchClientFactory::with_connector(config.endpoint(), connector);
        Self {
            pool: Pool::new(factory, config.pool_configuration()),
        }
    }

    /// Check out a client; close it to hand it back
    pub fn client(&self) -> PoolResult<SearchClientProxy<C>> {
        self.pool.acquire()
    }

    pub async fn client_async(&self) -> PoolResult<SearchClientProxy<C>> {
        self.pool.acquire_async().await
    }

    /// Clients currently checked out, roughly the open connections to the server
    pub fn num_active(&self) -> usize {
        self.pool.num_active()
    }

    /// Clients ready for reuse
    pub fn num_idle(&self) -> usize {
        self.pool.num_idle()
    }

    pub fn pool(&self) -> &Pool<SearchClientFactory<C>> {
        &self.pool
    }

    pub fn factory(&self) -> &SearchClientFactory<C> {
        self.pool.factory()
    }

    pub fn endpoint(&self) -> Endpoint {
        self.factory().endpoint()
    }

    pub fn host(&self) -> Option<String> {
        self.factory().host()
    }

    pub fn port(&self) -> u16 {
        self.factory().port()
    }

    pub fn set_host(&self, host: impl Into<String>) {
        let endpoint = self.endpoint().with_host(host);
        self.set_endpoint(endpoint);
    }

    pub fn set_port(&self, port: u16) {
        let endpoint = self.endpoint().with_port(port);
        self.set_endpoint(endpoint);
    }

    pub fn set_server(&self, host: impl Into<String>, port: u16) {
        self.set_endpoint(Endpoint::new(host, port));
    }

    /// Point new clients at `endpoint` and drop every idle client built for the old one
    pub fn set_endpoint(&self, endpoint: Endpoint) {
        if endpoint == self.endpoint() {
            return;
        }
        debug!(%endpoint, "search endpoint changed");
        self.factory().set_endpoint(endpoint);
        self.pool.clear();
    }

    pub fn test_on_borrow(&self) -> bool {
        self.pool.config().test_on_borrow
    }

    pub fn set_test_on_borrow(&self, enabled: bool) {
        self.pool.set_test_on_borrow(enabled);
    }

    pub fn test_on_return(&self) -> bool {
        self.pool.config().test_on_return
    }

    pub fn set_test_on_return(&self, enabled: bool) {
        self.pool.set_test_on_return(enabled);
    }

    pub fn min_idle(&self) -> usize {
        self.pool.config().min_idle
    }

    pub fn set_min_idle(&self, count: usize) {
        self.pool.set_min_idle(count);
    }

    pub fn max_idle(&self) -> Option<usize> {
        self.pool.config().max_idle
    }

    pub fn set_max_idle(&self, count: Option<usize>) {
        self.pool.set_max_idle(count);
    }

    pub fn max_total(&self) -> Option<usize> {
        self.pool.config().max_total
    }

    pub fn set_max_total(&self, count: Option<usize>) {
        self.pool.set_max_total(count);
    }

    /// Shut down the underlying pool
    pub fn close(&self) {
        self.pool.close();
    }
}
