//! Lookup of shared data sources by server endpoint

use crate::config::DataSourceConfig;
use crate::data_source::PooledSearchDataSource;
use crate::search::{ClientError, Connector, Endpoint, SearchClient};

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Map from endpoint to the data source serving it
///
/// Owned by the application; dropping the registry drops its references to
/// the data sources, [`remove`](DataSourceRegistry::remove) also shuts the
/// removed pool down.
///
/// A data source whose server is changed after registration is filed under
/// its new endpoint on the next lookup. If another source already serves that
/// endpoint, the moved one is dropped from the registry.
///
/// # Examples
///
/// ```
/// use sphinx_pool::{ClientError, DataSourceRegistry, Endpoint};
/// # use sphinx_pool::SearchClient;
/// # use std::time::Duration;
/// # struct Offline;
/// # impl SearchClient for Offline {
/// #     type Response = ();
/// #     fn open(&mut self) -> Result<(), ClientError> { Ok(()) }
/// #     fn close(&mut self) -> bool { true }
/// #     fn set_server(&mut self, _: &str, _: u16) -> Result<(), ClientError> { Ok(()) }
/// #     fn set_connect_timeout(&mut self, _: Duration) {}
/// #     fn is_connect_error(&self) -> bool { false }
/// #     fn last_error(&self) -> Option<&str> { None }
/// #     fn last_warning(&self) -> Option<&str> { None }
/// #     fn query(&mut self, _: &str, _: &str) -> Result<(), ClientError> { Ok(()) }
/// #     fn add_query(&mut self, _: &str, _: &str, _: &str) -> Result<usize, ClientError> { Ok(0) }
/// #     fn run_queries(&mut self) -> Result<Vec<()>, ClientError> { Ok(Vec::new()) }
/// #     fn reset_filters(&mut self) {}
/// # }
///
/// let registry = DataSourceRegistry::new(|_: &Endpoint| Ok(Offline));
/// let first = registry.get_or_create(Endpoint::new("localhost", 9312));
/// let second = registry.get_or_create(Endpoint::new("localhost", 9312));
///
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// assert_eq!(registry.len(), 1);
/// ```
pub struct DataSourceRegistry<C: SearchClient> {
    sources: DashMap<Endpoint, Arc<PooledSearchDataSource<C>>>,
    connector: Connector<C>,
}

impl<C: SearchClient> DataSourceRegistry<C> {
    /// Registry building new data sources with `connector`
    pub fn new<K>(connector: K) -> Self
    where
        K: Fn(&Endpoint) -> Result<C, ClientError> + Send + Sync + 'static,
    {
        Self {
            sources: DashMap::new(),
            connector: Arc::new(connector),
        }
    }

    /// Data source for `endpoint`, created with default settings on first use
    pub fn get_or_create(&self, endpoint: Endpoint) -> Arc<PooledSearchDataSource<C>> {
        self.refile_moved();
        let entry = self.sources.entry(endpoint.clone()).or_insert_with(|| {
            debug!(%endpoint, "creating data source");
            Arc::new(PooledSearchDataSource::with_connector(
                endpoint,
                Arc::clone(&self.connector),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Data source for the config's endpoint, built from the config on first use
    pub fn get_or_create_from_config(&self, config: &DataSourceConfig) -> Arc<PooledSearchDataSource<C>> {
        self.refile_moved();
        let entry = self.sources.entry(config.endpoint()).or_insert_with(|| {
            debug!(endpoint = %config.endpoint(), "creating data source from config");
            Arc::new(PooledSearchDataSource::from_config(
                config,
                Arc::clone(&self.connector),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Register an existing data source under its current endpoint
    ///
    /// Replaces any data source already registered for that endpoint and
    /// returns the key for later lookups.
    pub fn register(&self, source: Arc<PooledSearchDataSource<C>>) -> Endpoint {
        let key = source.endpoint();
        self.sources.insert(key.clone(), source);
        key
    }

    pub fn get(&self, key: &Endpoint) -> Option<Arc<PooledSearchDataSource<C>>> {
        self.refile_moved();
        self.sources.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Unregister a data source and close its pool
    pub fn remove(&self, key: &Endpoint) -> Option<Arc<PooledSearchDataSource<C>>> {
        self.refile_moved();
        let (_, source) = self.sources.remove(key)?;
        source.close();
        Some(source)
    }

    /// Move entries whose data source now points at another server.
    fn refile_moved(&self) {
        let moved: Vec<_> = self
            .sources
            .iter()
            .filter(|entry| entry.value().endpoint() != *entry.key())
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (old, source) in moved {
            if self
                .sources
                .remove_if(&old, |_, current| Arc::ptr_eq(current, &source))
                .is_none()
            {
                continue;
            }
            let endpoint = source.endpoint();
            debug!(from = %old, to = %endpoint, "data source moved to another server");
            self.sources.entry(endpoint).or_insert(source);
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
