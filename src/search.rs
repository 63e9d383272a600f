//! Pooling glue for search-server clients

use crate::errors::{FactoryError, PoolError};
use crate::factory::ResourceFactory;
use crate::proxy::ResourceProxy;

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Port `searchd` listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 9312;

/// Errors raised by search clients and by proxies wrapping them
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Unable to connect to search server {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("Search server error: {0}")]
    Server(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Error occurred while closing the search connection")]
    Close,

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Host and port of a search server
///
/// A blank host means "whatever default server the client connects to".
///
/// # Examples
///
/// ```
/// use sphinx_pool::Endpoint;
///
/// let endpoint = Endpoint::new("  ", 9312);
/// assert_eq!(endpoint.host(), None);
/// assert_eq!(endpoint.to_string(), "<default>:9312");
///
/// let endpoint = Endpoint::new("search.internal", 9306);
/// assert_eq!(endpoint.host(), Some("search.internal"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: Option<String>,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = if host.trim().is_empty() { None } else { Some(host) };
        Self { host, port }
    }

    /// The client's built-in server on the default port
    pub fn default_server() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn with_host(self, host: impl Into<String>) -> Self {
        Self::new(host, self.port)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::default_server()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host().unwrap_or("<default>"), self.port)
    }
}

/// Operations of a search-server client that the pool and its proxies rely on
///
/// Request and response encoding is left to the implementation.
pub trait SearchClient: Send + 'static {
    type Response: Send;

    /// Establish the socket connection
    fn open(&mut self) -> Result<(), ClientError>;

    /// Close the socket connection, returning `false` if that failed
    fn close(&mut self) -> bool;

    fn set_server(&mut self, host: &str, port: u16) -> Result<(), ClientError>;

    fn set_connect_timeout(&mut self, timeout: Duration);

    /// Whether the last failure was a connection failure
    fn is_connect_error(&self) -> bool;

    fn last_error(&self) -> Option<&str>;

    fn last_warning(&self) -> Option<&str>;

    fn query(&mut self, query: &str, index: &str) -> Result<Self::Response, ClientError>;

    /// Queue a query for [`run_queries`](SearchClient::run_queries), returning its position
    fn add_query(&mut self, query: &str, index: &str, comment: &str) -> Result<usize, ClientError>;

    fn run_queries(&mut self) -> Result<Vec<Self::Response>, ClientError>;

    fn reset_filters(&mut self);
}

/// Builds a client for an endpoint without connecting it
pub type Connector<C> = Arc<dyn Fn(&Endpoint) -> Result<C, ClientError> + Send + Sync>;

/// [`ResourceFactory`] producing search clients for a configurable endpoint
///
/// Sockets are opened on activation and closed on passivation, so idle
/// clients hold no connection.
pub struct SearchClientFactory<C> {
    endpoint: RwLock<Endpoint>,
    connector: Connector<C>,
}

impl<C: SearchClient> SearchClientFactory<C> {
    pub fn new<K>(endpoint: Endpoint, connector: K) -> Self
    where
        K: Fn(&Endpoint) -> Result<C, ClientError> + Send + Sync + 'static,
    {
        Self::with_connector(endpoint, Arc::new(connector))
    }

    pub fn with_connector(endpoint: Endpoint, connector: Connector<C>) -> Self {
        Self {
            endpoint: RwLock::new(endpoint),
            connector,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.read().clone()
    }

    /// Point newly created clients at another server
    pub fn set_endpoint(&self, endpoint: Endpoint) {
        *self.endpoint.write() = endpoint;
    }

    pub fn host(&self) -> Option<String> {
        self.endpoint.read().host().map(str::to_owned)
    }

    pub fn port(&self) -> u16 {
        self.endpoint.read().port()
    }

    pub fn connector(&self) -> Connector<C> {
        Arc::clone(&self.connector)
    }
}

impl<C: SearchClient> ResourceFactory for SearchClientFactory<C> {
    type Resource = C;

    fn create(&self) -> Result<C, FactoryError> {
        let endpoint = self.endpoint();
        Ok((self.connector)(&endpoint)?)
    }

    fn destroy(&self, mut client: C) -> Result<(), FactoryError> {
        client.close();
        Ok(())
    }

    fn activate(&self, client: &mut C) -> Result<(), FactoryError> {
        Ok(client.open()?)
    }

    fn passivate(&self, client: &mut C) -> Result<(), FactoryError> {
        if client.close() {
            Ok(())
        } else {
            Err(ClientError::Close.into())
        }
    }

    /// Usable when the client reports no connection error and carries no
    /// pending error message.
    fn validate(&self, client: &C) -> bool {
        !client.is_connect_error() && client.last_error().is_none_or(|err| err.trim().is_empty())
    }
}

/// Proxy handed out by a [`PooledSearchDataSource`](crate::PooledSearchDataSource)
pub type SearchClientProxy<C> = ResourceProxy<SearchClientFactory<C>>;

impl<C: SearchClient> ResourceProxy<SearchClientFactory<C>> {
    pub fn last_error(&self) -> Result<Option<String>, ClientError> {
        Ok(self.delegate()?.last_error().map(str::to_owned))
    }

    pub fn last_warning(&self) -> Result<Option<String>, ClientError> {
        Ok(self.delegate()?.last_warning().map(str::to_owned))
    }

    pub fn is_connect_error(&self) -> Result<bool, ClientError> {
        Ok(self.delegate()?.is_connect_error())
    }

    pub fn set_server(&self, host: &str, port: u16) -> Result<(), ClientError> {
        self.delegate()?.set_server(host, port)
    }

    pub fn set_connect_timeout(&self, timeout: Duration) -> Result<(), ClientError> {
        self.delegate()?.set_connect_timeout(timeout);
        Ok(())
    }

    pub fn query(&self, query: &str, index: &str) -> Result<C::Response, ClientError> {
        self.delegate()?.query(query, index)
    }

    pub fn add_query(&self, query: &str, index: &str, comment: &str) -> Result<usize, ClientError> {
        self.delegate()?.add_query(query, index, comment)
    }

    pub fn run_queries(&self) -> Result<Vec<C::Response>, ClientError> {
        self.delegate()?.run_queries()
    }

    pub fn reset_filters(&self) -> Result<(), ClientError> {
        self.delegate()?.reset_filters();
        Ok(())
    }
}
