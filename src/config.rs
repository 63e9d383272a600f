//! Pool configuration options

use crate::search::{DEFAULT_PORT, Endpoint};

use std::time::Duration;

/// Configuration for resource pool behavior
///
/// # Examples
///
/// ```
/// use sphinx_pool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_total(16)
///     .with_max_idle(8)
///     .with_min_idle(2)
///     .with_max_wait(Duration::from_millis(250))
///     .with_test_on_borrow(true);
///
/// assert_eq!(config.max_total, Some(16));
/// assert_eq!(config.effective_min_idle(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfiguration {
    /// Idle resources the evictor keeps warm
    pub min_idle: usize,

    /// Idle resources retained on return; extra ones are destroyed (`None` = unbounded)
    pub max_idle: Option<usize>,

    /// Idle plus active resources (`None` or zero = unbounded)
    pub max_total: Option<usize>,

    /// Hand out the most recently returned resource first
    pub lifo: bool,

    /// Validate freshly created resources
    pub test_on_create: bool,

    /// Validate resources before handing them out
    pub test_on_borrow: bool,

    /// Validate resources when they come back
    pub test_on_return: bool,

    /// Validate non-expired idle resources during eviction runs
    pub test_while_idle: bool,

    /// How long a checkout may block (`None` or zero = wait indefinitely)
    pub max_wait: Option<Duration>,

    /// Idle time after which the evictor destroys a resource
    pub min_evictable_idle: Option<Duration>,

    /// Evictor period (`None` disables the background evictor)
    pub time_between_eviction_runs: Option<Duration>,

    /// New resources tried before a checkout gives up on validation
    pub max_create_attempts: usize,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            min_idle: 0,
            max_idle: Some(8),
            max_total: Some(8),
            lifo: true,
            test_on_create: false,
            test_on_borrow: false,
            test_on_return: false,
            test_while_idle: false,
            max_wait: None,
            min_evictable_idle: Some(Duration::from_secs(30 * 60)),
            time_between_eviction_runs: None,
            max_create_attempts: 3,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum idle count, capped by `max_idle` when that is bounded.
    pub fn effective_min_idle(&self) -> usize {
        match self.max_idle {
            Some(max_idle) => self.min_idle.min(max_idle),
            None => self.min_idle,
        }
    }

    /// Capacity limit, `None` when unbounded
    pub fn total_limit(&self) -> Option<usize> {
        self.max_total.filter(|&max| max > 0)
    }

    /// Checkout wait bound, `None` when checkouts wait indefinitely
    pub fn wait_limit(&self) -> Option<Duration> {
        self.max_wait.filter(|wait| !wait.is_zero())
    }

    pub(crate) fn allows_total(&self, total: usize) -> bool {
        self.total_limit().is_none_or(|max| total < max)
    }

    pub(crate) fn allows_idle(&self, idle: usize) -> bool {
        self.max_idle.is_none_or(|max| idle < max)
    }

    pub fn with_min_idle(mut self, count: usize) -> Self {
        self.min_idle = count;
        self
    }

    pub fn with_max_idle(mut self, count: usize) -> Self {
        self.max_idle = Some(count);
        self
    }

    /// Set the total capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use sphinx_pool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_max_total(50);
    /// assert_eq!(config.max_total, Some(50));
    ///
    /// let unbounded = PoolConfiguration::new().unbounded();
    /// assert_eq!(unbounded.max_total, None);
    ///
    /// // zero lifts the limit
    /// assert_eq!(PoolConfiguration::new().with_max_total(0).max_total, None);
    /// ```
    pub fn with_max_total(mut self, count: usize) -> Self {
        self.max_total = (count > 0).then_some(count);
        self
    }

    /// Remove both the total and the idle limits
    pub fn unbounded(mut self) -> Self {
        self.max_total = None;
        self.max_idle = None;
        self
    }

    /// Hand out the least recently returned resource first
    pub fn with_fifo(mut self) -> Self {
        self.lifo = false;
        self
    }

    pub fn with_test_on_create(mut self, enabled: bool) -> Self {
        self.test_on_create = enabled;
        self
    }

    pub fn with_test_on_borrow(mut self, enabled: bool) -> Self {
        self.test_on_borrow = enabled;
        self
    }

    pub fn with_test_on_return(mut self, enabled: bool) -> Self {
        self.test_on_return = enabled;
        self
    }

    pub fn with_test_while_idle(mut self, enabled: bool) -> Self {
        self.test_while_idle = enabled;
        self
    }

    /// Bound how long a checkout blocks when the pool is at capacity.
    /// Zero waits indefinitely.
    pub fn with_max_wait(mut self, timeout: Duration) -> Self {
        self.max_wait = Some(timeout);
        self
    }

    pub fn with_min_evictable_idle(mut self, idle: Duration) -> Self {
        self.min_evictable_idle = Some(idle);
        self
    }

    /// Run the background evictor on a fixed period
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.time_between_eviction_runs = Some(interval);
        self
    }

    pub fn with_max_create_attempts(mut self, attempts: usize) -> Self {
        self.max_create_attempts = attempts.max(1);
        self
    }
}

/// Settings for a pooled search data source, as produced by an external loader
///
/// # Examples
///
/// ```
/// use sphinx_pool::DataSourceConfig;
///
/// let config = DataSourceConfig::default()
///     .with_server("search.internal", 9306)
///     .with_options(true, false, 1, Some(4), Some(10));
///
/// assert_eq!(config.endpoint().to_string(), "search.internal:9306");
/// assert_eq!(config.pool_configuration().max_total, Some(10));
/// assert!(!config.pool_configuration().test_on_return);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DataSourceConfig {
    pub host: Option<String>,
    pub port: u16,
    pub test_on_borrow: bool,
    pub test_on_return: bool,
    pub min_idle: usize,
    pub max_idle: Option<usize>,
    pub max_total: Option<usize>,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        let pool = PoolConfiguration::default();
        Self {
            host: None,
            port: DEFAULT_PORT,
            test_on_borrow: true,
            test_on_return: true,
            min_idle: pool.min_idle,
            max_idle: pool.max_idle,
            max_total: pool.max_total,
        }
    }
}

impl DataSourceConfig {
    /// Copy of this config pointing at another server
    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = port;
        self
    }

    /// Copy of this config with other pool options
    pub fn with_options(
        mut self,
        test_on_borrow: bool,
        test_on_return: bool,
        min_idle: usize,
        max_idle: Option<usize>,
        max_total: Option<usize>,
    ) -> Self {
        self.test_on_borrow = test_on_borrow;
        self.test_on_return = test_on_return;
        self.min_idle = min_idle;
        self.max_idle = max_idle;
        self.max_total = max_total;
        self
    }

    /// Server this config connects to, also its registry key
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone().unwrap_or_default(), self.port)
    }

    /// Pool settings with the data source's test flags applied
    pub fn pool_configuration(&self) -> PoolConfiguration {
        PoolConfiguration {
            min_idle: self.min_idle,
            max_idle: self.max_idle,
            max_total: self.max_total.filter(|&max| max > 0),
            test_on_create: false,
            test_on_borrow: self.test_on_borrow,
            test_on_return: self.test_on_return,
            ..PoolConfiguration::default()
        }
    }
}
