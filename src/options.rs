use crate::connector::Connector;
use crate::repository::{Cache, InMemoryCache, Store};
use crate::Client;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration options for the [`Client`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use flagstream::{Client, Connector};
///
/// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
/// let connector: Arc<dyn Connector> = connect();
/// let client = Client::builder(connector)
///     .poll_interval(Duration::from_secs(120))
///     .streaming(false)
///     .build();
/// ```
pub struct Options {
    connector: Arc<dyn Connector>,
    poll_interval: Duration,
    streaming: bool,
    analytics: bool,
    metrics_interval: Duration,
    cache: Box<dyn Cache>,
    store: Option<Box<dyn Store>>,
}

impl Options {
    /// Get the configured [`Connector`].
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Get the configured poll interval.
    pub fn poll_interval(&self) -> &Duration {
        &self.poll_interval
    }

    /// True when the push stream is enabled, otherwise false.
    pub fn streaming(&self) -> bool {
        self.streaming
    }

    /// True when evaluation analytics are enabled, otherwise false.
    pub fn analytics(&self) -> bool {
        self.analytics
    }

    /// Get the configured metrics flush interval.
    pub fn metrics_interval(&self) -> &Duration {
        &self.metrics_interval
    }

    pub(crate) fn take_storage(self) -> (Arc<dyn Connector>, Box<dyn Cache>, Option<Box<dyn Store>>) {
        (self.connector, self.cache, self.store)
    }
}

/// Builder to create [`Options`] used by the [`Client`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use flagstream::{Client, Connector};
///
/// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
/// let connector: Arc<dyn Connector> = connect();
/// let client = Client::builder(connector)
///     .poll_interval(Duration::from_secs(120))
///     .analytics(false)
///     .build();
/// ```
pub struct OptionsBuilder {
    connector: Arc<dyn Connector>,
    poll_interval: Option<Duration>,
    streaming: bool,
    analytics: bool,
    metrics_interval: Option<Duration>,
    cache: Option<Box<dyn Cache>>,
    store: Option<Box<dyn Store>>,
}

impl OptionsBuilder {
    pub(crate) fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            poll_interval: None,
            streaming: true,
            analytics: true,
            metrics_interval: None,
            cache: None,
            store: None,
        }
    }

    /// Set the full-refresh poll interval.
    /// Default value is `60` seconds.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use flagstream::{Client, Connector};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// let builder = Client::builder(connect())
    ///     .poll_interval(Duration::from_secs(120));
    /// ```
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Enable or disable the server-push stream.
    /// Default value is `true`. With streaming disabled the client relies on
    /// polling alone.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use flagstream::{Client, Connector};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// let builder = Client::builder(connect())
    ///     .streaming(false);
    /// ```
    pub fn streaming(mut self, enabled: bool) -> Self {
        self.streaming = enabled;
        self
    }

    /// Enable or disable evaluation analytics.
    /// Default value is `true`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use flagstream::{Client, Connector};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// let builder = Client::builder(connect())
    ///     .analytics(false);
    /// ```
    pub fn analytics(mut self, enabled: bool) -> Self {
        self.analytics = enabled;
        self
    }

    /// Set the metrics flush interval.
    /// Default value is `60` seconds, which is also the minimum; lower values
    /// are clamped up.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use flagstream::{Client, Connector};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// let builder = Client::builder(connect())
    ///     .metrics_interval(Duration::from_secs(300));
    /// ```
    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    /// Set a [`Cache`] implementation used by the repository.
    /// Default is the bounded [`InMemoryCache`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use flagstream::{Client, Connector, InMemoryCache};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// let builder = Client::builder(connect())
    ///     .cache(Box::new(InMemoryCache::with_capacity(500)));
    /// ```
    pub fn cache(mut self, cache: Box<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set a durable [`Store`] implementation backing the cache.
    /// No store is used by default.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use flagstream::{Client, Connector, Entry, Store};
    ///
    /// struct DiskStore {}
    ///
    /// impl Store for DiskStore {
    ///     fn get(&self, key: &str) -> Option<Entry> {
    ///         // read from disk
    ///         None
    ///     }
    ///     fn set(&self, key: &str, entry: Entry) {
    ///         // write to disk
    ///     }
    ///     fn remove(&self, key: &str) {
    ///         // delete from disk
    ///     }
    ///     fn keys(&self) -> Vec<String> {
    ///         Vec::new()
    ///     }
    /// }
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// let builder = Client::builder(connect())
    ///     .store(Box::new(DiskStore {}));
    /// ```
    pub fn store(mut self, store: Box<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Create the [`Client`] from the configuration made on the builder.
    ///
    /// The client starts its background workers immediately; await
    /// [`Client::wait_for_initialization`] before evaluating flags.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use flagstream::{Client, Connector};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// let client = Client::builder(connect()).build();
    /// ```
    pub fn build(self) -> Client {
        Client::with_options(self.build_options())
    }

    pub(crate) fn build_options(self) -> Options {
        Options {
            connector: self.connector,
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            streaming: self.streaming,
            analytics: self.analytics,
            metrics_interval: self.metrics_interval.unwrap_or(DEFAULT_METRICS_INTERVAL),
            cache: self.cache.unwrap_or_else(|| Box::new(InMemoryCache::new())),
            store: self.store,
        }
    }
}
