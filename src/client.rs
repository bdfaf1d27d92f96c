use crate::connector::Connector;
use crate::errors::{ClientError, ErrorKind};
use crate::eval::evaluator::Evaluator;
use crate::metrics::{self, MetricsProcessor};
use crate::model::config::Variation;
use crate::options::{Options, OptionsBuilder};
use crate::repository::Repository;
use crate::sync::{poller, streamer, with_retry, SyncState};
use crate::target::Target;
use crate::value::ValuePrimitive;
use log::{debug, warn};
use std::any::type_name;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The main component for evaluating feature flags.
///
/// Evaluation calls are synchronous and only read the local replica kept fresh
/// by the background workers; they never block on network I/O.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use flagstream::{Client, Connector, Target};
///
/// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
/// #[tokio::main]
/// async fn main() {
///     let client = Client::builder(connect()).build();
///     client.wait_for_initialization().await;
///
///     let target = Target::new("user-id");
///     let enabled = client.bool_variation("flag-id", &target, false);
///
///     client.close().await;
/// }
/// ```
pub struct Client {
    connector: Arc<dyn Connector>,
    repository: Arc<Repository>,
    evaluator: Evaluator,
    metrics: Option<Arc<MetricsProcessor>>,
    state: Arc<SyncState>,
    token: CancellationToken,
    init_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Creates a new [`OptionsBuilder`] used to build a [`Client`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use flagstream::{Client, Connector};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// let client = Client::builder(connect())
    ///     .poll_interval(Duration::from_secs(120))
    ///     .build();
    /// ```
    pub fn builder(connector: Arc<dyn Connector>) -> OptionsBuilder {
        OptionsBuilder::new(connector)
    }

    /// Creates a new [`Client`] with default options.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use flagstream::{Client, Connector};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// let client = Client::new(connect());
    /// ```
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        OptionsBuilder::new(connector).build()
    }

    pub(crate) fn with_options(options: Options) -> Self {
        let poll_interval = *options.poll_interval();
        let metrics_interval = *options.metrics_interval();
        let streaming = options.streaming();
        let analytics = options.analytics();
        let (connector, cache, store) = options.take_storage();

        let repository = Arc::new(Repository::new(cache, store));
        let evaluator = Evaluator::new(Arc::clone(&repository));
        let state = Arc::new(SyncState::new());
        let token = CancellationToken::new();
        let metrics = analytics.then(|| Arc::new(MetricsProcessor::new()));

        let init_handle = {
            let connector = Arc::clone(&connector);
            let repository = Arc::clone(&repository);
            let state = Arc::clone(&state);
            let token = token.clone();
            let metrics = metrics.clone();
            tokio::spawn(async move {
                match with_retry("authentication", || connector.authenticate()).await {
                    Ok(auth) => {
                        debug!("Authenticated against environment '{}'", auth.environment);
                    }
                    Err(err) => {
                        // Degraded mode: waiters are released and every
                        // evaluation serves the caller-provided default.
                        warn!(event_id = ErrorKind::AuthenticationFailure.as_u16(); "Authentication failed: {err}, defaults will be served");
                        state.set_ready();
                        return;
                    }
                }

                // Initial full load before the stream can pause the poller;
                // on failure the poller retries on its regular schedule.
                match poller::refresh(&connector, &repository).await {
                    Ok(()) => {
                        debug!("Initial data load completed");
                        state.set_ready();
                    }
                    Err(err) => {
                        warn!(event_id = ErrorKind::SyncFailure.as_u16(); "Initial data load failed: {err}");
                    }
                }

                let mut workers = Vec::new();
                workers.push(poller::start(
                    Arc::clone(&connector),
                    Arc::clone(&repository),
                    Arc::clone(&state),
                    poll_interval,
                    token.clone(),
                ));
                if streaming {
                    workers.push(streamer::start(
                        Arc::clone(&connector),
                        repository,
                        state,
                        token.clone(),
                    ));
                }
                if let Some(processor) = metrics {
                    workers.push(metrics::start(
                        processor,
                        connector,
                        metrics_interval,
                        token.clone(),
                    ));
                }
                for worker in workers {
                    let _ = worker.await;
                }
            })
        };

        Self {
            connector,
            repository,
            evaluator,
            metrics,
            state,
            token,
            init_handle: Mutex::new(Some(init_handle)),
        }
    }

    /// Asynchronously waits until the client has completed its first
    /// successful data synchronization (or entered degraded mode after an
    /// authentication failure). Returns immediately once either has happened;
    /// callers wanting a bound should wrap this in [`tokio::time::timeout`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use flagstream::{Client, Connector};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new(connect());
    ///     client.wait_for_initialization().await;
    /// }
    /// ```
    pub async fn wait_for_initialization(&self) {
        self.state.wait_ready().await;
    }

    /// Returns `true` once the client has completed its first successful data
    /// synchronization, otherwise `false`. The flag never reverts, even when
    /// the data paths degrade later.
    pub fn is_initialized(&self) -> bool {
        self.state.is_ready()
    }

    /// Evaluates a boolean flag for the given target.
    ///
    /// Returns `default` if the flag doesn't exist, isn't a boolean flag, or
    /// its evaluation failed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use flagstream::{Client, Connector, Target};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// # #[tokio::main]
    /// # async fn main() {
    /// let client = Client::new(connect());
    /// let target = Target::new("user-id");
    /// let enabled = client.bool_variation("flag-id", &target, false);
    /// # }
    /// ```
    pub fn bool_variation(&self, identifier: &str, target: &Target, default: bool) -> bool {
        self.variation(identifier, target, default)
    }

    /// Evaluates a text flag for the given target.
    ///
    /// Returns `default` if the flag doesn't exist, isn't a text flag, or its
    /// evaluation failed.
    pub fn string_variation(&self, identifier: &str, target: &Target, default: &str) -> String {
        self.variation(identifier, target, default.to_owned())
    }

    /// Evaluates a whole-number flag for the given target.
    ///
    /// Returns `default` if the flag doesn't exist, isn't a whole-number flag,
    /// or its evaluation failed.
    pub fn int_variation(&self, identifier: &str, target: &Target, default: i64) -> i64 {
        self.variation(identifier, target, default)
    }

    /// Evaluates a decimal-number flag for the given target.
    ///
    /// Returns `default` if the flag doesn't exist, isn't a decimal-number
    /// flag, or its evaluation failed.
    pub fn number_variation(&self, identifier: &str, target: &Target, default: f64) -> f64 {
        self.variation(identifier, target, default)
    }

    /// Evaluates a JSON flag for the given target.
    ///
    /// Returns `default` if the flag doesn't exist, isn't a JSON flag, or its
    /// evaluation failed.
    pub fn json_variation(
        &self,
        identifier: &str,
        target: &Target,
        default: serde_json::Value,
    ) -> serde_json::Value {
        self.variation(identifier, target, default)
    }

    /// Shuts the client down: stops the background workers, flushes pending
    /// metrics, and releases the durable store if one is configured.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use flagstream::{Client, Connector};
    ///
    /// # fn connect() -> Arc<dyn Connector> { unimplemented!() }
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new(connect());
    ///     client.close().await;
    /// }
    /// ```
    pub async fn close(&self) {
        self.token.cancel();
        let handle = self.init_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        if let Some(metrics) = self.metrics.as_ref() {
            if metrics.has_pending() {
                metrics.flush(&self.connector).await;
            }
        }
        self.repository.close();
    }

    fn variation<T: ValuePrimitive + Clone>(
        &self,
        identifier: &str,
        target: &Target,
        default: T,
    ) -> T {
        let served = self.evaluator.evaluate(identifier, target);
        if served.is_empty() {
            let err = if self.repository.get_flag(identifier).is_none() {
                ClientError::new(
                    ErrorKind::FlagNotFound,
                    format!("Flag '{identifier}' was not found, returning the provided default"),
                )
            } else {
                ClientError::new(
                    ErrorKind::VariationNotFound,
                    format!("No variation could be resolved for flag '{identifier}', returning the provided default"),
                )
            };
            warn!(event_id = err.kind.as_u16(); "{err}");
            return default;
        }
        // A served variation counts as an evaluation even when the typed read
        // below falls back to the default.
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.enqueue(target, identifier, &served);
        }
        match self.typed_value(identifier, &served) {
            Some(value) => value,
            None => {
                let err = ClientError::new(
                    ErrorKind::VariationTypeMismatch,
                    format!(
                        "The value '{}' served for flag '{identifier}' does not match the requested type '{}', returning the provided default",
                        served.value,
                        type_name::<T>()
                    ),
                );
                warn!(event_id = err.kind.as_u16(); "{err}");
                default
            }
        }
    }

    // The flag is re-read for its declared kind; the variation alone carries an
    // untyped textual value.
    fn typed_value<T: ValuePrimitive>(&self, identifier: &str, served: &Variation) -> Option<T> {
        let flag = self.repository.get_flag(identifier)?;
        let value = served.typed_value(&flag.kind)?;
        T::from_value(&value)
    }
}
