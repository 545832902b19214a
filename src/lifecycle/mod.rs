//! lifecycle
//!
//! Binds the handle registry to the host build's phases.
//!
//! # Architecture
//!
//! The host build exposes a [`BuildHost`] that publishes [`BuildEvent`]s.
//! [`LifecycleService::register`] subscribes once; when the host fires
//! [`BuildEvent::Finished`] (success, failure, or cancellation alike) the
//! service drains the registry, force-closing every handle still open.
//!
//! ```text
//! host: Started -> tasks acquire/release handles -> Finished
//!                                                     |
//!                                      LifecycleService::shutdown
//!                                                     |
//!                                          HandleRegistry::drain
//! ```
//!
//! # Invariants
//!
//! - Shutdown runs exactly once; later calls return an empty report
//! - Close failures during shutdown are logged and reported, never raised
//! - After shutdown every acquire fails with a lifecycle error
//! - Dropping the service without a `Finished` event still shuts down
//!
//! [`EventBus`] is a small in-process host for the CLI and for tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::core::config::{Config, RepositorySelection};
use crate::core::credentials::{CredentialSource, Credentials};
use crate::core::location::Location;
use crate::engine::{self, InitOptions};
use crate::error::GrgitError;
use crate::handle::HandleState;
use crate::ops::OperationKind;
use crate::registry::{HandleRef, HandleRegistry, OpenStrategy};

pub use crate::registry::ShutdownReport;

/// How the host build ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    Failure { message: String },
    Cancelled,
}

/// Host build phase notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Started,
    Finished { outcome: BuildOutcome },
}

/// Receives host build events.
pub trait BuildListener: Send + Sync {
    fn on_event(&self, event: &BuildEvent);
}

/// Identifies one subscription on a [`BuildHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A host build that publishes phase events.
pub trait BuildHost {
    fn subscribe(&self, listener: Arc<dyn BuildListener>) -> SubscriptionId;

    /// Remove a subscription. Returns `false` if it was already gone.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// In-process [`BuildHost`].
///
/// `finish` publishes [`BuildEvent::Finished`] at most once.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn BuildListener>)>>,
    next_id: AtomicU64,
    finished: Mutex<bool>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.publish(&BuildEvent::Started);
    }

    /// Publish the completion event. Returns `false` if already published.
    pub fn finish(&self, outcome: BuildOutcome) -> bool {
        {
            let mut finished = self.finished.lock();
            if *finished {
                return false;
            }
            *finished = true;
        }
        self.publish(&BuildEvent::Finished { outcome });
        true
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn publish(&self, event: &BuildEvent) {
        // Listeners run outside the lock so they may unsubscribe.
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener.on_event(event);
        }
    }
}

impl BuildHost for EventBus {
    fn subscribe(&self, listener: Arc<dyn BuildListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

struct Inner {
    config: Config,
    registry: HandleRegistry,
    credentials: Box<dyn CredentialSource>,
    /// `true` once shutdown has started
    shut_down: RwLock<bool>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl Inner {
    fn shutdown(&self) -> ShutdownReport {
        // Holding the write lock keeps acquires out until the drain is done.
        let mut shut_down = self.shut_down.write();
        if *shut_down {
            return ShutdownReport::default();
        }
        *shut_down = true;

        let report = self.registry.drain();
        for failure in &report.failures {
            warn!("shutdown: {}", failure);
        }
        info!(
            "shutdown complete: {} handle(s) closed, {} failure(s)",
            report.closed.len(),
            report.failures.len()
        );
        report
    }
}

/// Listener registered with the host; holds the service weakly so the host
/// does not keep it alive.
struct ServiceListener(Weak<Inner>);

impl BuildListener for ServiceListener {
    fn on_event(&self, event: &BuildEvent) {
        let Some(inner) = self.0.upgrade() else {
            return;
        };
        match event {
            BuildEvent::Started => debug!("build started"),
            BuildEvent::Finished { outcome } => {
                debug!("build finished: {:?}", outcome);
                inner.shutdown();
            }
        }
    }
}

/// Orchestrates acquire, release, and shutdown across a host build.
pub struct LifecycleService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleService")
            .field("root_dir", &self.inner.config.root_dir())
            .field("registry", &self.inner.registry)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl LifecycleService {
    pub fn new(
        config: Config,
        registry: HandleRegistry,
        credentials: impl CredentialSource + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                credentials: Box::new(credentials),
                shut_down: RwLock::new(false),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Service with a fresh registry and the configured environment
    /// credentials.
    pub fn from_config(config: Config) -> Self {
        let credentials = config.credential_source();
        Self::new(config, HandleRegistry::new(), credentials)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.inner.registry
    }

    /// Credentials for an authenticated transport, if the host supplies any.
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.credentials.credentials()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shut_down.read()
    }

    /// Subscribe to `host`'s events. Registering twice is a no-op.
    pub fn register(&self, host: &dyn BuildHost) {
        let mut subscription = self.inner.subscription.lock();
        if subscription.is_some() {
            return;
        }
        let listener = Arc::new(ServiceListener(Arc::downgrade(&self.inner)));
        *subscription = Some(host.subscribe(listener));
        debug!("lifecycle service registered with host");
    }

    /// Drop the subscription made by [`register`](Self::register).
    /// Safe to call any number of times.
    pub fn unregister(&self, host: &dyn BuildHost) {
        if let Some(id) = self.inner.subscription.lock().take() {
            host.unsubscribe(id);
        }
    }

    /// Acquire the build's default repository.
    ///
    /// The configured directory is opened exactly (initialized first when
    /// `init_if_not_exists` is set); a configured current directory is
    /// searched upward for a repository instead.
    pub fn acquire(&self) -> Result<HandleRef, GrgitError> {
        match self.inner.config.default_repository() {
            RepositorySelection::Discover(dir) => {
                let start = Location::local(&dir)?;
                self.ensure_running(&start)?;
                let location = engine::discover(&dir)
                    .map_err(|e| e.into_grgit(OperationKind::Open, &start))?;
                self.acquire_at(&location, OpenStrategy::Open)
            }
            RepositorySelection::Exact {
                dir,
                init_if_missing,
            } => {
                let location = Location::local(&dir)?;
                let strategy = if init_if_missing {
                    OpenStrategy::OpenOrInit(InitOptions::default())
                } else {
                    OpenStrategy::Open
                };
                self.acquire_at(&location, strategy)
            }
        }
    }

    /// Acquire the handle for `location`.
    ///
    /// # Errors
    ///
    /// - [`GrgitError::Lifecycle`] after shutdown
    /// - anything [`HandleRegistry::acquire`] reports
    pub fn acquire_at(
        &self,
        location: &Location,
        strategy: OpenStrategy,
    ) -> Result<HandleRef, GrgitError> {
        let shut_down = self.inner.shut_down.read();
        if *shut_down {
            return Err(closed(location));
        }
        self.inner.registry.acquire(location, strategy)
    }

    /// Force-close every open handle. Runs once; later calls return an
    /// empty report.
    pub fn shutdown(&self) -> ShutdownReport {
        self.inner.shutdown()
    }

    fn ensure_running(&self, location: &Location) -> Result<(), GrgitError> {
        if self.is_shut_down() {
            return Err(closed(location));
        }
        Ok(())
    }
}

fn closed(location: &Location) -> GrgitError {
    GrgitError::lifecycle(OperationKind::Acquire, location, HandleState::Closed)
}

impl Drop for LifecycleService {
    fn drop(&mut self) {
        if !self.is_shut_down() {
            debug!("lifecycle service dropped before build finished; shutting down");
            self.inner.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::StaticCredentials;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> LifecycleService {
        let config = Config::with_root(dir.path()).with_init_if_not_exists(true);
        LifecycleService::new(config, HandleRegistry::new(), StaticCredentials::new(None))
    }

    mod events {
        use super::*;

        #[test]
        fn register_is_idempotent() {
            let dir = TempDir::new().unwrap();
            let bus = EventBus::new();
            let svc = service(&dir);

            svc.register(&bus);
            svc.register(&bus);
            assert_eq!(bus.listener_count(), 1);

            svc.unregister(&bus);
            svc.unregister(&bus);
            assert_eq!(bus.listener_count(), 0);
        }

        #[test]
        fn finish_fires_once() {
            let bus = EventBus::new();
            assert!(bus.finish(BuildOutcome::Success));
            assert!(!bus.finish(BuildOutcome::Cancelled));
        }

        #[test]
        fn finished_event_shuts_down() {
            let dir = TempDir::new().unwrap();
            let bus = EventBus::new();
            let svc = service(&dir);
            svc.register(&bus);

            let handle = svc.acquire().unwrap();
            bus.start();
            assert!(!svc.is_shut_down());

            bus.finish(BuildOutcome::Failure {
                message: "task failed".into(),
            });
            assert!(svc.is_shut_down());
            assert_eq!(handle.state(), HandleState::Closed);
        }

        #[test]
        fn dropped_service_ignores_events() {
            let dir = TempDir::new().unwrap();
            let bus = EventBus::new();
            {
                let svc = service(&dir);
                svc.register(&bus);
            }
            bus.finish(BuildOutcome::Success);
        }
    }

    mod acquire {
        use super::*;

        #[test]
        fn default_repository_initialized() {
            let dir = TempDir::new().unwrap();
            let svc = service(&dir);
            let handle = svc.acquire().unwrap();
            assert!(dir.path().join(".git").exists());
            assert_eq!(handle.location(), &Location::local(dir.path()).unwrap());
        }

        #[test]
        fn default_repository_missing() {
            let dir = TempDir::new().unwrap();
            let config = Config::with_root(dir.path());
            let svc =
                LifecycleService::new(config, HandleRegistry::new(), StaticCredentials::new(None));
            let err = svc.acquire().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotARepository);
        }

        #[test]
        fn discovers_from_current_dir() {
            let dir = TempDir::new().unwrap();
            let root = Location::local(dir.path()).unwrap();
            engine::init_new(&root, &InitOptions::default()).unwrap();
            let nested = dir.path().join("sub/dir");
            std::fs::create_dir_all(&nested).unwrap();

            let config = Config::with_root(dir.path()).with_current_dir(&nested);
            let svc =
                LifecycleService::new(config, HandleRegistry::new(), StaticCredentials::new(None));
            let handle = svc.acquire().unwrap();
            assert_eq!(handle.location(), &root);
        }

        #[test]
        fn refused_after_shutdown() {
            let dir = TempDir::new().unwrap();
            let svc = service(&dir);
            svc.shutdown();
            let err = svc.acquire().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Lifecycle);
            assert_eq!(err.operation(), Some(OperationKind::Acquire));
        }
    }

    mod shutdown {
        use super::*;

        #[test]
        fn runs_once() {
            let dir = TempDir::new().unwrap();
            let svc = service(&dir);
            let _handle = svc.acquire().unwrap();

            let first = svc.shutdown();
            assert_eq!(first.closed.len(), 1);
            let second = svc.shutdown();
            assert!(second.closed.is_empty());
            assert!(second.is_clean());
        }

        #[test]
        fn drop_closes_handles() {
            let dir = TempDir::new().unwrap();
            let handle = {
                let svc = service(&dir);
                svc.acquire().unwrap()
            };
            assert_eq!(handle.state(), HandleState::Closed);
        }

        #[test]
        fn credentials_come_from_source() {
            let dir = TempDir::new().unwrap();
            let svc = LifecycleService::new(
                Config::with_root(dir.path()),
                HandleRegistry::new(),
                StaticCredentials::new(Some(Credentials::new("ci", Some("token".into())))),
            );
            assert_eq!(svc.credentials().map(|c| c.username), Some("ci".to_string()));
        }
    }
}
