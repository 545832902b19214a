//! registry
//!
//! Process-wide cache of open repository handles, keyed by canonical
//! [`Location`].
//!
//! # Invariants
//!
//! - At most one open [`RepositoryHandle`] exists per location
//! - Concurrent acquires racing an in-progress open wait for it instead of
//!   opening a second session against the same store
//! - The map lock is held only for bookkeeping; engine opens and closes
//!   always happen outside it
//! - A handle closes when its reference count reaches zero, never earlier
//!
//! # Slots
//!
//! Each location maps to a slot that is either `Pending` (an open or close
//! is running outside the lock) or `Open`. Threads that find a pending slot
//! wait on the registry's condition variable and retry. A failed open
//! removes its slot, so a later waiter becomes the opener.
//!
//! The registry is an owned value, not a global: create one per build (or
//! per test) and share it by cloning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::core::location::Location;
use crate::engine::{self, CloneOptions, EngineError, InitOptions, Session};
use crate::error::GrgitError;
use crate::handle::RepositoryHandle;
use crate::ops::OperationKind;

/// How the first acquire for a location creates its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenStrategy {
    /// Open an existing repository
    Open,
    /// Create a new repository
    Init(InitOptions),
    /// Open, or create the repository if none exists
    OpenOrInit(InitOptions),
    /// Clone `from` into the location
    Clone {
        from: Location,
        options: CloneOptions,
    },
}

impl OpenStrategy {
    /// Clone from a remote with default options.
    pub fn clone_from(from: Location) -> Self {
        OpenStrategy::Clone {
            from,
            options: CloneOptions::default(),
        }
    }

    fn kind(&self) -> OperationKind {
        match self {
            OpenStrategy::Open | OpenStrategy::OpenOrInit(_) => OperationKind::Open,
            OpenStrategy::Init(_) => OperationKind::Init,
            OpenStrategy::Clone { .. } => OperationKind::Clone,
        }
    }

    fn open(&self, location: &Location) -> Result<Session, EngineError> {
        match self {
            OpenStrategy::Open => engine::open_existing(location),
            OpenStrategy::Init(options) => engine::init_new(location, options),
            OpenStrategy::OpenOrInit(options) => match engine::open_existing(location) {
                Err(EngineError::NotARepository) => engine::init_new(location, options),
                other => other,
            },
            OpenStrategy::Clone { from, options } => engine::clone_from(from, location, options),
        }
    }
}

/// Handles closed and failures collected by a drain.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Locations whose handles were closed
    pub closed: Vec<Location>,
    /// Close failures; reported, never re-raised
    pub failures: Vec<GrgitError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Slot {
    Pending,
    Open(Arc<RepositoryHandle>),
}

#[derive(Default)]
struct Shared {
    slots: Mutex<HashMap<Location, Slot>>,
    settled: Condvar,
    engine_opens: AtomicUsize,
}

impl Shared {
    /// Give back one reference; close the handle if it was the last.
    fn release(&self, handle: &Arc<RepositoryHandle>) {
        let location = handle.location();
        let mut slots = self.slots.lock();
        if handle.release_ref() > 0 {
            return;
        }

        let ours = matches!(slots.get(location), Some(Slot::Open(h)) if Arc::ptr_eq(h, handle));
        if !ours {
            // Already drained or replaced; the handle was force-closed.
            return;
        }
        slots.insert(location.clone(), Slot::Pending);
        drop(slots);

        if let Err(err) = handle.close() {
            warn!("closing {} after last release failed: {}", location, err);
        }

        let mut slots = self.slots.lock();
        slots.remove(location);
        self.settled.notify_all();
    }
}

/// Cache of open repository handles.
///
/// Cloning is cheap and shares the same cache.
#[derive(Clone, Default)]
pub struct HandleRegistry {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("open", &self.open_count())
            .finish()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a reference to the handle for `location`, opening it with
    /// `strategy` if no handle is open.
    ///
    /// `strategy` only matters for the first acquire; later acquires share
    /// the open handle.
    ///
    /// # Errors
    ///
    /// - [`GrgitError::Validation`] for a remote location (clone it into a
    ///   local location instead)
    /// - whatever the open, init, or clone reports, e.g.
    ///   [`GrgitError::NotARepository`]
    pub fn acquire(
        &self,
        location: &Location,
        strategy: OpenStrategy,
    ) -> Result<HandleRef, GrgitError> {
        let operation = strategy.kind();
        if location.is_remote() {
            return Err(GrgitError::validation(
                operation,
                location,
                "remote locations cannot be opened; clone into a local location",
            ));
        }

        let mut slots = self.shared.slots.lock();
        loop {
            let existing = match slots.get(location) {
                Some(Slot::Open(handle)) => Some(Arc::clone(handle)),
                Some(Slot::Pending) => {
                    self.shared.settled.wait(&mut slots);
                    continue;
                }
                None => None,
            };

            match existing {
                Some(handle) if handle.is_open() => {
                    handle.acquire_ref();
                    debug!("registry: shared handle for {}", location);
                    return Ok(HandleRef::new(handle, Arc::clone(&self.shared)));
                }
                // Closed behind the registry's back; replace it.
                Some(_) => {
                    slots.remove(location);
                }
                None => {}
            }
            break;
        }

        slots.insert(location.clone(), Slot::Pending);
        drop(slots);

        debug!("registry: {} {}", operation, location);
        let opened = strategy.open(location);
        self.shared.engine_opens.fetch_add(1, Ordering::SeqCst);

        let mut slots = self.shared.slots.lock();
        let result = match opened {
            Ok(session) => {
                let handle = Arc::new(RepositoryHandle::new(location.clone(), session));
                handle.acquire_ref();
                slots.insert(location.clone(), Slot::Open(Arc::clone(&handle)));
                Ok(HandleRef::new(handle, Arc::clone(&self.shared)))
            }
            Err(err) => {
                slots.remove(location);
                Err(err.into_grgit(operation, location))
            }
        };
        self.shared.settled.notify_all();
        result
    }

    /// Whether an open handle exists for `location`.
    pub fn contains(&self, location: &Location) -> bool {
        matches!(self.shared.slots.lock().get(location), Some(Slot::Open(h)) if h.is_open())
    }

    /// Number of open handles.
    pub fn open_count(&self) -> usize {
        self.shared
            .slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Open(h) if h.is_open()))
            .count()
    }

    /// Number of engine open/init/clone calls made so far.
    pub fn engine_opens(&self) -> usize {
        self.shared.engine_opens.load(Ordering::SeqCst)
    }

    /// Force-close every handle, best effort.
    ///
    /// Waits for in-flight opens and closes, empties the cache, then closes
    /// each handle outside the lock. A failure to close one handle is
    /// logged and collected; the rest are still closed. Outstanding
    /// [`HandleRef`]s stay valid to release but every operation through them
    /// fails with a lifecycle error.
    pub fn drain(&self) -> ShutdownReport {
        let handles: Vec<Arc<RepositoryHandle>> = {
            let mut slots = self.shared.slots.lock();
            while slots.values().any(|slot| matches!(slot, Slot::Pending)) {
                self.shared.settled.wait(&mut slots);
            }
            slots
                .drain()
                .filter_map(|(_, slot)| match slot {
                    Slot::Open(handle) => Some(handle),
                    Slot::Pending => None,
                })
                .collect()
        };

        let mut report = ShutdownReport::default();
        for handle in handles {
            match handle.close() {
                Ok(()) => report.closed.push(handle.location().clone()),
                Err(err) => {
                    warn!("failed to close {}: {}", handle.location(), err);
                    report.failures.push(err);
                }
            }
        }
        info!(
            "registry drained: {} closed, {} failed",
            report.closed.len(),
            report.failures.len()
        );
        report
    }
}

/// A counted reference to an open handle.
///
/// Dereferences to [`RepositoryHandle`]. Dropping the reference releases it;
/// [`release`](HandleRef::release) does the same explicitly. Cloning takes
/// another reference.
pub struct HandleRef {
    handle: Arc<RepositoryHandle>,
    shared: Arc<Shared>,
    released: bool,
}

impl HandleRef {
    fn new(handle: Arc<RepositoryHandle>, shared: Arc<Shared>) -> Self {
        Self {
            handle,
            shared,
            released: false,
        }
    }

    /// Give the reference back; the last release closes the handle.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.release(&self.handle);
        }
    }
}

impl std::ops::Deref for HandleRef {
    type Target = RepositoryHandle;

    fn deref(&self) -> &RepositoryHandle {
        &self.handle
    }
}

impl Clone for HandleRef {
    fn clone(&self) -> Self {
        // The count is already positive, so the handle cannot close meanwhile.
        self.handle.acquire_ref();
        Self::new(Arc::clone(&self.handle), Arc::clone(&self.shared))
    }
}

impl Drop for HandleRef {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for HandleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HandleRef").field(&self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::handle::HandleState;
    use tempfile::TempDir;

    fn init_location(dir: &TempDir) -> Location {
        let location = Location::local(dir.path()).unwrap();
        engine::init_new(&location, &InitOptions::default()).unwrap();
        location
    }

    mod acquire {
        use super::*;

        #[test]
        fn shares_one_handle() {
            let dir = TempDir::new().unwrap();
            let location = init_location(&dir);
            let registry = HandleRegistry::new();

            let a = registry.acquire(&location, OpenStrategy::Open).unwrap();
            let b = registry.acquire(&location, OpenStrategy::Open).unwrap();
            assert_eq!(registry.engine_opens(), 1);
            assert_eq!(a.ref_count(), 2);
            assert_eq!(registry.open_count(), 1);

            a.release();
            assert!(b.is_open());
            assert!(registry.contains(&location));

            b.release();
            assert!(!registry.contains(&location));
            assert_eq!(registry.open_count(), 0);
        }

        #[test]
        fn missing_repository() {
            let dir = TempDir::new().unwrap();
            let location = Location::local(dir.path().join("absent")).unwrap();
            let registry = HandleRegistry::new();

            let err = registry.acquire(&location, OpenStrategy::Open).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotARepository);
            assert_eq!(err.location(), Some(&location));
            assert!(!registry.contains(&location));
        }

        #[test]
        fn open_or_init_creates() {
            let dir = TempDir::new().unwrap();
            let location = Location::local(dir.path().join("new")).unwrap();
            let registry = HandleRegistry::new();

            let handle = registry
                .acquire(&location, OpenStrategy::OpenOrInit(InitOptions::default()))
                .unwrap();
            assert!(dir.path().join("new/.git").exists());
            handle.release();
        }

        #[test]
        fn remote_location_rejected() {
            let registry = HandleRegistry::new();
            let location = Location::remote("https://example.com/r.git").unwrap();
            let err = registry.acquire(&location, OpenStrategy::Open).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        #[test]
        fn reopens_after_close() {
            let dir = TempDir::new().unwrap();
            let location = init_location(&dir);
            let registry = HandleRegistry::new();

            registry.acquire(&location, OpenStrategy::Open).unwrap().release();
            let again = registry.acquire(&location, OpenStrategy::Open).unwrap();
            assert!(again.is_open());
            assert_eq!(registry.engine_opens(), 2);
        }
    }

    mod release {
        use super::*;

        #[test]
        fn drop_releases() {
            let dir = TempDir::new().unwrap();
            let location = init_location(&dir);
            let registry = HandleRegistry::new();

            let handle = registry.acquire(&location, OpenStrategy::Open).unwrap();
            let raw = Arc::clone(&handle.handle);
            drop(handle);
            assert_eq!(raw.state(), HandleState::Closed);
        }

        #[test]
        fn clone_counts() {
            let dir = TempDir::new().unwrap();
            let location = init_location(&dir);
            let registry = HandleRegistry::new();

            let a = registry.acquire(&location, OpenStrategy::Open).unwrap();
            let b = a.clone();
            assert_eq!(a.ref_count(), 2);
            drop(a);
            assert!(b.is_open());
            drop(b);
            assert!(!registry.contains(&location));
        }
    }

    mod drain {
        use super::*;

        #[test]
        fn closes_everything() {
            let one = TempDir::new().unwrap();
            let two = TempDir::new().unwrap();
            let registry = HandleRegistry::new();

            let a = registry.acquire(&init_location(&one), OpenStrategy::Open).unwrap();
            let b = registry.acquire(&init_location(&two), OpenStrategy::Open).unwrap();

            let report = registry.drain();
            assert_eq!(report.closed.len(), 2);
            assert!(report.is_clean());
            assert_eq!(a.state(), HandleState::Closed);
            assert_eq!(b.status().unwrap_err().kind(), ErrorKind::Lifecycle);

            // Releasing after a drain is a no-op, not a second close.
            a.release();
            b.release();
            assert_eq!(registry.open_count(), 0);
        }

        #[test]
        fn collects_failures_and_continues() {
            let one = TempDir::new().unwrap();
            let two = TempDir::new().unwrap();
            let registry = HandleRegistry::new();

            let a = registry.acquire(&init_location(&one), OpenStrategy::Open).unwrap();
            let _b = registry.acquire(&init_location(&two), OpenStrategy::Open).unwrap();
            // Invalidate one handle behind the registry's back.
            a.close().unwrap();

            let report = registry.drain();
            assert_eq!(report.closed.len(), 1);
            assert_eq!(report.failures.len(), 1);
            assert_eq!(report.failures[0].kind(), ErrorKind::Lifecycle);
        }
    }
}
