//! handle
//!
//! The repository handle: one open engine session bound to one [`Location`].
//!
//! # State machine
//!
//! ```text
//! Open --(last release | forced shutdown)--> Closing --(session freed)--> Closed
//! ```
//!
//! `Closed` is terminal. Any operation attempted while the handle is not
//! `Open` fails with a lifecycle error naming the location and state.
//!
//! # Concurrency
//!
//! Every operation holds the handle's session lock for its whole run, so
//! operations on one handle are fully serialized: ref updates never
//! interleave and readers never see a torn ref set. Closing takes the same
//! lock, so an in-flight operation always finishes before its session is
//! released.
//!
//! Lock order is session, then state. `close` never holds the state lock
//! while waiting for the session lock.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use parking_lot::Mutex;

use crate::core::location::Location;
use crate::core::types::{Branch, Commit, CommitId, DiffEntry, Ref, Status, Tag};
use crate::engine::{close_session, Session};
use crate::error::GrgitError;
use crate::ops::*;

/// Lifecycle state of a [`RepositoryHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Open,
    Closing,
    Closed,
}

impl std::fmt::Display for HandleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            HandleState::Open => "open",
            HandleState::Closing => "closing",
            HandleState::Closed => "closed",
        };
        f.write_str(text)
    }
}

/// A shared, lifecycle-tracked binding to one open repository.
///
/// Handles are created by the [`HandleRegistry`](crate::registry::HandleRegistry)
/// and reached through [`HandleRef`](crate::registry::HandleRef)s; the
/// reference count here is the registry's bookkeeping.
pub struct RepositoryHandle {
    location: Location,
    state: Mutex<HandleState>,
    session: Mutex<Option<Session>>,
    refs: AtomicUsize,
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("location", &self.location)
            .field("state", &self.state())
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl RepositoryHandle {
    pub(crate) fn new(location: Location, session: Session) -> Self {
        info!("opened repository handle for {}", location);
        Self {
            location,
            state: Mutex::new(HandleState::Open),
            session: Mutex::new(Some(session)),
            refs: AtomicUsize::new(0),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn state(&self) -> HandleState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == HandleState::Open
    }

    /// Number of live references handed out by the registry.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }

    /// Increment the reference count, returning the new count.
    pub(crate) fn acquire_ref(&self) -> usize {
        self.refs.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement the reference count, returning what remains.
    pub(crate) fn release_ref(&self) -> usize {
        let previous = self
            .refs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// Run an operation: lifecycle check, validation, then execution under
    /// the session lock.
    ///
    /// # Errors
    ///
    /// - [`GrgitError::Lifecycle`] if the handle is not open
    /// - [`GrgitError::Validation`] if the options are rejected; nothing is
    ///   touched in that case
    /// - any classified engine failure, tagged with the operation and location
    pub fn run<O: Operation>(&self, op: O) -> Result<O::Output, GrgitError> {
        let state = self.state();
        if state != HandleState::Open {
            return Err(GrgitError::lifecycle(O::KIND, &self.location, state));
        }
        op.validate()
            .map_err(|message| GrgitError::validation(O::KIND, &self.location, message))?;

        let mut guard = self.session.lock();
        // A close may have completed while we waited for the lock.
        let state = self.state();
        let session = match guard.as_mut() {
            Some(session) if state == HandleState::Open => session,
            _ => return Err(GrgitError::lifecycle(O::KIND, &self.location, state)),
        };

        let access = if O::KIND.is_mutating() { "write" } else { "read" };
        debug!("{} ({}) on {}", O::KIND, access, self.location);
        op.execute(session)
            .map_err(|e| e.into_grgit(O::KIND, &self.location))
    }

    /// Close the handle, waiting for any in-flight operation to finish.
    ///
    /// Only the registry calls this: when the last reference is released or
    /// on forced shutdown. A reference holder never closes a shared handle.
    ///
    /// # Errors
    ///
    /// - [`GrgitError::Lifecycle`] if the handle is already closing or closed
    pub(crate) fn close(&self) -> Result<(), GrgitError> {
        {
            let mut state = self.state.lock();
            match *state {
                HandleState::Open => *state = HandleState::Closing,
                other => {
                    return Err(GrgitError::lifecycle(
                        OperationKind::Close,
                        &self.location,
                        other,
                    ))
                }
            }
        }

        let session = self.session.lock().take();
        if let Some(session) = session {
            close_session(session);
        }
        *self.state.lock() = HandleState::Closed;
        info!("closed repository handle for {}", self.location);
        Ok(())
    }

    // =========================================================================
    // Typed operations
    // =========================================================================

    pub fn add(&self, options: AddOptions) -> Result<(), GrgitError> {
        self.run(options)
    }

    pub fn remove(&self, options: RemoveOptions) -> Result<Vec<String>, GrgitError> {
        self.run(options)
    }

    pub fn commit(&self, options: CommitOptions) -> Result<Commit, GrgitError> {
        self.run(options)
    }

    pub fn branch_list(&self, mode: BranchMode) -> Result<Vec<Branch>, GrgitError> {
        self.run(BranchList::new(mode))
    }

    pub fn branch_add(&self, options: BranchAdd) -> Result<Branch, GrgitError> {
        self.run(options)
    }

    pub fn branch_remove(&self, options: BranchRemove) -> Result<Vec<String>, GrgitError> {
        self.run(options)
    }

    pub fn branch_status(&self, name: &str) -> Result<TrackingStatus, GrgitError> {
        self.run(BranchStatus::new(name))
    }

    pub fn checkout(&self, options: CheckoutOptions) -> Result<Branch, GrgitError> {
        self.run(options)
    }

    pub fn tag_list(&self) -> Result<Vec<Tag>, GrgitError> {
        self.run(TagList)
    }

    pub fn tag_add(&self, options: TagAdd) -> Result<Tag, GrgitError> {
        self.run(options)
    }

    pub fn tag_remove(&self, options: TagRemove) -> Result<Vec<String>, GrgitError> {
        self.run(options)
    }

    pub fn fetch(&self, options: FetchOptions) -> Result<FetchSummary, GrgitError> {
        self.run(options)
    }

    pub fn push(&self, options: PushOptions) -> Result<PushSummary, GrgitError> {
        self.run(options)
    }

    pub fn pull(&self, options: PullOptions) -> Result<PullOutcome, GrgitError> {
        self.run(options)
    }

    pub fn ls_remote(&self, options: LsRemoteOptions) -> Result<Vec<Ref>, GrgitError> {
        self.run(options)
    }

    pub fn remote_list(&self) -> Result<Vec<RemoteInfo>, GrgitError> {
        self.run(RemoteList)
    }

    pub fn remote_add(&self, options: RemoteAdd) -> Result<RemoteInfo, GrgitError> {
        self.run(options)
    }

    pub fn merge(&self, options: MergeOptions) -> Result<MergeOutcome, GrgitError> {
        self.run(options)
    }

    pub fn merge_abort(&self) -> Result<(), GrgitError> {
        self.run(MergeAbort)
    }

    pub fn rebase(&self, options: RebaseOptions) -> Result<RebaseOutcome, GrgitError> {
        self.run(options)
    }

    pub fn rebase_abort(&self) -> Result<(), GrgitError> {
        self.run(RebaseAbort)
    }

    pub fn reset(&self, options: ResetOptions) -> Result<Commit, GrgitError> {
        self.run(options)
    }

    pub fn log(&self, options: LogOptions) -> Result<Vec<Commit>, GrgitError> {
        self.run(options)
    }

    pub fn diff(&self, options: DiffOptions) -> Result<Vec<DiffEntry>, GrgitError> {
        self.run(options)
    }

    pub fn status(&self) -> Result<Status, GrgitError> {
        self.run(StatusOptions)
    }

    pub fn describe(&self, options: DescribeOptions) -> Result<Option<String>, GrgitError> {
        self.run(options)
    }

    pub fn resolve(&self, revision: &str) -> Result<Commit, GrgitError> {
        self.run(ResolveRevision::new(revision))
    }

    pub fn head(&self) -> Result<Ref, GrgitError> {
        self.run(HeadQuery)
    }

    pub fn stash_save(&self, options: StashSave) -> Result<Option<CommitId>, GrgitError> {
        self.run(options)
    }

    pub fn stash_list(&self) -> Result<Vec<StashEntry>, GrgitError> {
        self.run(StashList)
    }

    pub fn stash_apply(&self, options: StashApply) -> Result<(), GrgitError> {
        self.run(options)
    }

    pub fn stash_drop(&self, index: usize) -> Result<(), GrgitError> {
        self.run(StashDrop::new(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{init_new, InitOptions};
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn handle(dir: &TempDir) -> RepositoryHandle {
        let location = Location::local(dir.path()).unwrap();
        let session = init_new(&location, &InitOptions::default()).unwrap();
        RepositoryHandle::new(location, session)
    }

    mod state {
        use super::*;

        #[test]
        fn starts_open() {
            let dir = TempDir::new().unwrap();
            let h = handle(&dir);
            assert_eq!(h.state(), HandleState::Open);
            assert_eq!(h.ref_count(), 0);
        }

        #[test]
        fn close_is_terminal() {
            let dir = TempDir::new().unwrap();
            let h = handle(&dir);
            h.close().unwrap();
            assert_eq!(h.state(), HandleState::Closed);

            let err = h.close().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Lifecycle);
            assert_eq!(err.operation(), Some(OperationKind::Close));
        }

        #[test]
        fn operations_after_close_fail() {
            let dir = TempDir::new().unwrap();
            let h = handle(&dir);
            h.close().unwrap();

            let err = h.status().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Lifecycle);
            assert!(err.to_string().contains("closed"));
        }

        #[test]
        fn display() {
            assert_eq!(HandleState::Closing.to_string(), "closing");
        }
    }

    mod refs {
        use super::*;

        #[test]
        fn counting() {
            let dir = TempDir::new().unwrap();
            let h = handle(&dir);
            assert_eq!(h.acquire_ref(), 1);
            assert_eq!(h.acquire_ref(), 2);
            assert_eq!(h.release_ref(), 1);
            assert_eq!(h.release_ref(), 0);
            assert_eq!(h.release_ref(), 0);
        }
    }

    mod run {
        use super::*;

        #[test]
        fn validation_happens_before_engine() {
            let dir = TempDir::new().unwrap();
            let h = handle(&dir);
            let err = h.commit(CommitOptions::new("")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert_eq!(err.operation(), Some(OperationKind::Commit));
            assert_eq!(err.location(), Some(h.location()));
        }

        #[test]
        fn lifecycle_checked_before_validation() {
            let dir = TempDir::new().unwrap();
            let h = handle(&dir);
            h.close().unwrap();
            let err = h.commit(CommitOptions::new("")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Lifecycle);
        }

        #[test]
        fn empty_repository_queries() {
            let dir = TempDir::new().unwrap();
            let h = handle(&dir);
            assert!(h.log(LogOptions::default()).unwrap().is_empty());
            assert!(h.status().unwrap().is_clean());
            assert!(h.head().unwrap().target.is_none());
        }
    }
}
