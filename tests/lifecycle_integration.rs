//! Integration tests for the handle registry and the lifecycle service.
//!
//! These cover the sharing and shutdown guarantees: one engine session per
//! location no matter how many tasks ask, and every handle closed when the
//! build finishes.

use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;

use grgit::core::config::Config;
use grgit::core::credentials::StaticCredentials;
use grgit::core::location::Location;
use grgit::engine::InitOptions;
use grgit::lifecycle::{BuildOutcome, EventBus};
use grgit::ops::LogOptions;
use grgit::{ErrorKind, HandleRegistry, HandleState, LifecycleService, OpenStrategy};

// =============================================================================
// Test Fixtures
// =============================================================================

fn init_repo(dir: &Path) -> Location {
    git2::Repository::init(dir).unwrap();
    Location::local(dir).unwrap()
}

fn service_for(dir: &Path) -> LifecycleService {
    let config = Config::load_with_env(dir, &|_| None)
        .unwrap()
        .with_directory(dir);
    LifecycleService::new(config, HandleRegistry::new(), StaticCredentials::new(None))
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn concurrent_acquires_open_one_session() {
    let dir = TempDir::new().unwrap();
    let location = init_repo(dir.path());
    let registry = HandleRegistry::new();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let registry = registry.clone();
            let location = location.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let repo = registry.acquire(&location, OpenStrategy::Open).unwrap();
                repo.status().unwrap();
                repo
            })
        })
        .collect();

    let refs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(registry.engine_opens(), 1);
    assert_eq!(registry.open_count(), 1);
    assert_eq!(refs[0].ref_count(), threads);

    drop(refs);
    assert_eq!(registry.open_count(), 0);
}

#[test]
fn equivalent_paths_share_a_handle() {
    let dir = TempDir::new().unwrap();
    let location = init_repo(dir.path());
    let registry = HandleRegistry::new();

    let a = registry.acquire(&location, OpenStrategy::Open).unwrap();
    let aliased = Location::local(dir.path().join("sub/..")).unwrap();
    let b = registry.acquire(&aliased, OpenStrategy::Open).unwrap();

    assert_eq!(registry.engine_opens(), 1);
    assert_eq!(a.location(), b.location());
}

#[test]
fn plain_directory_is_not_a_repository() {
    let dir = TempDir::new().unwrap();
    let registry = HandleRegistry::new();
    let location = Location::local(dir.path()).unwrap();

    let err = registry.acquire(&location, OpenStrategy::Open).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotARepository);
    assert_eq!(registry.open_count(), 0);
}

#[test]
fn operations_after_close_fail_with_lifecycle_error() {
    let dir = TempDir::new().unwrap();
    let location = init_repo(dir.path());
    let registry = HandleRegistry::new();

    let repo = registry.acquire(&location, OpenStrategy::Open).unwrap();
    assert!(registry.drain().is_clean());
    assert_eq!(repo.state(), HandleState::Closed);

    let err = repo.status().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lifecycle);

    // A closed handle is replaced by the next acquire.
    let fresh = registry.acquire(&location, OpenStrategy::Open).unwrap();
    assert!(fresh.is_open());
    assert_eq!(registry.engine_opens(), 2);
}

#[test]
fn handle_closes_only_after_last_release() {
    let dir = TempDir::new().unwrap();
    let location = init_repo(dir.path());
    let registry = HandleRegistry::new();
    let threads = 4;

    let mut refs: Vec<_> = (0..threads)
        .map(|_| registry.acquire(&location, OpenStrategy::Open).unwrap())
        .collect();
    let last = refs.pop().unwrap();
    assert_eq!(last.ref_count(), threads);

    // Releases from other threads never close the handle under `last`.
    let releasers: Vec<_> = refs
        .into_iter()
        .map(|repo| {
            thread::spawn(move || {
                repo.status().unwrap();
                repo.release();
            })
        })
        .collect();
    for releaser in releasers {
        releaser.join().unwrap();
    }

    assert_eq!(last.ref_count(), 1);
    assert!(last.is_open());
    last.status().unwrap();
    assert!(registry.contains(&location));

    last.release();
    assert!(!registry.contains(&location));
    assert_eq!(registry.open_count(), 0);
    assert_eq!(registry.engine_opens(), 1);
}

#[test]
fn releasing_one_reference_leaves_the_other_usable() {
    let dir = TempDir::new().unwrap();
    let location = init_repo(dir.path());
    let registry = HandleRegistry::new();

    let a = registry.acquire(&location, OpenStrategy::Open).unwrap();
    let b = registry.acquire(&location, OpenStrategy::Open).unwrap();
    assert_eq!(b.ref_count(), 2);

    drop(a);
    assert_eq!(b.state(), HandleState::Open);
    b.status().unwrap();
}

#[test]
fn init_then_reacquire_reuses_handle() {
    let dir = TempDir::new().unwrap();
    let location = Location::local(dir.path().join("fresh")).unwrap();
    let registry = HandleRegistry::new();

    let created = registry
        .acquire(
            &location,
            OpenStrategy::Init(InitOptions::default().with_initial_branch("trunk")),
        )
        .unwrap();
    let again = registry.acquire(&location, OpenStrategy::Open).unwrap();
    assert_eq!(registry.engine_opens(), 1);

    assert!(again.log(LogOptions::default()).unwrap().is_empty());
    drop(created);
    assert!(again.is_open());
}

#[test]
fn drain_closes_everything() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let registry = HandleRegistry::new();
    let ra = registry
        .acquire(&init_repo(a.path()), OpenStrategy::Open)
        .unwrap();
    let rb = registry
        .acquire(&init_repo(b.path()), OpenStrategy::Open)
        .unwrap();

    let report = registry.drain();
    assert!(report.is_clean());
    assert_eq!(report.closed.len(), 2);
    assert_eq!(registry.open_count(), 0);
    assert!(!ra.is_open());
    assert!(!rb.is_open());

    // Releasing after a drain is harmless.
    ra.release();
    rb.release();
}

// =============================================================================
// Lifecycle Service
// =============================================================================

#[test]
fn build_finish_closes_open_handles() {
    let dir = TempDir::new().unwrap();
    init_repo(dir.path());
    let bus = EventBus::new();
    let service = service_for(dir.path());
    service.register(&bus);
    assert_eq!(bus.listener_count(), 1);

    bus.start();
    let repo = service.acquire().unwrap();
    assert!(repo.is_open());

    assert!(bus.finish(BuildOutcome::Failure {
        message: "compile error".into()
    }));
    assert!(service.is_shut_down());
    assert!(!repo.is_open());
    assert_eq!(repo.status().unwrap_err().kind(), ErrorKind::Lifecycle);

    let err = service.acquire().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lifecycle);

    service.unregister(&bus);
    assert_eq!(bus.listener_count(), 0);
}

#[test]
fn register_twice_subscribes_once() {
    let dir = TempDir::new().unwrap();
    let bus = EventBus::new();
    let service = service_for(dir.path());
    service.register(&bus);
    service.register(&bus);
    assert_eq!(bus.listener_count(), 1);

    service.unregister(&bus);
    service.unregister(&bus);
    assert_eq!(bus.listener_count(), 0);
}

#[test]
fn shutdown_runs_once() {
    let dir = TempDir::new().unwrap();
    init_repo(dir.path());
    let service = service_for(dir.path());
    let _repo = service.acquire().unwrap();

    let first = service.shutdown();
    assert_eq!(first.closed.len(), 1);
    let second = service.shutdown();
    assert!(second.closed.is_empty());
    assert!(second.is_clean());
}

#[test]
fn dropping_the_service_closes_handles() {
    let dir = TempDir::new().unwrap();
    init_repo(dir.path());
    let service = service_for(dir.path());
    let repo = service.acquire().unwrap();

    drop(service);
    assert!(!repo.is_open());
}

#[test]
fn listener_outliving_service_is_inert() {
    let dir = TempDir::new().unwrap();
    let bus = EventBus::new();
    {
        let service = service_for(dir.path());
        service.register(&bus);
    }
    // The subscription outlives the service; finishing must not panic.
    assert!(bus.finish(BuildOutcome::Success));
    assert!(!bus.finish(BuildOutcome::Cancelled));
}

#[test]
fn acquire_discovers_from_subdirectory() {
    let dir = TempDir::new().unwrap();
    let location = init_repo(dir.path());
    let nested = dir.path().join("src/deep");
    std::fs::create_dir_all(&nested).unwrap();

    let config = Config::load_with_env(dir.path(), &|_| None)
        .unwrap()
        .with_current_dir(&nested);
    let service =
        LifecycleService::new(config, HandleRegistry::new(), StaticCredentials::new(None));

    let repo = service.acquire().unwrap();
    assert_eq!(repo.location(), &location);
}

#[test]
fn acquire_can_initialize_missing_repository() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("new-repo");
    let config = Config::load_with_env(dir.path(), &|_| None)
        .unwrap()
        .with_directory(&target)
        .with_init_if_not_exists(true);
    let service =
        LifecycleService::new(config, HandleRegistry::new(), StaticCredentials::new(None));

    let repo = service.acquire().unwrap();
    assert!(repo.is_open());
    assert!(target.join(".git").exists());
}
