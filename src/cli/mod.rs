//! cli
//!
//! Command-line interface for grgit.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Set up logging and configuration
//! - Run each command inside a single build: the lifecycle service is
//!   registered with an in-process [`EventBus`], and the bus's `Finished`
//!   event closes whatever the command left open
//!
//! The CLI never touches git directly. Every command acquires the default
//! repository through [`LifecycleService::acquire`] and calls the typed
//! operations on the handle.

pub mod args;
pub mod commands;

pub use args::{Cli, Command, TagAction};
pub use commands::Context;

use anyhow::{Context as _, Result};
use log::debug;

use crate::core::config::Config;
use crate::lifecycle::{BuildOutcome, EventBus, LifecycleService};

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    let cwd = std::env::current_dir().context("cannot determine the current directory")?;
    let config = load_config(cli.dir.as_deref(), &cwd)?;
    debug!("default repository: {:?}", config.default_repository());

    let bus = EventBus::new();
    let service = LifecycleService::from_config(config);
    service.register(&bus);
    bus.start();

    let ctx = Context {
        service: &service,
        json: cli.json,
    };
    let result = commands::dispatch(cli.command, &ctx);

    let outcome = match &result {
        Ok(()) => BuildOutcome::Success,
        Err(e) => BuildOutcome::Failure {
            message: format!("{:#}", e),
        },
    };
    bus.finish(outcome);
    service.unregister(&bus);

    result
}

/// Logging goes to stderr; `RUST_LOG` wins over `--debug`.
fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .try_init();
}

/// Configuration rooted at `--dir` (or the working directory).
///
/// `--dir` opens exactly that repository. Without it, and without a
/// configured directory, the repository is searched for upward from `cwd`.
fn load_config(dir: Option<&std::path::Path>, cwd: &std::path::Path) -> Result<Config> {
    let root = match dir {
        Some(dir) => cwd.join(dir),
        None => cwd.to_path_buf(),
    };
    let config = Config::load(&root)
        .with_context(|| format!("failed to load configuration for {}", root.display()))?;

    Ok(match dir {
        Some(_) => config.with_directory(&root),
        None if config.build.directory.is_none() && config.build.current_dir.is_none() => {
            config.with_current_dir(cwd)
        }
        None => config,
    })
}
