//! Commands that talk to a remote.

use anyhow::Result;

use super::Context;
use crate::ops::{FetchOptions, PushOptions, TagMode};

pub fn fetch(ctx: &Context<'_>, remote: Option<String>, prune: bool, tags: bool) -> Result<()> {
    let remote = remote.unwrap_or_else(|| ctx.service.config().remote().to_string());
    let mut options = FetchOptions::default()
        .remote(remote.as_str())
        .prune(prune)
        .tag_mode(if tags { TagMode::All } else { TagMode::Auto });
    if let Some(credentials) = ctx.service.credentials() {
        options = options.credentials(credentials);
    }

    let repo = ctx.service.acquire()?;
    let summary = repo.fetch(options)?;

    ctx.emit(&summary, |summary| {
        if summary.updated_refs.is_empty() {
            println!("{} is up to date", remote);
        }
        for name in &summary.updated_refs {
            println!("  updated {}", name);
        }
    })
}

pub fn push(
    ctx: &Context<'_>,
    refs: Vec<String>,
    remote: Option<String>,
    force: bool,
    tags: bool,
    all: bool,
) -> Result<()> {
    let remote = remote.unwrap_or_else(|| ctx.service.config().remote().to_string());
    let mut options = PushOptions::default()
        .remote(remote.as_str())
        .refs(refs)
        .force(force)
        .tags(tags)
        .all(all);
    if let Some(credentials) = ctx.service.credentials() {
        options = options.credentials(credentials);
    }

    let repo = ctx.service.acquire()?;
    let summary = repo.push(options)?;

    ctx.emit(&summary, |summary| {
        if summary.updated_refs.is_empty() {
            println!("Everything up-to-date");
        }
        for name in &summary.updated_refs {
            println!("  {} -> {}", name, remote);
        }
    })
}
