//! Read-only commands: status, log, head, describe.

use anyhow::Result;

use super::Context;
use crate::core::types::{Changes, RefKind};
use crate::ops::{DescribeOptions, LogOptions};

pub fn status(ctx: &Context<'_>) -> Result<()> {
    let repo = ctx.service.acquire()?;
    let status = repo.status()?;

    ctx.emit(&status, |status| {
        if status.state.is_in_progress() {
            println!("{} in progress", status.state);
        }
        if status.is_clean() {
            println!("nothing to commit, working tree clean");
            return;
        }
        print_changes("Staged", &status.staged);
        print_changes("Not staged", &status.unstaged);
        if !status.conflicts.is_empty() {
            println!("Unmerged:");
            for path in &status.conflicts {
                println!("  both modified: {}", path);
            }
        }
    })
}

fn print_changes(title: &str, changes: &Changes) {
    if changes.is_empty() {
        return;
    }
    println!("{}:", title);
    for path in &changes.added {
        println!("  added:    {}", path);
    }
    for path in &changes.modified {
        println!("  modified: {}", path);
    }
    for path in &changes.removed {
        println!("  removed:  {}", path);
    }
}

pub fn log(
    ctx: &Context<'_>,
    revisions: &[String],
    max_count: Option<usize>,
    skip: usize,
) -> Result<()> {
    let mut options = LogOptions::default().skip(skip);
    for rev in revisions {
        options = match rev.strip_prefix('^') {
            Some(excluded) => options.exclude(excluded),
            None => options.include(rev.as_str()),
        };
    }
    if let Some(max) = max_count {
        options = options.max_commits(max);
    }

    let repo = ctx.service.acquire()?;
    let commits = repo.log(options)?;

    ctx.emit(&commits, |commits| {
        for commit in commits {
            println!(
                "{} {} ({})",
                commit.id.short(7),
                commit.short_message(),
                commit.author.name
            );
        }
    })
}

pub fn head(ctx: &Context<'_>) -> Result<()> {
    let repo = ctx.service.acquire()?;
    let head = repo.head()?;

    ctx.emit(&head, |head| {
        let id = head
            .target
            .as_ref()
            .map(|id| id.short(7).to_string())
            .unwrap_or_else(|| "(unborn)".to_string());
        match &head.kind {
            RefKind::Symbolic { target } => println!("{} -> {}", id, target),
            RefKind::Direct => println!("{} (detached)", id),
        }
    })
}

pub fn describe(
    ctx: &Context<'_>,
    revision: Option<String>,
    tags: bool,
    long: bool,
    always: bool,
) -> Result<()> {
    let options = DescribeOptions {
        commit: revision,
        tags,
        long,
        always,
        pattern: None,
    };

    let repo = ctx.service.acquire()?;
    match repo.describe(options)? {
        Some(description) => ctx.emit(&description, |d| println!("{}", d)),
        None => anyhow::bail!("no tags can describe this commit (try --always)"),
    }
}
