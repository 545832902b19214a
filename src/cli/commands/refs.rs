//! Branch and tag commands.

use anyhow::Result;

use super::Context;
use crate::cli::args::TagAction;
use crate::core::types::{short_ref_name, RefKind};
use crate::ops::{BranchMode, TagAdd, TagRemove};

pub fn branch(ctx: &Context<'_>, all: bool, remotes: bool) -> Result<()> {
    let mode = match (all, remotes) {
        (true, _) => BranchMode::All,
        (false, true) => BranchMode::Remote,
        (false, false) => BranchMode::Local,
    };

    let repo = ctx.service.acquire()?;
    let current = repo.head()?.kind;
    let branches = repo.branch_list(mode)?;

    ctx.emit(&branches, |branches| {
        for branch in branches {
            let marker = match &current {
                RefKind::Symbolic { target } if *target == branch.full_name => '*',
                _ => ' ',
            };
            match &branch.tracking {
                Some(upstream) => println!(
                    "{} {} [{}]",
                    marker,
                    branch.name(),
                    short_ref_name(upstream)
                ),
                None => println!("{} {}", marker, branch.name()),
            }
        }
    })
}

pub fn tag(ctx: &Context<'_>, action: Option<TagAction>) -> Result<()> {
    let repo = ctx.service.acquire()?;

    match action.unwrap_or(TagAction::List) {
        TagAction::List => {
            let tags = repo.tag_list()?;
            ctx.emit(&tags, |tags| {
                for tag in tags {
                    println!("{}", tag.name());
                }
            })
        }
        TagAction::Add {
            name,
            message,
            target,
            lightweight,
            force,
        } => {
            let mut options = TagAdd::new(name)
                .pointing_to(target)
                .annotate(!lightweight)
                .force(force);
            if let Some(message) = message {
                options = options.message(message);
            }
            let tag = repo.tag_add(options)?;
            ctx.emit(&tag, |tag| {
                println!("Created tag {} at {}", tag.name(), tag.commit.short(7))
            })
        }
        TagAction::Delete { names } => {
            let removed = repo.tag_remove(TagRemove::new(names))?;
            ctx.emit(&removed, |removed| {
                for name in removed {
                    println!("Deleted tag {}", short_ref_name(name));
                }
            })
        }
    }
}
