//! CLI argument parsing for creel.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Creel: file-locked publishing pipeline for a shared JSON content index.
///
/// Content entries (blog posts, species guides, location guides, how-to
/// articles) live in a single `content/index.json`. Every write to the index
/// happens under an advisory file lock so concurrent publishes never
/// interleave.
#[derive(Parser, Debug)]
#[command(name = "creel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse CLI arguments from the environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available commands for creel.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a creel site in the current directory.
    ///
    /// Creates the content directory, an empty content index, and a
    /// default creel.yaml config.
    Init,

    /// Publish a content entry into the index.
    ///
    /// Reads an entry document (JSON) and upserts it into the content
    /// index under the publish lock.
    Publish(PublishArgs),

    /// Remove a content entry from the index.
    Unpublish(UnpublishArgs),

    /// List entries in the content index.
    List(ListArgs),

    /// Publish lock management.
    ///
    /// Inspect or clear the publish lock.
    Lock(LockCommand),

    /// Show recorded stale-lock reclaim events.
    Metrics,
}

/// Arguments for the `publish` command.
#[derive(Parser, Debug)]
pub struct PublishArgs {
    /// Path to the entry document (JSON with slug, title, category, ...).
    pub file: PathBuf,

    /// Mark the entry as a draft (indexed but not rendered).
    #[arg(long)]
    pub draft: bool,
}

/// Arguments for the `unpublish` command.
#[derive(Parser, Debug)]
pub struct UnpublishArgs {
    /// Slug of the entry to remove.
    pub slug: String,
}

/// Arguments for the `list` command.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only show entries in this category (blog, species, location, how-to).
    #[arg(long)]
    pub category: Option<String>,

    /// Include draft entries.
    #[arg(long)]
    pub drafts: bool,
}

/// Lock management commands.
#[derive(Parser, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// Show the current publish lock, its age, and staleness.
    Status,

    /// Clear the publish lock.
    ///
    /// Requires --force to prevent accidental clearing.
    Clear(LockClearArgs),
}

/// Arguments for the `lock clear` command.
#[derive(Parser, Debug)]
pub struct LockClearArgs {
    /// Force clearing the lock (required for safety).
    #[arg(long)]
    pub force: bool,
}
