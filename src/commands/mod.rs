//! Command implementations for creel.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Handlers resolve the site context from the working
//! directory, then delegate to inner functions that take explicit paths so
//! tests can drive them against temporary sites.

mod init;

use crate::cli::{
    Command, ListArgs, LockAction, LockClearArgs, LockCommand, PublishArgs, UnpublishArgs,
};
use crate::config::Config;
use crate::context::{SiteContext, require_initialized_site};
use crate::error::{CreelError, Result};
use crate::index::{ContentCategory, ContentEntry, ContentIndex, update_index, validate_slug};
use crate::locks::{LockManager, format_age};
use crate::metrics::MetricsRecorder;
use chrono::Utc;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Init => init::cmd_init(),
        Command::Publish(args) => cmd_publish(args),
        Command::Unpublish(args) => cmd_unpublish(args),
        Command::List(args) => cmd_list(args),
        Command::Lock(lock_cmd) => dispatch_lock(lock_cmd),
        Command::Metrics => cmd_metrics(),
    }
}

/// Dispatch lock subcommands.
fn dispatch_lock(lock_cmd: LockCommand) -> Result<()> {
    match lock_cmd.action {
        LockAction::Status => cmd_lock_status(),
        LockAction::Clear(args) => cmd_lock_clear(args),
    }
}

fn cmd_publish(args: PublishArgs) -> Result<()> {
    let (ctx, config) = require_initialized_site()?;
    publish_entry(&ctx, &config, &args)
}

fn cmd_unpublish(args: UnpublishArgs) -> Result<()> {
    let (ctx, config) = require_initialized_site()?;
    unpublish_entry(&ctx, &config, &args.slug)
}

fn cmd_list(args: ListArgs) -> Result<()> {
    let (ctx, _config) = require_initialized_site()?;
    list_entries(&ctx, &args)
}

fn cmd_lock_status() -> Result<()> {
    let (ctx, config) = require_initialized_site()?;
    print_lock_status(&ctx, &config)
}

fn cmd_lock_clear(args: LockClearArgs) -> Result<()> {
    if !args.force {
        return Err(CreelError::UserError(
            "refusing to clear the publish lock without --force.\n\n\
             Clearing the lock while a publish is still running can corrupt \
             the content index.\nOnly clear it if you are certain the holder \
             has crashed.\n\n\
             To clear the lock, run:\n  creel lock clear --force"
                .to_string(),
        ));
    }

    let (ctx, config) = require_initialized_site()?;
    clear_lock(&ctx, &config)
}

fn cmd_metrics() -> Result<()> {
    let (ctx, _config) = require_initialized_site()?;
    print_metrics(&ctx)
}

// ============================================================================
// Inner implementations
// ============================================================================

/// Read an entry document and upsert it into the index under the lock.
fn publish_entry(ctx: &SiteContext, config: &Config, args: &PublishArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file).map_err(|e| {
        CreelError::UserError(format!(
            "failed to read entry file '{}': {}",
            args.file.display(),
            e
        ))
    })?;

    let mut entry: ContentEntry = serde_json::from_str(&content).map_err(|e| {
        CreelError::UserError(format!(
            "failed to parse entry file '{}': {}",
            args.file.display(),
            e
        ))
    })?;

    validate_slug(&entry.slug)?;

    if args.draft {
        entry.draft = true;
    }
    if entry.published_at.is_none() {
        entry.published_at = Some(Utc::now());
    }

    let slug = entry.slug.clone();
    let category = entry.category;
    let replaced = update_index(ctx, config, |index| Ok(index.upsert(entry)))?;

    if replaced {
        println!("Updated {} entry: {}", category, slug);
    } else {
        println!("Published {} entry: {}", category, slug);
    }
    Ok(())
}

/// Remove an entry from the index under the lock.
fn unpublish_entry(ctx: &SiteContext, config: &Config, slug: &str) -> Result<()> {
    let removed = update_index(ctx, config, |index| {
        index.remove(slug).ok_or_else(|| {
            CreelError::UserError(format!("no entry with slug '{}' in the index", slug))
        })
    })?;

    println!("Unpublished {} entry: {}", removed.category, removed.slug);
    Ok(())
}

/// Print index entries, optionally filtered.
fn list_entries(ctx: &SiteContext, args: &ListArgs) -> Result<()> {
    let category = args
        .category
        .as_deref()
        .map(parse_category)
        .transpose()?;

    // Reads are not serialized; the atomic index write guarantees a
    // consistent snapshot.
    let index = ContentIndex::load(ctx.index_path())?;

    let entries: Vec<&ContentEntry> = index
        .entries
        .iter()
        .filter(|e| category.is_none_or(|c| e.category == c))
        .filter(|e| args.drafts || !e.draft)
        .collect();

    if entries.is_empty() {
        println!("No entries in the index.");
        return Ok(());
    }

    println!("Content index ({} entries):", entries.len());
    for entry in entries {
        println!(
            "  {:10} {}{}  {}",
            entry.category.to_string(),
            entry.slug,
            if entry.draft { " [draft]" } else { "" },
            entry.title
        );
    }
    Ok(())
}

/// Parse a category name from the CLI.
fn parse_category(name: &str) -> Result<ContentCategory> {
    match name {
        "blog" => Ok(ContentCategory::Blog),
        "species" => Ok(ContentCategory::Species),
        "location" => Ok(ContentCategory::Location),
        "how-to" => Ok(ContentCategory::HowTo),
        other => Err(CreelError::UserError(format!(
            "unknown category '{}': expected blog, species, location, or how-to",
            other
        ))),
    }
}

/// Show the current publish lock state.
fn print_lock_status(ctx: &SiteContext, config: &Config) -> Result<()> {
    let manager = LockManager::for_site(ctx, config);

    let Some(status) = manager.inspect()? else {
        println!("No publish lock held.");
        return Ok(());
    };

    match status.record {
        Some(record) => {
            println!("Publish lock:");
            println!("  Lock id:    {}", record.lock_id);
            println!("  Owner:      {}", record.owner_token);
            println!(
                "  Created:    {}",
                record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(age) = status.age {
                println!("  Age:        {}", format_age(age));
            }
            println!("  Path:       {}", status.path.display());
            if status.is_stale {
                println!(
                    "  Status:     STALE (exceeds {} s threshold)",
                    config.stale_lock_secs
                );
                println!();
                println!("Use `creel lock clear --force` to clear it.");
            }
        }
        None => {
            println!("Publish lock file exists but is unreadable:");
            println!("  Path:       {}", status.path.display());
            println!();
            println!("Use `creel lock clear --force` to clear it.");
        }
    }
    Ok(())
}

/// Clear the publish lock, printing an audit block.
fn clear_lock(ctx: &SiteContext, config: &Config) -> Result<()> {
    let manager = LockManager::for_site(ctx, config);
    let cleared = manager.clear()?;

    println!("Cleared publish lock.");
    if let Some(record) = cleared.record {
        println!();
        println!("Lock details:");
        println!("  Lock id:    {}", record.lock_id);
        println!("  Owner:      {}", record.owner_token);
        println!(
            "  Created:    {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Some(age) = cleared.age {
            println!("  Age:        {}", format_age(age));
        }
        if cleared.is_stale {
            println!("  Status:     was STALE");
        }
    }
    Ok(())
}

/// Print recorded stale-lock reclaim events.
fn print_metrics(ctx: &SiteContext) -> Result<()> {
    let recorder = MetricsRecorder::new(ctx.metrics_path());
    let events = recorder.read_events()?;

    if events.is_empty() {
        println!("No stale-lock reclaims recorded.");
        return Ok(());
    }

    println!("Stale-lock reclaims ({}):", events.len());
    for event in &events {
        println!(
            "  {}  lock {} (owner {}, age {} ms)",
            event.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            event.lock_id,
            event.owner_token,
            event.age_ms
        );
    }
    Ok(())
}
