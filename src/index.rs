//! The shared content index and the locked updater around it.
//!
//! The index is the site's single JSON document listing every published
//! content entry (blog posts, species guides, location guides, how-to
//! articles). Page rendering reads it; this module owns writing it.
//!
//! All writes go through [`update_index`], which wraps the read-modify-write
//! cycle in the publish lock so two pipelines never interleave their
//! mutations, and saves atomically so readers never observe a torn document.

use crate::config::Config;
use crate::context::SiteContext;
use crate::error::{CreelError, Result};
use crate::fs::atomic_write_file;
use crate::locks::LockManager;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Content types the site publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentCategory {
    /// General blog post.
    Blog,
    /// Species guide (e.g., largemouth bass).
    Species,
    /// Location guide (e.g., a lake or river).
    Location,
    /// How-to article.
    HowTo,
}

impl std::fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentCategory::Blog => write!(f, "blog"),
            ContentCategory::Species => write!(f, "species"),
            ContentCategory::Location => write!(f, "location"),
            ContentCategory::HowTo => write!(f, "how-to"),
        }
    }
}

/// One published piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    /// URL slug, unique within the index.
    pub slug: String,

    /// Display title.
    pub title: String,

    /// Content type.
    pub category: ContentCategory,

    /// Meta description for search snippets.
    #[serde(default)]
    pub description: String,

    /// First publication time. Filled at publish time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    /// Freeform tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Draft entries are indexed but not rendered.
    #[serde(default)]
    pub draft: bool,
}

/// The content index document.
///
/// Unknown fields are ignored on load so older pipeline versions can read
/// indexes written by newer ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentIndex {
    /// All entries, kept sorted by slug.
    #[serde(default)]
    pub entries: Vec<ContentEntry>,

    /// When the index was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ContentIndex {
    /// Load the index from disk. A missing file yields an empty index.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CreelError::IndexError(format!(
                "failed to read index '{}': {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            CreelError::IndexError(format!(
                "failed to parse index '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Atomically save the index, stamping `updated_at`.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.updated_at = Some(Utc::now());

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CreelError::IndexError(format!("failed to serialize index: {}", e)))?;

        atomic_write_file(path.as_ref(), &json)
            .map_err(|e| CreelError::IndexError(e.to_string()))
    }

    /// Insert or replace an entry by slug, keeping entries sorted.
    ///
    /// Returns `true` when an existing entry was replaced.
    pub fn upsert(&mut self, entry: ContentEntry) -> bool {
        let replaced = if let Some(existing) =
            self.entries.iter_mut().find(|e| e.slug == entry.slug)
        {
            *existing = entry;
            true
        } else {
            self.entries.push(entry);
            false
        };

        self.entries.sort_by(|a, b| a.slug.cmp(&b.slug));
        replaced
    }

    /// Remove an entry by slug, returning it if present.
    pub fn remove(&mut self, slug: &str) -> Option<ContentEntry> {
        let position = self.entries.iter().position(|e| e.slug == slug)?;
        Some(self.entries.remove(position))
    }

    /// Look up an entry by slug.
    pub fn find(&self, slug: &str) -> Option<&ContentEntry> {
        self.entries.iter().find(|e| e.slug == slug)
    }
}

/// Validate a URL slug: lowercase alphanumeric segments joined by single
/// hyphens, no leading/trailing hyphen.
pub fn validate_slug(slug: &str) -> Result<()> {
    static SLUG_RE: OnceLock<Regex> = OnceLock::new();
    let re = SLUG_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug pattern is valid")
    });

    if !re.is_match(slug) {
        return Err(CreelError::UserError(format!(
            "invalid slug '{}': expected lowercase words separated by hyphens \
             (e.g. 'best-bass-lures-for-spring')",
            slug
        )));
    }
    Ok(())
}

/// Apply a mutation to the content index under the publish lock.
///
/// Acquires the lock, loads the index, runs `f`, writes the result back
/// atomically, and releases. This is the only write path to the index; the
/// lock core itself makes no assumption about the document's schema.
pub fn update_index<T, F>(ctx: &SiteContext, config: &Config, f: F) -> Result<T>
where
    F: FnOnce(&mut ContentIndex) -> Result<T>,
{
    let manager = LockManager::for_site(ctx, config);
    let index_path = ctx.index_path();

    manager.with_lock(|| {
        let mut index = ContentIndex::load(&index_path)?;
        let outcome = f(&mut index)?;
        index.save(&index_path)?;
        Ok(outcome)
    })
}
