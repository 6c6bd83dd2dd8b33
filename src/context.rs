//! Site layout resolution for creel.
//!
//! Finds the site root from any working directory and resolves the canonical
//! content-pipeline paths under it. All creel commands use this module to
//! locate the content index, the publish lock, and the metrics log, so
//! operations target the same files regardless of where they are invoked.
//!
//! The site root is the nearest ancestor directory containing either a
//! `creel.yaml` config file or a content directory.

use crate::config::Config;
use crate::error::{CreelError, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Config file name at the site root.
pub const SITE_CONFIG_FILE: &str = "creel.yaml";

/// Content index file name within the content directory.
pub const INDEX_FILE: &str = "index.json";

/// Lock file name for publish operations.
pub const PUBLISH_LOCK_FILE: &str = "publish.lock";

/// Metrics event log file name.
pub const METRICS_FILE: &str = "lock-events.json";

/// Resolved paths for a creel site.
///
/// All paths are derived from the site root and the configured content
/// directory name.
#[derive(Debug, Clone)]
pub struct SiteContext {
    /// Absolute path to the site root.
    pub site_root: PathBuf,

    /// Absolute path to the content directory (default: `{site_root}/content`).
    pub content_dir: PathBuf,
}

impl SiteContext {
    /// Resolve the site context from the current working directory.
    pub fn resolve(config: &Config) -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            CreelError::UserError(format!("failed to get current working directory: {}", e))
        })?;

        Self::resolve_from(&cwd, config)
    }

    /// Resolve the site context from a specific directory.
    ///
    /// Walks up from `cwd` looking for a directory containing `creel.yaml`
    /// or the configured content directory. Useful for testing or when the
    /// working directory is known.
    pub fn resolve_from<P: AsRef<Path>>(cwd: P, config: &Config) -> Result<Self> {
        let cwd = cwd.as_ref();
        let root = find_site_root(cwd, &config.content_dir)?;
        Ok(Self::at_root(root, config))
    }

    /// Build a context for a known site root without any discovery.
    pub fn at_root<P: AsRef<Path>>(root: P, config: &Config) -> Self {
        let site_root = root.as_ref().to_path_buf();
        let content_dir = site_root.join(&config.content_dir);
        Self {
            site_root,
            content_dir,
        }
    }

    /// Path to the content index document.
    pub fn index_path(&self) -> PathBuf {
        self.content_dir.join(INDEX_FILE)
    }

    /// Path to the locks directory.
    pub fn locks_dir(&self) -> PathBuf {
        self.content_dir.join(".locks")
    }

    /// Path to the publish lock file.
    pub fn publish_lock_path(&self) -> PathBuf {
        self.locks_dir().join(PUBLISH_LOCK_FILE)
    }

    /// Path to the metrics directory.
    pub fn metrics_dir(&self) -> PathBuf {
        self.content_dir.join("metrics")
    }

    /// Path to the lock reclaim event log.
    pub fn metrics_path(&self) -> PathBuf {
        self.metrics_dir().join(METRICS_FILE)
    }

    /// Path to the site config file.
    pub fn config_path(&self) -> PathBuf {
        self.site_root.join(SITE_CONFIG_FILE)
    }

    /// Check if the site has been initialized.
    pub fn site_exists(&self) -> bool {
        self.content_dir.exists()
    }

    /// Ensure the site is initialized, returning an error if not.
    ///
    /// All commands except `init` call this to give users an actionable
    /// message instead of a missing-file error deeper in the pipeline.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.content_dir.exists() {
            return Err(CreelError::UserError(format!(
                "creel site not initialized.\n\
                 Expected content directory at: {}\n\n\
                 Run `creel init` to initialize the site in this directory.",
                self.content_dir.display()
            )));
        }
        Ok(())
    }
}

/// Walk up from `start` to find the site root.
fn find_site_root(start: &Path, content_dir_name: &str) -> Result<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        if dir.join(SITE_CONFIG_FILE).is_file() || dir.join(content_dir_name).is_dir() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }

    // Nothing found anywhere above; treat the starting directory itself as
    // the root so `creel init` can scaffold it.
    Ok(start.to_path_buf())
}

/// Resolve context and config together, requiring an initialized site.
///
/// Use this in most commands (except `init`).
pub fn require_initialized_site() -> Result<(SiteContext, Config)> {
    let cwd = env::current_dir().map_err(|e| {
        CreelError::UserError(format!("failed to get current working directory: {}", e))
    })?;
    require_initialized_site_from(&cwd)
}

/// Resolve context and config from a specific directory.
pub fn require_initialized_site_from<P: AsRef<Path>>(cwd: P) -> Result<(SiteContext, Config)> {
    let root = find_site_root(cwd.as_ref(), &Config::default().content_dir)?;
    let config = Config::load(root.join(SITE_CONFIG_FILE))?;
    let ctx = SiteContext::at_root(root, &config);
    ctx.ensure_initialized()?;
    Ok((ctx, config))
}
