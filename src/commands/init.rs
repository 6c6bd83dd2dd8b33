//! The `init` command: scaffold a creel site.

use crate::config::Config;
use crate::context::SiteContext;
use crate::error::{CreelError, Result};
use crate::fs::atomic_write_file;
use crate::index::ContentIndex;
use std::env;
use std::path::Path;

pub fn cmd_init() -> Result<()> {
    let cwd = env::current_dir().map_err(|e| {
        CreelError::UserError(format!("failed to get current working directory: {}", e))
    })?;

    let ctx = init_site(&cwd)?;

    println!("Initialized creel site at {}", ctx.site_root.display());
    println!("  Content:   {}", ctx.content_dir.display());
    println!("  Index:     {}", ctx.index_path().display());
    println!("  Config:    {}", ctx.config_path().display());
    Ok(())
}

/// Scaffold a site at `root`: content directory, empty index, default config.
pub fn init_site(root: &Path) -> Result<SiteContext> {
    let config = Config::default();
    let ctx = SiteContext::at_root(root, &config);

    if ctx.config_path().exists() {
        return Err(CreelError::UserError(format!(
            "creel site already initialized at {}",
            ctx.site_root.display()
        )));
    }

    std::fs::create_dir_all(&ctx.content_dir).map_err(|e| {
        CreelError::UserError(format!(
            "failed to create content directory '{}': {}",
            ctx.content_dir.display(),
            e
        ))
    })?;

    if !ctx.index_path().exists() {
        ContentIndex::default().save(ctx.index_path())?;
    }

    atomic_write_file(&ctx.config_path(), &config.to_yaml()?)?;

    Ok(ctx)
}
