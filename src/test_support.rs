use crate::config::Config;
use crate::context::SiteContext;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};
use tempfile::TempDir;

static CWD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub(crate) struct DirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl DirGuard {
    pub(crate) fn new(new_dir: &Path) -> Self {
        // Changing the process current working directory is global and not thread-safe.
        // Lock it so tests don't race even if a #[serial] annotation is missed.
        let lock = CWD_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(new_dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// Scaffold a minimal site in a fresh temp directory.
///
/// Creates the content directory only; commands and the lock core create
/// everything else on demand.
pub(crate) fn create_test_site() -> (TempDir, SiteContext, Config) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::default();
    std::fs::create_dir_all(temp_dir.path().join(&config.content_dir)).unwrap();
    let ctx = SiteContext::at_root(temp_dir.path(), &config);
    (temp_dir, ctx, config)
}
