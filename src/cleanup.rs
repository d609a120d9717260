use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use crate::error::Result;
use crate::ledger::{BACKUPS_DIR, EXPORTS_DIR};

const STALE_EXTENSIONS: &[&str] = &["csv", "db"];

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Backup and export files older than `max_age`, excluding `protected` paths.
pub fn find_stale_files(data_dir: &Path, max_age: Duration, protected: &[&Path]) -> Result<Vec<PathBuf>> {
    let now = SystemTime::now();
    let mut stale = Vec::new();

    for sub in [BACKUPS_DIR, EXPORTS_DIR] {
        let dir = data_dir.join(sub);
        if !dir.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let wanted = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| STALE_EXTENSIONS.contains(&e));
            if !wanted || !path.is_file() || protected.iter().any(|p| same_file(p, &path)) {
                continue;
            }
            let modified = std::fs::metadata(&path)?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= max_age {
                debug!(path = %path.display(), age_secs = age.as_secs(), "stale file");
                stale.push(path);
            }
        }
    }
    stale.sort();
    Ok(stale)
}

/// Delete the stale files unless `dry_run`. Returns the affected paths.
pub fn remove_stale_files(
    data_dir: &Path,
    max_age: Duration,
    protected: &[&Path],
    dry_run: bool,
) -> Result<Vec<PathBuf>> {
    let stale = find_stale_files(data_dir, max_age, protected)?;
    if !dry_run {
        for path in &stale {
            std::fs::remove_file(path)?;
            info!(path = %path.display(), "removed stale file");
        }
    }
    Ok(stale)
}

pub fn days(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(86_400))
}
