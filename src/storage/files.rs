//! Download folder housekeeping.
//!
//! - collision-safe naming for freshly downloaded files
//! - moving canonical files to the destination folder
//! - purging the GUID-named artifacts the browser leaves behind

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Local, NaiveDate};
use regex::Regex;

use crate::error::Result;

/// Characters that are not allowed in file names on the target desktop.
const FORBIDDEN: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Replace every forbidden character with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect()
}

/// Canonical on-disk name of a report.
pub fn canonical_file_name(name: &str, extension: &str) -> String {
    format!("{}.{}", sanitize_filename(name), extension)
}

/// Create `directory` (and parents) when missing.
pub async fn ensure_dir(directory: &Path) -> Result<()> {
    tokio::fs::create_dir_all(directory).await?;
    Ok(())
}

/// Claim a path for `file_name` inside `directory` that did not exist
/// before: `name.ext`, then `name (1).ext`, `name (2).ext`, ...
///
/// The path is created empty so concurrent callers never receive the
/// same one; the caller overwrites or removes it.
pub async fn reserve_unique_path(directory: &Path, file_name: &str) -> Result<PathBuf> {
    let file = Path::new(file_name);
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = file
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut attempt = 0u32;
    loop {
        let candidate = if attempt == 0 {
            directory.join(file_name)
        } else {
            directory.join(format!("{stem} ({attempt}){extension}"))
        };

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// A completed move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Move `<name>.<ext>` for every target name from the download folder
/// into the destination folder, replacing older copies.
///
/// Missing sources are logged and skipped, so calling this twice is safe.
pub async fn relocate(
    download_dir: &Path,
    destination_dir: &Path,
    target_names: &[String],
    extension: &str,
) -> Result<Vec<Move>> {
    ensure_dir(destination_dir).await?;

    let mut moved = Vec::new();
    for name in target_names {
        let file_name = canonical_file_name(name, extension);
        let from = download_dir.join(&file_name);

        if !tokio::fs::try_exists(&from).await? {
            log::warn!(
                "Target file not found in {}: {}",
                download_dir.display(),
                file_name
            );
            continue;
        }

        let to = destination_dir.join(&file_name);
        move_file(&from, &to).await?;
        log::info!("Replaced {} in {}", file_name, destination_dir.display());
        moved.push(Move { from, to });
    }

    Ok(moved)
}

/// Rename, falling back to copy and delete across volumes.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            log::debug!(
                "Rename {} -> {} failed ({}), copying instead",
                from.display(),
                to.display(),
                rename_err
            );
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await?;
            Ok(())
        }
    }
}

/// Result of a cleanup scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub skipped: usize,
}

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
            .expect("UUID pattern is valid")
    })
}

/// Whether a file name, extension ignored, has the UUID shape.
pub fn is_uuid_named(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| uuid_pattern().is_match(stem))
}

/// Delete UUID-named files modified today directly inside `directory`.
pub async fn cleanup_stale(directory: &Path) -> Result<CleanupReport> {
    cleanup_stale_on(directory, Local::now().date_naive()).await
}

/// [`cleanup_stale`] with an explicit notion of "today".
pub async fn cleanup_stale_on(directory: &Path, today: NaiveDate) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    let mut entries = tokio::fs::read_dir(directory).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Couldn't stat {}: {}", path.display(), e);
                continue;
            }
        };
        if !metadata.is_file() || !is_uuid_named(&path) {
            continue;
        }

        let modified = match metadata.modified() {
            Ok(time) => DateTime::<Local>::from(time).date_naive(),
            Err(e) => {
                log::warn!("No modification time for {}: {}", path.display(), e);
                continue;
            }
        };
        if modified != today {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                report.removed += 1;
                log::info!("Deleted UUID file: {}", entry.file_name().to_string_lossy());
            }
            Err(e) => {
                report.skipped += 1;
                log::warn!("Couldn't delete {}: {}", path.display(), e);
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    use tempfile::TempDir;

    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    fn age(path: &Path, by: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_sanitize_removes_forbidden() {
        let raw = r#"a\b/c*d?e:f"g<h>i|j"#;
        let clean = sanitize_filename(raw);
        assert_eq!(clean, "a_b_c_d_e_f_g_h_i_j");
        assert!(!clean.chars().any(|c| FORBIDDEN.contains(&c)));
        assert_eq!(
            sanitize_filename("Flat File - TSM NI/SI"),
            "Flat File - TSM NI_SI"
        );
    }

    #[tokio::test]
    async fn test_reserve_unique_path_sequence() {
        let tmp = TempDir::new().unwrap();
        let mut names = Vec::new();
        for _ in 0..3 {
            let path = reserve_unique_path(tmp.path(), "A.xlsx").await.unwrap();
            names.push(path.file_name().unwrap().to_string_lossy().into_owned());
        }
        assert_eq!(names, ["A.xlsx", "A (1).xlsx", "A (2).xlsx"]);
    }

    #[tokio::test]
    async fn test_reserve_skips_existing() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "A.xlsx");
        touch(tmp.path(), "A (1).xlsx");
        let path = reserve_unique_path(tmp.path(), "A.xlsx").await.unwrap();
        assert_eq!(path, tmp.path().join("A (2).xlsx"));
    }

    #[tokio::test]
    async fn test_relocate_is_idempotent() {
        let download = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        touch(download.path(), "A.xlsx");
        let targets = vec!["A".to_string(), "B".to_string()];

        let first = relocate(download.path(), destination.path(), &targets, "xlsx")
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert!(destination.path().join("A.xlsx").exists());
        assert!(!download.path().join("A.xlsx").exists());

        let second = relocate(download.path(), destination.path(), &targets, "xlsx")
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_relocate_overwrites_and_uses_exact_names() {
        let download = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        std::fs::write(download.path().join("A.xlsx"), b"new").unwrap();
        touch(download.path(), "A (1).xlsx");
        std::fs::write(destination.path().join("A.xlsx"), b"old").unwrap();

        let moved = relocate(download.path(), destination.path(), &["A".to_string()], "xlsx")
            .await
            .unwrap();

        assert_eq!(moved.len(), 1);
        assert_eq!(
            std::fs::read(destination.path().join("A.xlsx")).unwrap(),
            b"new"
        );
        assert!(download.path().join("A (1).xlsx").exists());
    }

    #[tokio::test]
    async fn test_relocate_sanitizes_names() {
        let download = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        touch(download.path(), "Flat File - TSM NI_SI.xlsx");

        let moved = relocate(
            download.path(),
            destination.path(),
            &["Flat File - TSM NI/SI".to_string()],
            "xlsx",
        )
        .await
        .unwrap();

        assert_eq!(moved.len(), 1);
        assert!(destination.path().join("Flat File - TSM NI_SI.xlsx").exists());
    }

    #[test]
    fn test_uuid_shape() {
        let id = uuid::Uuid::new_v4().to_string();
        assert!(is_uuid_named(Path::new(&format!("{id}.xlsx"))));
        assert!(is_uuid_named(Path::new(&id.to_uppercase())));
        assert!(!is_uuid_named(Path::new("Flat File - CD.xlsx")));
        assert!(!is_uuid_named(Path::new("0000-1111.tmp")));
    }

    #[tokio::test]
    async fn test_cleanup_requires_uuid_name_and_today() {
        let tmp = TempDir::new().unwrap();
        let fresh = touch(tmp.path(), &format!("{}.crdownload", uuid::Uuid::new_v4()));
        let old = touch(tmp.path(), &format!("{}.xlsx", uuid::Uuid::new_v4()));
        age(&old, Duration::from_secs(2 * 24 * 60 * 60));
        let named = touch(tmp.path(), "Flat File - CD.xlsx");
        std::fs::create_dir(tmp.path().join(uuid::Uuid::new_v4().to_string())).unwrap();

        let report = cleanup_stale(tmp.path()).await.unwrap();

        assert_eq!(report, CleanupReport { removed: 1, skipped: 0 });
        assert!(!fresh.exists());
        assert!(old.exists());
        assert!(named.exists());
    }

    #[tokio::test]
    async fn test_cleanup_with_fixed_day() {
        let tmp = TempDir::new().unwrap();
        let file = touch(tmp.path(), &format!("{}.xlsx", uuid::Uuid::new_v4()));
        let tomorrow = Local::now().date_naive().succ_opt().unwrap();

        let report = cleanup_stale_on(tmp.path(), tomorrow).await.unwrap();

        assert_eq!(report.removed, 0);
        assert!(file.exists());
    }
}
