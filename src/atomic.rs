//! Crash-safe file replacement.
//!
//! Every file the build writes (derived renditions, published assets, the
//! cache index, the metadata store, the render context) goes through
//! [`write_atomic`]: bytes land in a sibling temp file which is then renamed
//! over the destination. A reader, or a build killed half-way, only ever sees
//! the previous file or the complete new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` through a temp file in the same directory.
///
/// Parent directories are created as needed. On failure the temp file is
/// removed and the destination is left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    let result = write_and_rename(&tmp, path, bytes);
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Like [`write_atomic`], but skips the write when the destination already
/// holds exactly `bytes`. Returns whether anything was written.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> io::Result<bool> {
    match fs::read(path) {
        Ok(existing) if existing == bytes => Ok(false),
        _ => write_atomic(path, bytes).map(|()| true),
    }
}

fn write_and_rename(tmp: &Path, dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, dest)
}

/// `photo.avif` → `.photo.avif.<pid>-<n>.tmp`, unique per process and call.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}-{n}.tmp", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/c.txt");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn write_atomic_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("c.txt");
        fs::write(&path, "old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        write_atomic(&tmp.path().join("x.bin"), &[1, 2, 3]).unwrap();
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["x.bin"]);
    }

    #[test]
    fn write_if_changed_skips_identical_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("same.json");
        assert!(write_if_changed(&path, b"{}").unwrap());
        let before = fs::metadata(&path).unwrap().modified().unwrap();

        assert!(!write_if_changed(&path, b"{}").unwrap());
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);

        assert!(write_if_changed(&path, b"{\"a\":1}").unwrap());
    }

    #[test]
    fn temp_names_are_unique() {
        let p = Path::new("/out/photo.avif");
        assert_ne!(temp_sibling(p), temp_sibling(p));
        assert!(
            temp_sibling(p)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(".photo.avif.")
        );
    }
}
