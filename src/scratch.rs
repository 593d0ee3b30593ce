//! Scratch directory management
//!
//! Every episode is assembled in one scratch directory using well-known file
//! names. Media tools write their results to uniquely named intermediate
//! files which are guarded and cleaned up unless they are promoted over the
//! well-known file.

use std::fs;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// The in-progress video container
pub const VIDEO_FILE: &str = "episode.mkv";

/// The decrypted subtitle track
pub const SUBTITLE_FILE: &str = "subtitles.ass";

/// The scratch directory used for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Uses `root` as scratch directory, creating it if needed
    pub fn prepare(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The default scratch location, `<system temp>/anirip`
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("anirip")
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn video_path(&self) -> PathBuf {
        self.root.join(VIDEO_FILE)
    }

    pub fn subtitle_path(&self) -> PathBuf {
        self.root.join(SUBTITLE_FILE)
    }

    /// Removes the well-known files left behind by an earlier episode
    pub fn reset(&self) -> io::Result<()> {
        for path in [self.video_path(), self.subtitle_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Deletes the whole scratch directory
    pub fn clear(root: &Path) -> io::Result<()> {
        match fs::remove_dir_all(root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Guard for an intermediate file that is deleted on drop unless promoted
#[derive(Debug)]
pub(crate) struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl TempGuard {
    /// Get the path to the intermediate file
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the intermediate file over `target` and disarms the guard
    pub(crate) fn promote(mut self, target: &Path) -> io::Result<()> {
        fs::rename(&self.path, target)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed {
            // Silently ignore errors during cleanup
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Deref for TempGuard {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.path()
    }
}

/// Reserves a unique intermediate file name inside `dir`
///
/// The name is built from a ULID so concurrent tool runs never collide. The
/// file itself is not created; the tool writing it does that.
pub(crate) fn intermediate_file(dir: &Path, prefix: &str, extension: &str) -> TempGuard {
    let ulid = ulid::Ulid::new();
    let filename = format!("{}_{}.{}", prefix, ulid, extension);

    TempGuard {
        path: dir.join(filename),
        armed: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_and_well_known_paths() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::prepare(dir.path().join("anirip")).unwrap();

        assert!(scratch.path().is_dir());
        assert_eq!(scratch.video_path(), scratch.path().join("episode.mkv"));
        assert_eq!(scratch.subtitle_path(), scratch.path().join("subtitles.ass"));
    }

    #[test]
    fn test_reset_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::prepare(dir.path()).unwrap();
        fs::write(scratch.video_path(), b"old").unwrap();

        scratch.reset().unwrap();
        assert!(!scratch.video_path().exists());

        // Nothing left to remove is fine
        scratch.reset().unwrap();
    }

    #[test]
    fn test_intermediate_file_cleanup_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let temp = intermediate_file(dir.path(), "trim", "mkv");
            fs::write(temp.path(), b"partial").unwrap();
            let name = temp.path().file_name().unwrap().to_str().unwrap().to_string();
            assert!(name.starts_with("trim_"));
            assert!(name.ends_with(".mkv"));
            temp.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[test]
    fn test_intermediate_file_promote() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("episode.mkv");
        let temp = intermediate_file(dir.path(), "merge", "mkv");
        fs::write(temp.path(), b"merged").unwrap();

        temp.promote(&target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"merged");
    }

    #[test]
    fn test_unique_intermediate_names() {
        let dir = tempfile::tempdir().unwrap();
        let first = intermediate_file(dir.path(), "clean", "mkv");
        let second = intermediate_file(dir.path(), "clean", "mkv");
        assert_ne!(first.path(), second.path());
    }
}
