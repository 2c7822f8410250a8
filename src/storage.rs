//! Storage root and client filename resolution.
//!
//! Every filename a client sends is resolved relative to a single storage
//! directory. A name resolves only if it stays inside that directory both
//! lexically (no escaping `..`, no absolute paths) and after following any
//! symlinks that already exist on disk.
//!
//! Files are not locked. A GET racing a PUT of the same name may observe a
//! partially written file; that is an accepted limitation.

use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// The directory all served and uploaded files live in.
///
/// Immutable after construction; shared between connections behind an `Arc`.
#[derive(Debug)]
pub struct StorageRoot {
    root: PathBuf,
}

impl StorageRoot {
    /// Open the storage directory, creating it if it does not exist.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let root = std::fs::canonicalize(dir)?;

        info!(root = %root.display(), "Storage directory ready");

        Ok(StorageRoot { root })
    }

    /// Canonical path of the storage directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Map a client-supplied filename to a path inside the storage root.
    pub async fn resolve(&self, filename: &str) -> Result<PathBuf, PathError> {
        let candidate = self.confine(filename)?;
        self.check_links(&candidate, filename).await?;
        Ok(candidate)
    }

    /// Lexical resolution: join onto the root and normalise `.` and `..`.
    fn confine(&self, filename: &str) -> Result<PathBuf, PathError> {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;

        for component in Path::new(filename).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(PathError::EscapesRoot(filename.to_string()));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::EscapesRoot(filename.to_string()));
                }
            }
        }

        if depth == 0 {
            return Err(PathError::NoFileName(filename.to_string()));
        }

        Ok(resolved)
    }

    /// Reject candidates whose nearest existing ancestor is a symlink
    /// leading out of the root.
    ///
    /// Paths that do not exist, including ones that pass through a regular
    /// file, are accepted; the caller finds out when it opens them.
    async fn check_links(&self, candidate: &Path, filename: &str) -> Result<(), PathError> {
        let mut existing = candidate;

        loop {
            match tokio::fs::canonicalize(existing).await {
                Ok(real) => {
                    return if real.starts_with(&self.root) {
                        Ok(())
                    } else {
                        Err(PathError::EscapesRoot(filename.to_string()))
                    };
                }
                Err(e) => {
                    match tokio::fs::symlink_metadata(existing).await {
                        // A dangling or looping symlink would be written through on PUT
                        Ok(meta) if meta.file_type().is_symlink() => {
                            return Err(PathError::EscapesRoot(filename.to_string()));
                        }
                        Ok(_) => return Err(PathError::Io(e)),
                        // Absent, or reached through a regular file
                        Err(_) => {}
                    }
                    existing = match existing.parent() {
                        Some(parent) if parent.starts_with(&self.root) => parent,
                        _ => return Err(PathError::Io(e)),
                    };
                }
            }
        }
    }
}

/// Why a filename could not be resolved.
#[derive(Debug)]
pub enum PathError {
    /// The name resolves outside the storage root.
    EscapesRoot(String),
    /// The name is empty or resolves to the root directory itself.
    NoFileName(String),
    /// The filesystem could not be inspected.
    Io(io::Error),
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::EscapesRoot(name) => {
                write!(f, "'{}' resolves outside the storage root", name)
            }
            PathError::NoFileName(name) => {
                write!(f, "'{}' does not name a file in the storage root", name)
            }
            PathError::Io(e) => write!(f, "Failed to inspect path: {}", e),
        }
    }
}

impl std::error::Error for PathError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        let storage = StorageRoot::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(storage.path().is_absolute());
    }

    #[tokio::test]
    async fn test_resolve_plain_name() {
        let dir = tempdir().unwrap();
        let storage = StorageRoot::open(dir.path()).unwrap();

        let path = storage.resolve("report.pdf").await.unwrap();
        assert_eq!(path, storage.path().join("report.pdf"));
    }

    #[tokio::test]
    async fn test_resolve_nested_and_normalised() {
        let dir = tempdir().unwrap();
        let storage = StorageRoot::open(dir.path()).unwrap();

        let path = storage.resolve("docs/./drafts/../final.txt").await.unwrap();
        assert_eq!(path, storage.path().join("docs").join("final.txt"));
    }

    #[tokio::test]
    async fn test_resolve_rejects_parent_escape() {
        let dir = tempdir().unwrap();
        let storage = StorageRoot::open(dir.path().join("store")).unwrap();

        for name in ["../secret.txt", "a/../../secret.txt", ".."] {
            match storage.resolve(name).await {
                Err(PathError::EscapesRoot(_)) => {}
                other => panic!("{name}: unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_resolve_rejects_absolute_path() {
        let dir = tempdir().unwrap();
        let storage = StorageRoot::open(dir.path()).unwrap();

        assert!(matches!(
            storage.resolve("/etc/passwd").await,
            Err(PathError::EscapesRoot(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_rejects_root_itself() {
        let dir = tempdir().unwrap();
        let storage = StorageRoot::open(dir.path()).unwrap();

        for name in ["", ".", "sub/.."] {
            assert!(
                matches!(storage.resolve(name).await, Err(PathError::NoFileName(_))),
                "{name}"
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_through_regular_file_is_absent() {
        let dir = tempdir().unwrap();
        let storage = StorageRoot::open(dir.path()).unwrap();
        std::fs::write(storage.path().join("a.txt"), b"plain").unwrap();

        let path = storage.resolve("a.txt/inner").await.unwrap();
        assert_eq!(path, storage.path().join("a.txt").join("inner"));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_symlink_out_of_root() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let storage = StorageRoot::open(dir.path()).unwrap();

        std::os::unix::fs::symlink(outside.path(), storage.path().join("link")).unwrap();

        assert!(matches!(
            storage.resolve("link/escape.txt").await,
            Err(PathError::EscapesRoot(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_dangling_symlink() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let storage = StorageRoot::open(dir.path()).unwrap();

        std::os::unix::fs::symlink(
            outside.path().join("not-yet"),
            storage.path().join("dangling"),
        )
        .unwrap();

        assert!(matches!(
            storage.resolve("dangling").await,
            Err(PathError::EscapesRoot(_))
        ));
    }
}
