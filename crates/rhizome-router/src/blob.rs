//! Blob store
//!
//! Blobs travel inline between WebSocket peers but as files between the
//! router and OSC peers. Every file the router reads or writes must live
//! inside the configured blob directory: paths are normalized lexically,
//! then canonicalized and checked again so symlinks cannot lead outside.

use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, RouterError};

#[derive(Debug, Clone)]
pub struct BlobStore {
    /// Canonical blob directory
    root: PathBuf,
    /// Blob directory as configured, made absolute
    configured: PathBuf,
}

impl BlobStore {
    /// Open the store, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        let root = dir.canonicalize().map_err(|e| io_error(dir, e))?;
        let configured = if dir.is_absolute() {
            normalize(dir).unwrap_or_else(|| root.clone())
        } else {
            root.clone()
        };
        debug!("Blob store at {}", root.display());
        Ok(Self { root, configured })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lexically resolve `raw` to a path inside the store.
    ///
    /// Relative paths are taken relative to the blob directory. The
    /// directory itself is not a valid blob path.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        if raw.is_empty() {
            return Err(RouterError::BlobPath("empty path".into()));
        }
        let candidate = Path::new(raw);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        let normalized = normalize(&joined)
            .ok_or_else(|| RouterError::BlobPath(format!("{} escapes the blob directory", raw)))?;

        for base in [&self.root, &self.configured] {
            if normalized.starts_with(base) && normalized != *base {
                return Ok(normalized);
            }
        }
        Err(RouterError::BlobPath(format!(
            "{} is outside the blob directory",
            raw
        )))
    }

    /// Resolve `raw` and check the real location of the existing file.
    ///
    /// Must succeed before the file is opened.
    pub async fn contain(&self, raw: &str) -> Result<PathBuf> {
        let lexical = self.resolve(raw)?;
        let real = tokio::fs::canonicalize(&lexical)
            .await
            .map_err(|e| io_error(&lexical, e))?;
        if !real.starts_with(&self.root) || real == self.root {
            return Err(RouterError::BlobPath(format!(
                "{} resolves outside the blob directory",
                raw
            )));
        }
        Ok(real)
    }

    /// Store `data` under a fresh unique name, returns the file path
    pub async fn write(&self, data: &[u8]) -> Result<PathBuf> {
        let path = self.root.join(Uuid::new_v4().simple().to_string());
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| io_error(&path, e))?;
        debug!("Stored blob of {} bytes at {}", data.len(), path.display());
        Ok(path)
    }

    /// Read a stored blob
    pub async fn read(&self, raw: &str) -> Result<Bytes> {
        let path = self.contain(raw).await?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(Bytes::from(data))
    }
}

/// Drop `.` components and apply `..` without touching the filesystem.
/// `None` if `..` climbs above the root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(segment) => out.push(segment),
        }
    }
    Some(out)
}

fn io_error(path: &Path, source: std::io::Error) -> RouterError {
    RouterError::BlobIo {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/a/./b/../c")),
            Some(PathBuf::from("/a/c"))
        );
        assert_eq!(normalize(Path::new("/a/../..")), None);
        assert_eq!(normalize(Path::new("a/../..")), None);
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();

        assert!(store.resolve("../../etc/passwd").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("").is_err());
        assert!(store.resolve(".").is_err());
        assert!(store.resolve("sub/../file").is_ok());
    }
}
