//! Persistence of screenshots and page-source dumps.
//!
//! The session never touches the filesystem itself; it resolves a path with
//! [`screenshot_path`] or [`page_source_path`] and hands the bytes to an
//! [`ArtifactSink`]. Tests substitute an in-memory sink.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Destination for artifact bytes.
pub trait ArtifactSink: Send + Sync {
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// Writes artifacts to the local filesystem, creating parent directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactSink;

impl ArtifactSink for FsArtifactSink {
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
        Ok(())
    }
}

/// `dir/name`, with `.png` appended unless `name` already ends in a png or
/// jpeg extension (case-insensitive).
pub fn screenshot_path(dir: &Path, name: &str) -> PathBuf {
    let has_image_ext = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        });
    if has_image_ext {
        dir.join(name)
    } else {
        dir.join(format!("{name}.png"))
    }
}

/// `dir/name`, with `.xml` appended when `name` has no extension.
pub fn page_source_path(dir: &Path, name: &str) -> PathBuf {
    if Path::new(name).extension().is_some() {
        dir.join(name)
    } else {
        dir.join(format!("{name}.xml"))
    }
}
