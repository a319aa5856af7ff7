//! Where artifact contents come from.

use crate::diagnosis::ArtifactRef;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Resolves an opaque artifact handle to its text.
pub trait ArtifactSource: Send + Sync {
    fn read(&self, artifact: &ArtifactRef) -> io::Result<String>;
}

/// Reads artifacts from disk. Relative handles resolve against `root`.
#[derive(Debug, Clone)]
pub struct FsArtifactSource {
    root: PathBuf,
}

impl FsArtifactSource {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn resolve(&self, artifact: &ArtifactRef) -> PathBuf {
        let path = Path::new(artifact.as_str());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ArtifactSource for FsArtifactSource {
    fn read(&self, artifact: &ArtifactRef) -> io::Result<String> {
        std::fs::read_to_string(self.resolve(artifact))
    }
}

/// In-memory artifact set, used when generated files have not been written out.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactSource {
    files: HashMap<String, String>,
}

impl MemoryArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, handle: &str, content: &str) -> Self {
        self.files.insert(handle.to_string(), content.to_string());
        self
    }
}

impl ArtifactSource for MemoryArtifactSource {
    fn read(&self, artifact: &ArtifactRef) -> io::Result<String> {
        self.files.get(artifact.as_str()).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("artifact {} not found", artifact),
            )
        })
    }
}
