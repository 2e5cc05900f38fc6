//! Per-request scratch files for engine output.
//!
//! Every request gets its own uniquely named file. The file is removed when
//! the [`ScratchArtifact`] is dropped, so success, engine failure, read
//! failure and panics all clean up.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use uuid::Uuid;

/// Directory in which scratch artifacts are created.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
}

impl ScratchSpace {
    /// Use `dir`, or the system temp directory when `None`. The directory is
    /// created if missing.
    pub fn new(dir: Option<PathBuf>) -> io::Result<Self> {
        let dir = dir.unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a fresh, empty `.wav` file.
    pub fn artifact(&self) -> io::Result<ScratchArtifact> {
        let id = Uuid::new_v4();
        let path = tempfile::Builder::new()
            .prefix(&format!("voxroute-{id}-"))
            .suffix(".wav")
            .tempfile_in(&self.dir)?
            .into_temp_path();
        Ok(ScratchArtifact { id, path })
    }
}

/// A scratch file that deletes itself on drop.
#[derive(Debug)]
pub struct ScratchArtifact {
    id: Uuid,
    path: TempPath,
}

impl ScratchArtifact {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back whatever the engine wrote.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.path()).await
    }
}
