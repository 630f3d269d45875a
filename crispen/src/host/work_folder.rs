//! Work folder holding the exchange files of a run
//!
//! Layout:
//! - `input.png`  - flattened canvas handed to the API
//! - `output.png` - generated image, written once on success
//! - `key.txt`    - stored API credential

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::debug;

pub const INPUT_FILE: &str = "input.png";
pub const OUTPUT_FILE: &str = "output.png";
pub const KEY_FILE: &str = "key.txt";

/// Destination for the generated artifact
pub trait ArtifactStore: Send + Sync {
    /// Persist the artifact bytes, returning where they landed
    fn write_artifact(&self, bytes: &[u8]) -> Result<PathBuf>;
}

/// Directory the run exchanges files through
#[derive(Debug, Clone)]
pub struct WorkFolder {
    root: PathBuf,
}

impl WorkFolder {
    /// Open (creating if needed) a work folder
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        debug!(?root, "WorkFolder::open: called");
        fs::create_dir_all(&root).context(format!("Failed to create work folder {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn input_path(&self) -> PathBuf {
        self.root.join(INPUT_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.root.join(OUTPUT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.root.join(KEY_FILE)
    }

    /// Write the exported canvas
    pub fn write_input(&self, png: &[u8]) -> Result<PathBuf> {
        let path = self.input_path();
        debug!(?path, len = png.len(), "WorkFolder::write_input: called");
        fs::write(&path, png).context("Failed to write input.png")?;
        Ok(path)
    }

    /// Remove a stale output so a new run cannot look finished early
    pub fn clear_output(&self) -> Result<()> {
        let path = self.output_path();
        if path.exists() {
            debug!(?path, "WorkFolder::clear_output: removing stale output");
            fs::remove_file(&path).context("Failed to remove stale output.png")?;
        }
        Ok(())
    }
}

impl ArtifactStore for WorkFolder {
    fn write_artifact(&self, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.output_path();
        debug!(?path, len = bytes.len(), "WorkFolder::write_artifact: called");
        fs::write(&path, bytes).context("Failed to write output.png")?;
        Ok(path)
    }
}
