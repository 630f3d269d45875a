//! Layer insertion
//!
//! The generated image is placed back into the document as a new named
//! layer. The file-backed sink copies it next to the source image.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use tracing::debug;

/// Name given to the inserted layer
pub const OUTPUT_LAYER_NAME: &str = "CrispenatorOutput";

/// Accepts a generated image and inserts it as a layer
pub trait LayerSink: Send + Sync {
    /// Insert the image at `source` as a layer named `layer_name`
    ///
    /// Returns where the layer ended up.
    fn place(&self, source: &Path, layer_name: &str) -> Result<PathBuf>;
}

/// Writes the layer to a file on disk
#[derive(Debug, Clone)]
pub struct FileLayerSink {
    destination: PathBuf,
}

impl FileLayerSink {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    /// Default destination for a document: `<dir>/<stem>-crispenator.png`
    pub fn beside(document: &Path) -> Self {
        let stem = document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let dir = document.parent().unwrap_or_else(|| Path::new("."));
        Self::new(dir.join(format!("{}-crispenator.png", stem)))
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

impl LayerSink for FileLayerSink {
    fn place(&self, source: &Path, layer_name: &str) -> Result<PathBuf> {
        debug!(?source, destination = ?self.destination, %layer_name, "FileLayerSink::place: called");
        let bytes = fs::read(source).context(format!("Failed to read {}", source.display()))?;
        if bytes.is_empty() {
            return Err(eyre!("Generated image at {} is empty", source.display()));
        }

        if let Some(parent) = self.destination.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
        fs::write(&self.destination, &bytes)
            .context(format!("Failed to write {}", self.destination.display()))?;
        Ok(self.destination.clone())
    }
}
