//! Document export
//!
//! The document surface produces one flattened raster. For the file-backed
//! implementation the "document" is an image on disk, decoded and re-encoded
//! as PNG so the API always receives the format it expects.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use image::ImageFormat;
use tracing::debug;

use super::WorkFolder;

/// Source of the canvas to send for generation
pub trait DocumentSource: Send + Sync {
    /// Display name of the document
    fn name(&self) -> String;

    /// Flatten the document, write it as `input.png`, and return the PNG bytes
    fn export(&self, folder: &WorkFolder) -> Result<Vec<u8>>;
}

/// An image file on disk acting as the open document
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentSource for FileDocument {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn export(&self, folder: &WorkFolder) -> Result<Vec<u8>> {
        debug!(path = ?self.path, "FileDocument::export: called");
        if !self.path.is_file() {
            return Err(eyre!("No open document. {} does not exist", self.path.display()));
        }

        let raw = fs::read(&self.path).context(format!("Failed to read {}", self.path.display()))?;
        let png = flatten_to_png(&raw).context(format!("Failed to decode {}", self.path.display()))?;

        folder.write_input(&png)?;
        debug!(len = png.len(), "FileDocument::export: wrote input.png");
        Ok(png)
    }
}

/// Decode any supported raster and re-encode it as a single-layer PNG
pub fn flatten_to_png(raw: &[u8]) -> Result<Vec<u8>> {
    let format = image::guess_format(raw).context("Unrecognized image format")?;
    debug!(?format, "flatten_to_png: called");

    let decoded = image::load_from_memory_with_format(raw, format).context("Failed to decode image")?;

    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(out.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use tempfile::tempdir;

    /// Encode a small solid image in the given format
    pub(crate) fn sample_image(format: ImageFormat) -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 3, Rgba([200, 100, 50, 255]));
        let img = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
            _ => DynamicImage::ImageRgba8(img),
        };
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_export_png() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("photo.png");
        fs::write(&src, sample_image(ImageFormat::Png)).unwrap();
        let folder = WorkFolder::open(dir.path().join("work")).unwrap();

        let doc = FileDocument::new(&src);
        assert_eq!(doc.name(), "photo.png");

        let png = doc.export(&folder).unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
        assert_eq!(fs::read(folder.input_path()).unwrap(), png);
    }

    #[test]
    fn test_export_converts_jpeg() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("scan.jpg");
        fs::write(&src, sample_image(ImageFormat::Jpeg)).unwrap();
        let folder = WorkFolder::open(dir.path().join("work")).unwrap();

        let png = FileDocument::new(&src).export(&folder).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn test_export_missing_document() {
        let dir = tempdir().unwrap();
        let folder = WorkFolder::open(dir.path()).unwrap();
        let err = FileDocument::new(dir.path().join("missing.png"))
            .export(&folder)
            .unwrap_err();
        assert!(err.to_string().contains("No open document"));
        assert!(!folder.input_path().exists());
    }

    #[test]
    fn test_export_rejects_garbage() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("notes.png");
        fs::write(&src, b"definitely not an image").unwrap();
        let folder = WorkFolder::open(dir.path()).unwrap();
        assert!(FileDocument::new(&src).export(&folder).is_err());
    }
}
