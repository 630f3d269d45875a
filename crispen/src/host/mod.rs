//! Host collaborators
//!
//! The document, credential store and layer surface the generator talks to.
//! Each is a small trait so the session can run against files on disk (the
//! CLI) or anything else that can produce and accept image bytes.

mod document;
mod key_store;
mod layer;
mod work_folder;

pub use document::{DocumentSource, FileDocument, flatten_to_png};
pub use key_store::{FileKeyStore, KeyStore, mask_key};
pub use layer::{FileLayerSink, LayerSink, OUTPUT_LAYER_NAME};
pub use work_folder::{ArtifactStore, INPUT_FILE, KEY_FILE, OUTPUT_FILE, WorkFolder};

#[cfg(test)]
pub(crate) use document::tests::sample_image;
