use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::ModelLoadError;

/// Model bytes, opaque to the pipeline.
///
/// Files are memory-mapped; tests and embedded models wrap owned bytes. Cloning is cheap.
#[derive(Clone)]
pub struct ModelAsset {
    name: String,
    bytes: ModelBytes,
}

#[derive(Clone)]
enum ModelBytes {
    Mapped(Arc<Mmap>),
    Owned(Arc<[u8]>),
}

impl ModelAsset {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let io_err = |err: std::io::Error| ModelLoadError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        };
        let file = File::open(path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();
        let bytes = if len == 0 {
            // Zero-length maps are rejected on some platforms.
            ModelBytes::Owned(Arc::from(Vec::new()))
        } else {
            // SAFETY: the mapping is read-only and the model file is not modified while the
            // daemon runs.
            let map = unsafe { Mmap::map(&file) }.map_err(io_err)?;
            ModelBytes::Mapped(Arc::new(map))
        };
        Ok(Self {
            name: path.display().to_string(),
            bytes,
        })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: ModelBytes::Owned(Arc::from(bytes.into())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.bytes {
            ModelBytes::Mapped(map) => map,
            ModelBytes::Owned(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.bytes, ModelBytes::Mapped(_))
    }
}

impl std::fmt::Debug for ModelAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAsset")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_file_contents() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"onnx-bytes")?;
        let asset = ModelAsset::open(file.path())?;
        assert!(asset.is_mapped());
        assert_eq!(asset.as_bytes(), b"onnx-bytes");
        Ok(())
    }

    #[test]
    fn empty_file_is_an_empty_asset() -> anyhow::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let asset = ModelAsset::open(file.path())?;
        assert!(asset.is_empty());
        Ok(())
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ModelAsset::open("/nonexistent/leafwatch.onnx").unwrap_err();
        assert!(matches!(err, ModelLoadError::Io { .. }));
    }
}
