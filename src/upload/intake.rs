//! Dropzone acceptance rules applied before files reach the lifecycle.

use serde::Serialize;
use tracing::warn;

use super::FileRef;
use crate::config::DEFAULT_MAX_UPLOAD_BYTES;

/// Extensions the dropzone accepts: PDFs and scanned images.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tiff"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IntakeRejection {
    #[error("{name}: unsupported file type (accepted: PDF, PNG, JPG, JPEG, TIFF)")]
    UnsupportedType { name: String },
    #[error("{name}: {size} bytes exceeds the {max} byte limit")]
    TooLarge { name: String, size: u64, max: u64 },
    #[error("{name}: file is empty")]
    Empty { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropzonePolicy {
    pub max_bytes: u64,
}

impl Default for DropzonePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl DropzonePolicy {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn check(&self, file: &FileRef) -> Result<(), IntakeRejection> {
        let extension = file
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        let accepted = extension
            .as_deref()
            .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        if !accepted {
            return Err(IntakeRejection::UnsupportedType {
                name: file.name.clone(),
            });
        }
        if file.size_bytes == 0 {
            return Err(IntakeRejection::Empty {
                name: file.name.clone(),
            });
        }
        if file.size_bytes > self.max_bytes {
            return Err(IntakeRejection::TooLarge {
                name: file.name.clone(),
                size: file.size_bytes,
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Split a dropped batch into accepted files and per-file rejections.
    pub fn partition(&self, files: Vec<FileRef>) -> (Vec<FileRef>, Vec<IntakeRejection>) {
        let mut accepted = Vec::with_capacity(files.len());
        let mut rejected = Vec::new();
        for file in files {
            match self.check(&file) {
                Ok(()) => accepted.push(file),
                Err(rejection) => {
                    warn!("Rejected upload {}", rejection);
                    rejected.push(rejection);
                }
            }
        }
        (accepted, rejected)
    }
}
