#![allow(dead_code)]
//! Document catalog types shared by the filter engine and the HTTP layer.
//!
//! Documents are owned by an external backend; the inbox only ever reads them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A facet or mode value that did not match any known wire name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct FacetParseError {
    pub kind: &'static str,
    pub value: String,
}

impl FacetParseError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// OCR processing status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Completed,
    Processing,
    Failed,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 3] = [Self::Completed, Self::Processing, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Processing => "processing",
            Self::Failed => "failed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::Processing => "Processing",
            Self::Failed => "Failed",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = FacetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "processing" => Ok(Self::Processing),
            "failed" => Ok(Self::Failed),
            _ => Err(FacetParseError::new("status", s)),
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognition language of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    En,
    Ml,
}

impl Language {
    pub const ALL: [Language; 2] = [Self::En, Self::Ml];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ml => "ml",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Ml => "Malayalam",
        }
    }
}

impl FromStr for Language {
    type Err = FacetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Self::En),
            "ml" => Ok(Self::Ml),
            _ => Err(FacetParseError::new("language", s)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document as listed in the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Display-formatted ("2 hours ago"); never parsed.
    #[serde(alias = "uploadDate")]
    pub upload_date: String,
    /// Display-formatted ("2.3 MB").
    pub size: String,
    pub status: DocumentStatus,
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
    /// OCR confidence percentage, only meaningful once processing completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

/// Reasons a document record is refused at the catalog boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("document id is empty")]
    EmptyId,
    #[error("document {id}: confidence {confidence} exceeds 100")]
    ConfidenceOutOfRange { id: String, confidence: u8 },
    #[error("document {id}: confidence present while status is {status}")]
    ConfidenceBeforeCompletion { id: String, status: DocumentStatus },
}

impl Document {
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.id.trim().is_empty() {
            return Err(DocumentError::EmptyId);
        }
        if let Some(confidence) = self.confidence {
            if confidence > 100 {
                return Err(DocumentError::ConfidenceOutOfRange {
                    id: self.id.clone(),
                    confidence,
                });
            }
            if self.status != DocumentStatus::Completed {
                return Err(DocumentError::ConfidenceBeforeCompletion {
                    id: self.id.clone(),
                    status: self.status,
                });
            }
        }
        Ok(())
    }
}

/// Per-status partition counts over a document collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    pub total: usize,
    pub completed: usize,
    pub processing: usize,
    pub failed: usize,
}

impl DocumentStats {
    pub fn from_documents<'a, I>(documents: I) -> Self
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut stats = Self::default();
        for doc in documents {
            stats.total += 1;
            match doc.status {
                DocumentStatus::Completed => stats.completed += 1,
                DocumentStatus::Processing => stats.processing += 1,
                DocumentStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
pub(crate) fn doc(id: &str, title: &str, status: DocumentStatus, language: Language) -> Document {
    Document {
        id: id.to_string(),
        title: title.to_string(),
        upload_date: "1 day ago".to_string(),
        size: "1.0 MB".to_string(),
        status,
        language,
        pages: Some(1),
        confidence: (status == DocumentStatus::Completed).then_some(90),
    }
}
