#![allow(dead_code)]
//! Document catalog feeding the inbox.
//!
//! Documents are loaded from `*.json` files in a directory (each file holds
//! one document or an array of them), or fall back to the built-in sample set.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::schema::{Document, DocumentStats, DocumentStatus, Language};

/// Read-only, insertion-ordered document collection.
#[derive(Debug, Clone, Default)]
pub struct DocumentCatalog {
    documents: Vec<Document>,
}

impl DocumentCatalog {
    /// Load all documents from the JSON files in `dir`, in file-name order.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("Documents directory does not exist: {:?}", dir);
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::new();
        for path in &paths {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read documents file: {:?}", path))?;
            let parsed: Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse documents file: {:?}", path))?;
            documents.extend(records_from_value(parsed, path));
        }

        let catalog = Self::from_documents(documents);
        info!(
            "Loaded {} documents from {} files in {:?}",
            catalog.len(),
            paths.len(),
            dir
        );
        Ok(catalog)
    }

    /// Build a catalog, skipping invalid records and repeated ids.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(documents.len());
        for doc in documents {
            if let Err(e) = doc.validate() {
                warn!("Skipping invalid document: {}", e);
                continue;
            }
            if !seen.insert(doc.id.clone()) {
                warn!("Skipping document with duplicate id '{}'", doc.id);
                continue;
            }
            kept.push(doc);
        }
        Self { documents: kept }
    }

    pub fn sample() -> Self {
        Self::from_documents(sample_documents())
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn stats(&self) -> DocumentStats {
        DocumentStats::from_documents(&self.documents)
    }
}

/// Typed records from one file's JSON (an array or a single object).
/// Records that do not deserialize are skipped.
fn records_from_value(value: Value, path: &Path) -> Vec<Document> {
    let records = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    records
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| match Document::deserialize(record) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Skipping malformed record {} in {:?}: {}", i, path, e);
                None
            }
        })
        .collect()
}

/// The inbox sample collection.
pub fn sample_documents() -> Vec<Document> {
    let row = |id: &str,
               title: &str,
               upload_date: &str,
               size: &str,
               status: DocumentStatus,
               language: Language,
               pages: u32,
               confidence: Option<u8>| Document {
        id: id.to_string(),
        title: title.to_string(),
        upload_date: upload_date.to_string(),
        size: size.to_string(),
        status,
        language,
        pages: Some(pages),
        confidence,
    };

    vec![
        row("1", "Annual Report 2023.pdf", "2 hours ago", "2.3 MB", DocumentStatus::Completed, Language::En, 45, Some(98)),
        row("2", "കരാർ കത്ത്.pdf", "5 hours ago", "1.1 MB", DocumentStatus::Processing, Language::Ml, 12, None),
        row("3", "Invoice_March_2024.pdf", "1 day ago", "847 KB", DocumentStatus::Completed, Language::En, 3, Some(95)),
        row("4", "Contract Agreement.pdf", "2 days ago", "1.8 MB", DocumentStatus::Failed, Language::En, 23, None),
        row("5", "സർക്കാർ ഉത്തരവ്.pdf", "3 days ago", "956 KB", DocumentStatus::Completed, Language::Ml, 8, Some(92)),
        row("6", "Financial Statement Q1.pdf", "1 week ago", "3.2 MB", DocumentStatus::Processing, Language::En, 67, None),
    ]
}
