//! Reading raw documents from disk

use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Separator placed between documents when they are combined into one prompt
pub const DOCUMENT_SEPARATOR: &str = "\n\n--- DOCUMENT SEPARATOR ---\n\n";

/// Read every text file directly inside `dir`, in file-name order
///
/// Subdirectories are not descended into. Files that cannot be read as UTF-8
/// are skipped with a warning, and a missing directory yields no documents.
pub fn read_documents_from_directory(dir: &Path) -> Vec<String> {
    debug!(dir = %dir.display(), "read_documents_from_directory: called");
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "Document directory does not exist");
        return Vec::new();
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        match std::fs::read_to_string(entry.path()) {
            Ok(content) => {
                debug!(path = %entry.path().display(), len = content.len(), "read_documents_from_directory: read");
                documents.push(content);
            }
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping unreadable document");
            }
        }
    }
    documents
}

/// Join documents into the single block handed to extraction
pub fn combine_documents(documents: &[String]) -> String {
    documents.join(DOCUMENT_SEPARATOR)
}
