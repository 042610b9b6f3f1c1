pub mod chunk;
pub mod chunker;
pub mod error;
pub mod reader;

pub use chunk::Chunk;
pub use chunker::{Chunker, ChunkerConfig};
pub use error::{Error, Result, RetrievalPath};
pub use reader::FileReader;

use std::path::Path;

/// Generate a fresh document ID for one ingestion request
pub fn generate_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Read a supported file and return `(display name, content)`
pub async fn load_document(file_path: &Path) -> Result<(String, String)> {
    let content = FileReader::read_file(file_path).await?;
    Ok((FileReader::display_name(file_path), content))
}
