use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub start_offset: usize, // byte offset into the source document
}

impl Chunk {
    pub fn new(index: usize, text: String, start_offset: usize) -> Self {
        Self {
            index,
            text,
            start_offset,
        }
    }

    /// Stable id for this chunk within a document, used as the vector point id
    pub fn point_id(&self, document_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(document_id.as_bytes());
        hasher.update(self.index.to_string().as_bytes());
        hasher.update(self.text.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }

    pub fn end_offset(&self) -> usize {
        self.start_offset + self.text.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable_and_document_scoped() {
        let chunk = Chunk::new(0, "Alice works at Acme.".to_string(), 0);

        assert_eq!(chunk.point_id("doc-a"), chunk.point_id("doc-a"));
        assert_ne!(chunk.point_id("doc-a"), chunk.point_id("doc-b"));
        assert_eq!(chunk.point_id("doc-a").len(), 32);
    }
}
