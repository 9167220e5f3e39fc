/// Mock embedder for testing purposes.
///
/// Generates deterministic embeddings based on a SHA-256 of the text.
use sha2::{Digest, Sha256};

use super::{Embedder, EmbedderError};

/// A mock embedder that produces deterministic vectors from text hashes.
///
/// Useful for testing without a running embedding provider.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 64 }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let digest = Sha256::digest(text.as_bytes());

        // Signed components so unrelated texts are not all near-parallel
        let mut embedding = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let byte = digest[i % digest.len()].rotate_left((i / digest.len()) as u32);
            embedding.push((f32::from(byte) - 127.5) / 127.5);
        }

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
