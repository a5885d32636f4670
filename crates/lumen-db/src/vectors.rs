//! Embedding blob encoding and similarity helpers.

use lumen_core::{Error, Result, Vector};

/// Encode a vector as little-endian `f32` bytes.
pub fn to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian `f32` blob, checking the expected dimension.
pub fn from_blob(bytes: &[u8], dimension: usize) -> Result<Vector> {
    if bytes.len() != dimension * 4 {
        return Err(Error::Corrupted(format!(
            "embedding blob has {} bytes, expected {}",
            bytes.len(),
            dimension * 4
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Calculate cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Hash of the text that was embedded, used to skip re-embedding.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}
