use sha2::{Digest, Sha256};

/// Lower-cases, drops punctuation and collapses whitespace runs.
pub fn normalize_question_text(text: &str) -> String {
    let stripped: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex SHA-256 of the normalized text, used for exact-duplicate lookups.
pub fn question_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_question_text(text).as_bytes());
    hex::encode(hasher.finalize())
}
