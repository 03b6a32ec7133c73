//! Deterministic digests used as graph join keys and change-detection hashes.

use crate::extractor::SymbolKind;

/// Stable id of a symbol: blake3 over `repo:path:kind:name:line`.
#[must_use]
pub fn stable_symbol_id(
    repo_id: &str,
    file_path: &str,
    kind: SymbolKind,
    name: &str,
    start_line: u32,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(repo_id.as_bytes());
    hasher.update(b":");
    hasher.update(file_path.as_bytes());
    hasher.update(b":");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(start_line.to_string().as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
