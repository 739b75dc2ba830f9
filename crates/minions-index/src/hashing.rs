//! Content and path digests used for change detection and key derivation.
//!
//! The content hash decides whether a file must be re-indexed and has to
//! detect any change, so it is SHA-256. The path hash only turns a relative
//! path into a fixed-width storage key suffix; MD5 is plenty for that.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a file's full text.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// MD5 hex digest of a workspace-relative path.
pub fn path_hash(relative_path: &str) -> String {
    format!("{:x}", md5::compute(relative_path.as_bytes()))
}

/// Returns true when a file must be (re-)indexed.
///
/// `stored_hash` is the content hash recorded at the last successful index
/// of the file, if there is one.
pub fn needs_reindex(stored_hash: Option<&str>, current_hash: &str) -> bool {
    match stored_hash {
        Some(stored) => stored != current_hash,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let hash = content_hash("test content");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_content_hash_detects_single_byte_change() {
        assert_ne!(content_hash("fn main() {}\n"), content_hash("fn main() {}"));
    }

    #[test]
    fn test_path_hash_is_stable() {
        let a = path_hash("src/main.rs");
        assert_eq!(a, path_hash("src/main.rs"));
        assert_eq!(a.len(), 32);
        assert_ne!(a, path_hash("src/lib.rs"));
        assert_eq!(path_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_needs_reindex() {
        // New file needs update
        assert!(needs_reindex(None, "hash1"));

        // Same hash doesn't need update
        assert!(!needs_reindex(Some("hash1"), "hash1"));

        // Different hash needs update
        assert!(needs_reindex(Some("hash1"), "hash2"));
    }
}
