//! Content hashing for ingested archives

/// Calculate the SHA256 digest of raw archive bytes.
///
/// The digest doubles as the served tarball filename (`<digest>.tgz`), so it
/// must be deterministic for identical input bytes. Returned as lowercase hex.
pub fn sha256_hash(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Calculate the SHA1 hash of data.
///
/// npm records a SHA1 checksum in each version's `dist.shasum` field, and
/// clients verify downloads against it.
pub fn sha1_hash(data: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha1_of_empty_input() {
        assert_eq!(sha1_hash(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn digests_are_deterministic_and_content_addressed() {
        let a = sha256_hash(b"archive bytes");
        let b = sha256_hash(b"archive bytes");
        let c = sha256_hash(b"different bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
