//! Body digests stored next to each entry.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a response body.
///
/// Written with every entry and checked on read, so a row whose body does not
/// match what was stored is reported instead of served.
pub fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_stability() {
        assert_eq!(body_digest(b"Ext.define"), body_digest(b"Ext.define"));
    }

    #[test]
    fn test_digest_differs_by_body() {
        assert_ne!(body_digest(b"v1"), body_digest(b"v2"));
    }

    #[test]
    fn test_digest_format() {
        let digest = body_digest(b"");
        assert_eq!(digest, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
