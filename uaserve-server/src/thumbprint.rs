//! Certificate thumbprints for session channel binding.

use sha2::{Digest, Sha256};

/// SHA-256 thumbprint of a DER-encoded certificate, lowercase hex.
///
/// Session transfer compares thumbprints, never raw certificates.
pub fn certificate_thumbprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbprint_is_stable() {
        let a = certificate_thumbprint(b"certificate bytes");
        let b = certificate_thumbprint(b"certificate bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_certificates_differ() {
        assert_ne!(
            certificate_thumbprint(b"cert-a"),
            certificate_thumbprint(b"cert-b")
        );
    }
}
