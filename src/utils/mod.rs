//! Small shared helpers.

use sha2::{Digest, Sha256};

/// SHA-256 digest of `input`, hex-encoded and truncated to `hex_len` chars.
///
/// Used for options fingerprints (8 chars) and content/request hashes
/// (16 chars); long enough to make collisions irrelevant at cache scale.
pub fn short_digest(input: &str, hex_len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(hex_len + 2);
    for byte in digest.iter() {
        if out.len() >= hex_len {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(hex_len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_digest_is_stable_and_sized() {
        let a = short_digest("model:brief:0.3", 8);
        let b = short_digest("model:brief:0.3", 8);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let c = short_digest("model:brief:0.4", 8);
        assert_ne!(a, c);
    }

    #[test]
    fn short_digest_sixteen_chars() {
        assert_eq!(short_digest("alice:hello", 16).len(), 16);
    }
}
