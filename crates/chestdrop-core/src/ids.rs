//! Identifier and retrieval-code generation.
//!
//! Session and file ids are UUID v4. Retrieval codes are six independent
//! draws from `A-Z0-9` using the thread-local CSPRNG; at 36^6 combinations
//! collisions are rare but real, so the seal path retries on unique-index
//! violations rather than assuming the first draw is free.

use rand::Rng;

use crate::constants::{RETRIEVAL_CODE_ALPHABET, RETRIEVAL_CODE_LEN};

/// Generate a fresh 6-character retrieval code.
pub fn generate_retrieval_code() -> String {
    let mut rng = rand::rng();
    (0..RETRIEVAL_CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..RETRIEVAL_CODE_ALPHABET.len());
            RETRIEVAL_CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Check a candidate against the retrieval-code shape `[A-Z0-9]{6}`.
pub fn is_valid_retrieval_code(code: &str) -> bool {
    code.len() == RETRIEVAL_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_shape() {
        for _ in 0..100 {
            let code = generate_retrieval_code();
            assert!(is_valid_retrieval_code(&code), "bad code: {}", code);
        }
    }

    #[test]
    fn test_generated_codes_vary() {
        let a = generate_retrieval_code();
        let b = generate_retrieval_code();
        let c = generate_retrieval_code();
        // 36^6 keyspace; three identical draws in a row means a broken RNG.
        assert!(!(a == b && b == c));
    }

    #[test]
    fn test_code_validation_rejects_bad_shapes() {
        assert!(is_valid_retrieval_code("ABC123"));
        assert!(is_valid_retrieval_code("ZZZZZZ"));
        assert!(is_valid_retrieval_code("000000"));
        assert!(!is_valid_retrieval_code("12345")); // too short
        assert!(!is_valid_retrieval_code("ABCDEFG")); // too long
        assert!(!is_valid_retrieval_code("ABC12!")); // punctuation
        assert!(!is_valid_retrieval_code("abc123")); // lowercase
        assert!(!is_valid_retrieval_code("ABC 12")); // whitespace
        assert!(!is_valid_retrieval_code(""));
    }
}
