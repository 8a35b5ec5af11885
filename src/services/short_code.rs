//! Short, human-typable share codes.
//!
//! Codes are drawn from an alphabet without look-alike glyphs. Generation
//! starts short and grows only under collision pressure: ten draws per
//! length, lengths 4 through 10. Nothing is reserved here; the persistence
//! layer's unique constraint is what finally arbitrates concurrent callers.

use crate::services::{gallery_service::GalleryError, repository::ShortCodeRegistry};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lowercase letters and digits minus `0 1 i j l v`.
pub const ALPHABET: &[u8] = b"abcdefghkmnopqrstuwxyz23456789";
pub const INITIAL_LENGTH: usize = 4;
pub const MAX_LENGTH: usize = 10;
pub const ATTEMPTS_PER_LENGTH: usize = 10;

#[derive(Clone)]
pub struct ShortCodeGenerator {
    registry: Arc<dyn ShortCodeRegistry>,
}

impl ShortCodeGenerator {
    pub fn new(registry: Arc<dyn ShortCodeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn generate_unique_code(&self) -> Result<String, GalleryError> {
        for length in INITIAL_LENGTH..=MAX_LENGTH {
            for _ in 0..ATTEMPTS_PER_LENGTH {
                let code = random_code(length);
                if !self.registry.short_code_taken(&code).await? {
                    info!(short_code = %code, length, "generated unique short code");
                    return Ok(code);
                }
                debug!(short_code = %code, "short code collision, retrying");
            }
            if length < MAX_LENGTH {
                warn!(length = length + 1, "increasing short code length due to collisions");
            }
        }
        Err(GalleryError::ShortCodeExhausted)
    }
}

pub fn random_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::repository::StoreResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Reports every code shorter than `free_from` as taken and records lookups.
    struct Crowded {
        free_from: usize,
        seen: Mutex<Vec<String>>,
    }

    impl Crowded {
        fn new(free_from: usize) -> Arc<Self> {
            Arc::new(Self {
                free_from,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn lengths(&self) -> Vec<usize> {
            self.seen.lock().unwrap().iter().map(String::len).collect()
        }
    }

    #[async_trait]
    impl ShortCodeRegistry for Crowded {
        async fn short_code_taken(&self, code: &str) -> StoreResult<bool> {
            self.seen.lock().unwrap().push(code.to_string());
            Ok(code.len() < self.free_from)
        }
    }

    #[test]
    fn alphabet_has_no_ambiguous_glyphs() {
        assert_eq!(ALPHABET.len(), 30);
        for c in b"01ijlvO" {
            assert!(!ALPHABET.contains(c));
        }
    }

    #[test]
    fn random_codes_use_only_the_alphabet() {
        for length in INITIAL_LENGTH..=MAX_LENGTH {
            for _ in 0..50 {
                let code = random_code(length);
                assert_eq!(code.len(), length);
                assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
            }
        }
    }

    #[tokio::test]
    async fn free_namespace_yields_a_four_character_code() {
        let registry = Crowded::new(0);
        let code = ShortCodeGenerator::new(registry.clone())
            .generate_unique_code()
            .await
            .unwrap();
        assert_eq!(code.len(), INITIAL_LENGTH);
        assert_eq!(registry.lengths(), vec![4]);
    }

    #[tokio::test]
    async fn collisions_escalate_length_ten_draws_at_a_time() {
        let registry = Crowded::new(10);
        let code = ShortCodeGenerator::new(registry.clone())
            .generate_unique_code()
            .await
            .unwrap();
        assert_eq!(code.len(), 10);

        let lengths = registry.lengths();
        assert_eq!(lengths.len(), 6 * ATTEMPTS_PER_LENGTH + 1);
        for (i, len) in (4..10).enumerate() {
            let window = &lengths[i * ATTEMPTS_PER_LENGTH..(i + 1) * ATTEMPTS_PER_LENGTH];
            assert!(window.iter().all(|l| *l == len));
        }
    }

    #[tokio::test]
    async fn exhausting_length_ten_fails() {
        let registry = Crowded::new(usize::MAX);
        let err = ShortCodeGenerator::new(registry.clone())
            .generate_unique_code()
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::ShortCodeExhausted));
        assert_eq!(registry.lengths().len(), 7 * ATTEMPTS_PER_LENGTH);
        assert_eq!(registry.lengths().last(), Some(&10));
    }
}
