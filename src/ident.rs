use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{IsolatorConfig, NAMESPACE_ID_ALPHABET, NAMESPACE_ID_LENGTH};
use crate::error::IsolateResult;

/// Process-wide generator behind `new_id()`
static SHARED: Lazy<IdGenerator> = Lazy::new(IdGenerator::from_entropy);

/// Random namespace name: 10 ASCII letters, safe to embed in SQL unescaped
pub fn new_id() -> String {
    SHARED.next_id()
}

/// Namespace name generator
///
/// The RNG sits behind a mutex so one generator can serve concurrently
/// running tests. Uniqueness is probabilistic: 52^10 possible names.
#[derive(Debug)]
pub struct IdGenerator {
    rng: Mutex<StdRng>,
    length: usize,
}

impl IdGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            length: NAMESPACE_ID_LENGTH,
        }
    }

    /// Deterministic sequence of names, for reproducible test runs
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            length: NAMESPACE_ID_LENGTH,
        }
    }

    pub fn from_config(config: &IsolatorConfig) -> IsolateResult<Self> {
        config.validate()?;
        let generator = match config.seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        };
        Ok(Self {
            length: config.id_length,
            ..generator
        })
    }

    /// Characters in every generated name
    pub fn id_length(&self) -> usize {
        self.length
    }

    pub fn next_id(&self) -> String {
        // A panic while holding the lock cannot leave the RNG half-updated
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..self.length)
            .map(|_| char::from(NAMESPACE_ID_ALPHABET[rng.gen_range(0..NAMESPACE_ID_ALPHABET.len())]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_id_shape() {
        for _ in 0..100 {
            let id = new_id();
            assert_eq!(id.len(), 10);
            assert!(id.chars().all(|c| c.is_ascii_alphabetic()), "{id}");
            assert!(crate::validation::validate_namespace_name(&id).is_ok());
        }
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a = IdGenerator::seeded(1);
        let b = IdGenerator::seeded(1);
        let c = IdGenerator::seeded(2);

        let first: Vec<String> = (0..5).map(|_| a.next_id()).collect();
        let second: Vec<String> = (0..5).map(|_| b.next_id()).collect();
        let third: Vec<String> = (0..5).map(|_| c.next_id()).collect();

        assert_eq!(first, second);
        assert_ne!(first, third);
    }

    #[test]
    fn test_from_config_length() {
        let config = IsolatorConfig { id_length: 24, seed: Some(9) };
        let generator = IdGenerator::from_config(&config).unwrap();

        assert_eq!(generator.id_length(), 24);
        assert_eq!(generator.next_id().len(), 24);

        let bad = IsolatorConfig { id_length: 0, seed: None };
        crate::error::testing::assert_configuration_error(IdGenerator::from_config(&bad), "22023");
    }

    #[test]
    fn test_concurrent_generation() {
        let generator = IdGenerator::from_entropy();
        let ids: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| (0..250).map(|_| generator.next_id()).collect::<Vec<_>>()))
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(ids.len(), 2000);
        assert!(ids.iter().all(|id| id.len() == 10));
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }
}
