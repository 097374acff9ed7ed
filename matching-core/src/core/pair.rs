use crate::core::error::InputError;
use crate::core::types::{Pair, PairId};
use flurry::HashMap;

/// Stores token-pair metadata sourced from the ledger's event stream.
///
/// The core never fabricates a pair: entries only appear in response to
/// a `PairRegistered` ledger event, which keeps the registry rebuildable
/// from a cold replay of `event_stream()`.
pub struct PairRegistry {
    pairs: HashMap<PairId, Pair>,
}

impl PairRegistry {
    pub fn new() -> Self {
        Self {
            pairs: HashMap::new(),
        }
    }

    /// Applies a `pair_registered` ledger event. Idempotent: re-applying
    /// the same pair is a no-op beyond overwriting identical fields.
    pub fn upsert(&self, pair: Pair) -> Result<(), InputError> {
        if pair.tick_size == 0 || pair.max_tick_range == 0 {
            return Err(InputError::InvalidPair(pair.pair_id));
        }
        let pins = self.pairs.pin();
        pins.insert(pair.pair_id, pair);
        Ok(())
    }

    /// Toggles `active`. Idempotent; fails if the pair was never
    /// registered.
    pub fn set_active(&self, pair_id: PairId, active: bool) -> Result<(), InputError> {
        let pins = self.pairs.pin();
        let Some(existing) = pins.get(&pair_id).copied() else {
            return Err(InputError::PairNotFound(pair_id));
        };
        pins.insert(pair_id, Pair { active, ..existing });
        Ok(())
    }

    /// Looks up a pair regardless of its active flag.
    pub fn get(&self, pair_id: PairId) -> Option<Pair> {
        let pins = self.pairs.pin();
        pins.get(&pair_id).copied()
    }

    /// Returns the pair, or a precise rejection if it is missing or
    /// deactivated.
    pub fn require_active(&self, pair_id: PairId) -> Result<Pair, InputError> {
        match self.get(pair_id) {
            None => Err(InputError::PairNotFound(pair_id)),
            Some(pair) if !pair.active => Err(InputError::PairInactive(pair_id)),
            Some(pair) => Ok(pair),
        }
    }
}

impl Default for PairRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(pair_id: PairId) -> Pair {
        Pair {
            pair_id,
            base_token_id: 1,
            quote_token_id: 2,
            tick_size: 100,
            max_tick_range: 50,
            active: true,
        }
    }

    #[test]
    fn upsert_then_require_active() {
        let registry = PairRegistry::new();
        registry.upsert(pair(1)).unwrap();
        assert_eq!(registry.require_active(1).unwrap().tick_size, 100);
    }

    #[test]
    fn upsert_rejects_zero_tick_size() {
        let registry = PairRegistry::new();
        let mut bad = pair(1);
        bad.tick_size = 0;
        assert!(matches!(
            registry.upsert(bad),
            Err(InputError::InvalidPair(1))
        ));
    }

    #[test]
    fn set_active_toggles_and_is_idempotent() {
        let registry = PairRegistry::new();
        registry.upsert(pair(1)).unwrap();
        registry.set_active(1, false).unwrap();
        assert!(matches!(
            registry.require_active(1),
            Err(InputError::PairInactive(1))
        ));
        registry.set_active(1, false).unwrap();
        registry.set_active(1, true).unwrap();
        assert!(registry.require_active(1).is_ok());
    }

    #[test]
    fn set_active_unknown_pair_fails() {
        let registry = PairRegistry::new();
        assert!(matches!(
            registry.set_active(99, true),
            Err(InputError::PairNotFound(99))
        ));
    }

    #[test]
    fn require_active_unknown_pair_fails() {
        let registry = PairRegistry::new();
        assert!(matches!(
            registry.require_active(1),
            Err(InputError::PairNotFound(1))
        ));
    }
}
