//! # Finalization Price History
//!
//! Run-length encoded record of the rates withdrawal batches were finalized
//! at. Entry `k` prices every request id in
//! `(entries[k - 1].last_index_covered, entries[k].last_index_covered]`.
//! Consecutive batches whose integer price ratio (1e27 scale) matches share
//! one entry.

use crate::errors::{CoreResult, StakingCoreError};
use crate::exchange_rate::ExchangeRate;

/// One run of the price history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct FinalizationPrice {
    pub pool_value: u128,
    pub shares: u128,
    pub last_index_covered: u64,
}

impl FinalizationPrice {
    pub fn rate(&self) -> CoreResult<ExchangeRate> {
        ExchangeRate::from_u128(self.pool_value, self.shares)
    }
}

/// Ordered price entries, `last_index_covered` strictly increasing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "client", serde(transparent))]
pub struct PriceHistory {
    entries: Vec<FinalizationPrice>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[FinalizationPrice] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FinalizationPrice> {
        self.entries.get(index)
    }

    /// Record a batch ending at `last_id` priced at `pool_value / shares`.
    /// Extends the last run if the integer ratio is unchanged.
    pub fn record(&mut self, last_id: u64, pool_value: u128, shares: u128) -> CoreResult<()> {
        let price = ExchangeRate::from_u128(pool_value, shares)?.price_e27()?;

        if let Some(last) = self.entries.last() {
            if last_id <= last.last_index_covered {
                return Err(StakingCoreError::InvalidRange {
                    last_id,
                    finalized: last.last_index_covered + 1,
                    length: last_id + 1,
                });
            }
            if last.rate()?.price_e27()? == price {
                if let Some(last) = self.entries.last_mut() {
                    last.last_index_covered = last_id;
                }
                return Ok(());
            }
        }

        self.entries.push(FinalizationPrice {
            pool_value,
            shares,
            last_index_covered: last_id,
        });
        Ok(())
    }

    /// O(1) check that `hint` is the entry covering `request_id`
    pub fn is_valid_hint(&self, hint: usize, request_id: u64) -> bool {
        let Some(entry) = self.entries.get(hint) else {
            return false;
        };
        if entry.last_index_covered < request_id {
            return false;
        }
        hint == 0 || self.entries[hint - 1].last_index_covered < request_id
    }

    /// Reverse linear scan for the entry covering `request_id`.
    ///
    /// Unbounded in the number of entries; callers are expected to pass a
    /// valid hint and only fall back here on a miss.
    pub fn find_linear(&self, request_id: u64) -> CoreResult<usize> {
        let mut index = self.entries.len();
        while index > 0 && self.entries[index - 1].last_index_covered >= request_id {
            index -= 1;
        }
        if index == self.entries.len() {
            return Err(StakingCoreError::PriceNotFound(request_id));
        }
        Ok(index)
    }

    /// Binary search over `last_index_covered`; agrees with [`Self::find_linear`]
    pub fn find_indexed(&self, request_id: u64) -> CoreResult<usize> {
        let index = self
            .entries
            .partition_point(|entry| entry.last_index_covered < request_id);
        if index == self.entries.len() {
            return Err(StakingCoreError::PriceNotFound(request_id));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> PriceHistory {
        let mut history = PriceHistory::new();
        history.record(2, 100, 100).unwrap();
        history.record(5, 110, 100).unwrap();
        history.record(6, 120, 100).unwrap();
        history
    }

    #[test]
    fn test_equal_ratio_collapses() {
        let mut history = PriceHistory::new();
        history.record(0, 100, 100).unwrap();
        history.record(3, 200, 200).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].last_index_covered, 3);

        history.record(4, 201, 200).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_record_rejects_non_increasing_bound() {
        let mut history = history();
        assert!(history.record(6, 130, 100).is_err());
        assert!(history.record(7, 1, 0).is_err());
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_lookups_agree() {
        let history = history();
        let expected = [0, 0, 0, 1, 1, 1, 2];
        for (id, want) in expected.iter().enumerate() {
            assert_eq!(history.find_linear(id as u64).unwrap(), *want);
            assert_eq!(history.find_indexed(id as u64).unwrap(), *want);
            assert!(history.is_valid_hint(*want, id as u64));
        }
        assert_eq!(history.find_linear(7), Err(StakingCoreError::PriceNotFound(7)));
        assert_eq!(history.find_indexed(7), Err(StakingCoreError::PriceNotFound(7)));
    }

    #[test]
    fn test_hint_validation() {
        let history = history();
        assert!(!history.is_valid_hint(1, 2));
        assert!(!history.is_valid_hint(0, 3));
        assert!(!history.is_valid_hint(3, 6));
        assert!(history.is_valid_hint(2, 6));
    }
}
