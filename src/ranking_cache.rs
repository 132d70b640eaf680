//! Cache for exact potential rankings, keyed per slot and rarity

use crate::potential::{PotentialSet, PotentialType, Rarity, SlotId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Composite cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankingKey {
    pub slot: SlotId,
    pub rarity: Rarity,
    pub potential_type: PotentialType,
}

/// One distinct line combination and its exact DPS gain (percent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub set: PotentialSet,
    pub dps_gain: f64,
}

/// Results live until explicitly invalidated, which callers do whenever the
/// baseline stats change. At most one computation per key is in flight.
#[derive(Debug, Default)]
pub struct RankingCache {
    entries: HashMap<RankingKey, Arc<[RankingEntry]>>,
    in_flight: HashSet<RankingKey>,
}

impl RankingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RankingKey) -> Option<Arc<[RankingEntry]>> {
        self.entries.get(key).cloned()
    }

    pub fn is_in_flight(&self, key: &RankingKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Claim a key for computation. False if someone already holds it.
    pub fn begin(&mut self, key: RankingKey) -> bool {
        self.in_flight.insert(key)
    }

    /// Store a finished computation and release the claim
    pub fn complete(&mut self, key: RankingKey, entries: Vec<RankingEntry>) -> Arc<[RankingEntry]> {
        self.in_flight.remove(&key);
        let entries: Arc<[RankingEntry]> = entries.into();
        self.entries.insert(key, Arc::clone(&entries));
        entries
    }

    /// Release a claim without storing anything (cancelled computation)
    pub fn abandon(&mut self, key: &RankingKey) {
        self.in_flight.remove(key);
    }

    /// Drop every cached result; in-flight claims are left to finish
    pub fn invalidate_all(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(entries = self.entries.len(), "invalidating ranking cache");
        }
        self.entries.clear();
    }

    /// Drop cached results for one slot
    pub fn invalidate_slot(&mut self, slot: SlotId) {
        self.entries.retain(|k, _| k.slot != slot);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Claim on one key that is released when dropped, unless completed.
///
/// Keeps a key from staying in flight after a cancelled or panicking
/// computation.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    cache: &'a mut RankingCache,
    key: RankingKey,
    settled: bool,
}

impl<'a> InFlightGuard<'a> {
    /// None when the key is already claimed
    pub fn begin(cache: &'a mut RankingCache, key: RankingKey) -> Option<Self> {
        if cache.begin(key) {
            Some(Self { cache, key, settled: false })
        } else {
            None
        }
    }

    pub fn complete(mut self, entries: Vec<RankingEntry>) -> Arc<[RankingEntry]> {
        self.settled = true;
        self.cache.complete(self.key, entries)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.cache.abandon(&self.key);
        }
    }
}
