//! Bounded LRU cache of loaded sessions.
//!
//! The cache outlives individual session activations, storing one snapshot per
//! session id. This makes switching back to a recently viewed case instant,
//! without another trip through the summary stream.
//!
//! # Recency
//! Every insert or hit stamps the entry with the next value of a monotonic
//! counter; the entry with the smallest stamp is the least recently used.

use crate::{GeneCollection, SessionId, SummaryTotals};
use log::debug;
use std::collections::HashMap;

/// Snapshot of one session's loaded results.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCacheEntry {
    pub genes: GeneCollection,
    pub totals: SummaryTotals,
}

impl SessionCacheEntry {
    pub fn new(genes: GeneCollection, totals: SummaryTotals) -> Self {
        Self { genes, totals }
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

#[derive(Debug)]
struct Slot {
    entry: SessionCacheEntry,
    last_used: u64,
}

/// Holds at most `capacity` session snapshots.
#[derive(Debug)]
pub struct SessionCache {
    capacity: usize,
    slots: HashMap<SessionId, Slot>,
    clock: u64,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: HashMap::with_capacity(capacity),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Store a snapshot, evicting the least recently used session if full.
    ///
    /// Empty snapshots are refused and `false` is returned.
    pub fn save(&mut self, session_id: &str, entry: SessionCacheEntry) -> bool {
        if entry.is_empty() || self.capacity == 0 {
            return false;
        }

        let last_used = self.tick();
        if let Some(slot) = self.slots.get_mut(session_id) {
            slot.entry = entry;
            slot.last_used = last_used;
            return true;
        }

        if self.slots.len() >= self.capacity {
            if let Some(oldest) = self.least_recent() {
                debug!("Evicting cached session {}", oldest);
                self.slots.remove(&oldest);
            }
        }
        self.slots
            .insert(session_id.to_string(), Slot { entry, last_used });
        true
    }

    /// Look up a session and mark it most recently used.
    pub fn get(&mut self, session_id: &str) -> Option<&SessionCacheEntry> {
        let last_used = self.tick();
        let slot = self.slots.get_mut(session_id)?;
        slot.last_used = last_used;
        Some(&slot.entry)
    }

    /// Look up a session without touching its recency.
    pub fn peek(&self, session_id: &str) -> Option<&SessionCacheEntry> {
        self.slots.get(session_id).map(|slot| &slot.entry)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.slots.contains_key(session_id)
    }

    pub fn remove(&mut self, session_id: &str) -> Option<SessionCacheEntry> {
        self.slots.remove(session_id).map(|slot| slot.entry)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached session ids, least recently used first.
    pub fn sessions(&self) -> Vec<SessionId> {
        let mut ordered: Vec<(&SessionId, u64)> = self
            .slots
            .iter()
            .map(|(id, slot)| (id, slot.last_used))
            .collect();
        ordered.sort_by_key(|&(_, last_used)| last_used);
        ordered.into_iter().map(|(id, _)| id.clone()).collect()
    }

    fn least_recent(&self) -> Option<SessionId> {
        self.slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(id, _)| id.clone())
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(crate::config::MAX_CACHED_SESSIONS)
    }
}
