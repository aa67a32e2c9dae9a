use crate::token::Token;
use rustc_hash::FxHashMap;
use serde::Serialize;

const INITIAL_CAPACITY: usize = 16;

/// What the table counts when deciding whether to grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GrowthPolicy {
    /// Every insert call counts, including ones that only bump an existing
    /// count. Capacity tracks the number of lines matched, not distinct codes.
    #[default]
    InsertOps,
    /// Only distinct occupied slots count.
    Occupancy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationEntry {
    pub token: Token,
    pub count: u64,
}

#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Empty,
    Occupied(AggregationEntry),
}

/// Open-addressing count table keyed by error code.
///
/// Slots are located with a polynomial rolling hash (`h = h * 31 + byte`)
/// reduced modulo the current capacity, collisions resolved by linear probing.
/// The table doubles once the growth measure (see [`GrowthPolicy`]) reaches
/// half the capacity, so there is always an empty slot to stop a probe.
#[derive(Debug, Clone)]
pub struct AggregationTable {
    slots: Vec<Slot>,
    len: usize,
    insert_ops: usize,
    growth: GrowthPolicy,
}

fn hash(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |h, &b| h.wrapping_mul(31).wrapping_add(b as u64))
}

impl AggregationTable {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Capacity is rounded up to a power of two, never below 16.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_policy(capacity, GrowthPolicy::default())
    }

    pub fn with_policy(capacity: usize, growth: GrowthPolicy) -> Self {
        let cap = capacity.max(INITIAL_CAPACITY).next_power_of_two();
        Self {
            slots: vec![Slot::Empty; cap],
            len: 0,
            insert_ops: 0,
            growth,
        }
    }

    /// Add `delta` to the count for `token`, creating the entry if needed.
    /// A zero delta leaves the table untouched.
    pub fn insert(&mut self, token: impl Into<Token>, delta: u64) {
        if delta == 0 {
            return;
        }
        let token = token.into();
        let idx = self.probe(&token);
        match &mut self.slots[idx] {
            Slot::Occupied(entry) => entry.count = entry.count.saturating_add(delta),
            slot => {
                *slot = Slot::Occupied(AggregationEntry { token, count: delta });
                self.len += 1;
            }
        }
        self.insert_ops += 1;

        if self.growth_measure() >= self.slots.len() / 2 {
            self.resize();
        }
    }

    /// Double the capacity and re-probe every present entry.
    pub fn resize(&mut self) {
        let new_cap = self.slots.len() * 2;
        let old = std::mem::replace(&mut self.slots, vec![Slot::Empty; new_cap]);
        for slot in old {
            if let Slot::Occupied(entry) = slot {
                let idx = self.probe(&entry.token);
                self.slots[idx] = Slot::Occupied(entry);
            }
        }
        tracing::trace!(capacity = new_cap, len = self.len, "aggregation table resized");
    }

    pub fn get(&self, token: impl Into<Token>) -> Option<u64> {
        let token = token.into();
        match &self.slots[self.probe(&token)] {
            Slot::Occupied(entry) => Some(entry.count),
            Slot::Empty => None,
        }
    }

    /// Present entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &AggregationEntry> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied(entry) => Some(entry),
            Slot::Empty => None,
        })
    }

    pub fn into_entries(self) -> impl Iterator<Item = AggregationEntry> {
        self.slots.into_iter().filter_map(|slot| match slot {
            Slot::Occupied(entry) => Some(entry),
            Slot::Empty => None,
        })
    }

    /// Order-free view of the table, for comparing tables built differently.
    pub fn snapshot(&self) -> FxHashMap<Token, u64> {
        self.entries()
            .map(|e| (e.token.clone(), e.count))
            .collect()
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of insert calls that changed the table.
    pub fn insert_ops(&self) -> usize {
        self.insert_ops
    }

    pub fn total_count(&self) -> u64 {
        self.entries().map(|e| e.count).sum()
    }

    fn growth_measure(&self) -> usize {
        match self.growth {
            GrowthPolicy::InsertOps => self.insert_ops,
            GrowthPolicy::Occupancy => self.len,
        }
    }

    /// Index of the slot holding `token`, or of the empty slot where it belongs.
    fn probe(&self, token: &Token) -> usize {
        let cap = self.slots.len();
        let mut idx = (hash(token.as_bytes()) % cap as u64) as usize;
        loop {
            match &self.slots[idx] {
                Slot::Empty => return idx,
                Slot::Occupied(entry) if entry.token == *token => return idx,
                Slot::Occupied(_) => idx = (idx + 1) % cap,
            }
        }
    }
}

impl Default for AggregationTable {
    fn default() -> Self {
        Self::new()
    }
}
