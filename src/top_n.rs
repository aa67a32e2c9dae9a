use crate::table::AggregationEntry;
use itertools::Itertools;
use serde::Serialize;
use std::cmp::Ordering;

/// One row of the final ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub token: String,
    pub count: u64,
    #[serde(skip)]
    raw: Vec<u8>,
}

impl RankedEntry {
    pub fn new(token: &[u8], count: u64) -> Self {
        Self {
            token: String::from_utf8_lossy(token).into_owned(),
            count,
            raw: token.to_vec(),
        }
    }

    /// The token exactly as it appeared in the log.
    pub fn raw_token(&self) -> &[u8] {
        &self.raw
    }
}

/// Highest count first; equal counts ordered by token bytes, ascending.
pub fn rank_order(a: &AggregationEntry, b: &AggregationEntry) -> Ordering {
    b.count
        .cmp(&a.count)
        .then_with(|| a.token.as_bytes().cmp(b.token.as_bytes()))
}

/// The `n` most frequent entries, ordered by [`rank_order`].
pub fn select<I>(entries: I, n: usize) -> Vec<RankedEntry>
where
    I: IntoIterator<Item = AggregationEntry>,
{
    if n == 0 {
        return Vec::new();
    }
    entries
        .into_iter()
        .sorted_unstable_by(rank_order)
        .take(n)
        .map(|e| RankedEntry::new(e.token.as_bytes(), e.count))
        .collect()
}
