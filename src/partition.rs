use crate::TallyError;
use serde::Serialize;

/// Half-open byte range `[start, end)` scanned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Partition {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Ordered partitions tiling `[0, total_len)` with no gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    partitions: Vec<Partition>,
    total_len: u64,
}

impl PartitionPlan {
    /// Split into `parts` equal pieces; the last one absorbs the remainder.
    ///
    /// `parts` is clamped to `1..=total_len` so that no piece is empty, except
    /// for an empty source which gets a single empty partition.
    pub fn even(total_len: u64, parts: usize) -> Self {
        let parts = (parts.max(1) as u64).min(total_len.max(1));
        let chunk = total_len / parts;
        let partitions = (0..parts)
            .map(|i| Partition {
                index: i as usize,
                start: i * chunk,
                end: if i == parts - 1 { total_len } else { (i + 1) * chunk },
            })
            .collect();
        Self {
            partitions,
            total_len,
        }
    }

    /// Validate a caller-supplied list of `(start, end)` ranges.
    pub fn from_ranges(ranges: &[(u64, u64)], total_len: u64) -> Result<Self, TallyError> {
        if ranges.is_empty() {
            return Err(TallyError::InvalidPlan("no partitions".to_string()));
        }
        let mut expected_start = 0;
        let mut partitions = Vec::with_capacity(ranges.len());
        for (index, &(start, end)) in ranges.iter().enumerate() {
            if start != expected_start {
                return Err(TallyError::InvalidPlan(format!(
                    "partition {} starts at {}, expected {}",
                    index, start, expected_start
                )));
            }
            if end < start {
                return Err(TallyError::InvalidPlan(format!(
                    "partition {} ends at {} before its start {}",
                    index, end, start
                )));
            }
            partitions.push(Partition { index, start, end });
            expected_start = end;
        }
        if expected_start != total_len {
            return Err(TallyError::InvalidPlan(format!(
                "partitions cover {} bytes, source has {}",
                expected_start, total_len
            )));
        }
        Ok(Self {
            partitions,
            total_len,
        })
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }
}
