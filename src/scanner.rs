use crate::TallyError;
use crate::config::ScanConfig;
use crate::partition::Partition;
use crate::source::ByteSource;
use crate::table::AggregationTable;
use crate::token::TokenExtractor;
use memchr::memchr;
use serde::Serialize;
use std::io::{self, Read};

/// How a scanner treats lines that cross its partition edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryPolicy {
    /// A line belongs to the partition holding its first byte. Scanners skip a
    /// leading fragment and read past their end to finish their last line, so
    /// any partitioning counts the same as a single scan.
    #[default]
    Reassemble,
    /// Never read outside `[start, end)`. A leading fragment is scanned as a
    /// line of its own and a trailing unterminated fragment is dropped, so a
    /// code on a line that straddles an edge may be lost or cut short.
    Discard,
}

/// Rebuilds lines from a stream of chunks.
///
/// Lines reaching `cap` bytes without a newline are emitted as they are, and
/// the next byte starts a fresh fragment.
struct LineAssembler {
    line: Vec<u8>,
    cap: usize,
}

impl LineAssembler {
    fn new(cap: usize) -> Self {
        Self {
            line: Vec::with_capacity(cap),
            cap,
        }
    }

    fn feed(&mut self, mut chunk: &[u8], on_line: &mut impl FnMut(&[u8])) {
        while !chunk.is_empty() {
            let room = self.cap - self.line.len();
            if room == 0 {
                on_line(&self.line);
                self.line.clear();
                if chunk[0] == b'\n' {
                    chunk = &chunk[1..];
                }
                continue;
            }
            let window = &chunk[..chunk.len().min(room)];
            match memchr(b'\n', window) {
                Some(nl) if self.line.is_empty() => {
                    on_line(&window[..nl]);
                    chunk = &chunk[nl + 1..];
                }
                Some(nl) => {
                    self.line.extend_from_slice(&window[..nl]);
                    on_line(&self.line);
                    self.line.clear();
                    chunk = &chunk[nl + 1..];
                }
                None => {
                    self.line.extend_from_slice(window);
                    chunk = &chunk[window.len()..];
                }
            }
        }
    }

    fn has_pending(&self) -> bool {
        !self.line.is_empty()
    }

    /// Emit whatever is buffered as a final line.
    fn finish(&mut self, on_line: &mut impl FnMut(&[u8])) {
        if self.has_pending() {
            on_line(&self.line);
            self.line.clear();
        }
    }

    fn discard(&mut self) -> usize {
        let dropped = self.line.len();
        self.line.clear();
        dropped
    }
}

/// Counts error codes in one partition of a source into a private table.
pub struct ChunkScanner {
    config: ScanConfig,
    extractor: TokenExtractor,
}

impl ChunkScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            extractor: TokenExtractor::new(),
        }
    }

    pub fn scan<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        partition: Partition,
    ) -> Result<AggregationTable, TallyError> {
        let total_len = source.len().map_err(|reason| TallyError::Partition {
            index: partition.index,
            reason,
        })?;
        self.scan_within(source, partition, total_len)
    }

    /// Scan `partition` as if the source ended at `total_len`.
    ///
    /// Bytes at or past `total_len` are never read, so a log that grows while
    /// a run is in progress is counted as it was when the plan was made.
    pub fn scan_within<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        partition: Partition,
        total_len: u64,
    ) -> Result<AggregationTable, TallyError> {
        let fail = |reason: io::Error| TallyError::Partition {
            index: partition.index,
            reason,
        };
        let start = partition.start.min(total_len);
        let end = partition.end.min(total_len);

        let mut table = AggregationTable::with_policy(0, self.config.growth);
        if start >= end {
            return Ok(table);
        }

        let mut lines = 0usize;
        let mut record = |line: &[u8]| {
            lines += 1;
            if let Some(token) = self.extractor.extract(line) {
                table.insert(token, 1);
            }
        };

        let reassemble = self.config.boundary == BoundaryPolicy::Reassemble;
        let (mut reader, mut skipping) = if reassemble && start > 0 {
            let mut reader = source.open_at(start - 1).map_err(fail)?;
            let mut prev = [0u8; 1];
            reader.read_exact(&mut prev).map_err(fail)?;
            (reader, prev[0] != b'\n')
        } else {
            (source.open_at(start).map_err(fail)?, false)
        };

        let mut assembler = LineAssembler::new(self.config.max_line_len);
        let mut buf = vec![0u8; self.config.buffer_size];
        let mut pos = start;
        let mut hit_eof = false;

        while pos < end {
            let want = (end - pos).min(buf.len() as u64) as usize;
            let n = read_some(&mut reader, &mut buf[..want]).map_err(fail)?;
            if n == 0 {
                hit_eof = true;
                break;
            }
            pos += n as u64;
            let mut chunk = &buf[..n];
            if skipping {
                match memchr(b'\n', chunk) {
                    Some(nl) => {
                        chunk = &chunk[nl + 1..];
                        skipping = false;
                    }
                    None => continue,
                }
            }
            assembler.feed(chunk, &mut record);
        }

        if hit_eof || end == total_len {
            assembler.finish(&mut record);
        } else if reassemble {
            if !skipping && assembler.has_pending() {
                // Finish the line we own from the next partition's bytes.
                loop {
                    let want = (total_len - pos).min(buf.len() as u64) as usize;
                    let n = read_some(&mut reader, &mut buf[..want]).map_err(fail)?;
                    if n == 0 {
                        assembler.finish(&mut record);
                        break;
                    }
                    pos += n as u64;
                    if let Some(nl) = memchr(b'\n', &buf[..n]) {
                        assembler.feed(&buf[..=nl], &mut record);
                        break;
                    }
                    assembler.feed(&buf[..n], &mut record);
                }
            }
        } else {
            let dropped = assembler.discard();
            if dropped > 0 {
                tracing::trace!(
                    partition = partition.index,
                    dropped,
                    "discarded trailing fragment"
                );
            }
        }

        tracing::debug!(
            partition = partition.index,
            start,
            end,
            bytes_read = pos - start,
            lines,
            distinct = table.len(),
            "partition scanned"
        );
        Ok(table)
    }
}

fn read_some(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use rustc_hash::FxHashMap;

    const SAMPLE: &str = "foo Error: E1\"\nbar\nbaz Error: E2\"\nqux Error: E1\"\n";

    fn counts(table: &AggregationTable) -> Vec<(String, u64)> {
        let mut out: Vec<_> = table
            .entries()
            .map(|e| (e.token.to_string_lossy(), e.count))
            .collect();
        out.sort();
        out
    }

    fn whole(source: &MemorySource) -> Partition {
        Partition {
            index: 0,
            start: 0,
            end: source.as_bytes().len() as u64,
        }
    }

    fn scan_split(
        source: &MemorySource,
        cuts: &[u64],
        config: ScanConfig,
    ) -> FxHashMap<crate::Token, u64> {
        let len = source.as_bytes().len() as u64;
        let mut bounds = vec![0];
        bounds.extend_from_slice(cuts);
        bounds.push(len);
        let scanner = ChunkScanner::new(config);
        let mut combined = AggregationTable::new();
        for (index, pair) in bounds.windows(2).enumerate() {
            let part = Partition {
                index,
                start: pair[0],
                end: pair[1],
            };
            for entry in scanner.scan(source, part).unwrap().into_entries() {
                combined.insert(entry.token, entry.count);
            }
        }
        combined.snapshot()
    }

    #[test]
    fn test_single_partition_counts_codes() {
        let source = MemorySource::from(SAMPLE);
        let table = ChunkScanner::new(ScanConfig::default())
            .scan(&source, whole(&source))
            .unwrap();
        assert_eq!(
            counts(&table),
            vec![("E1".to_string(), 2), ("E2".to_string(), 1)]
        );
    }

    #[test]
    fn test_unterminated_last_line_is_counted() {
        let source = MemorySource::from("a Error: E1\"\nb Error: E7");
        let table = ChunkScanner::new(ScanConfig::default())
            .scan(&source, whole(&source))
            .unwrap();
        assert_eq!(table.get("E7"), Some(1));
        assert_eq!(table.get("E1"), Some(1));
    }

    #[test]
    fn test_tiny_buffers_match_default() {
        let source = MemorySource::from(SAMPLE);
        let expected = ChunkScanner::new(ScanConfig::default())
            .scan(&source, whole(&source))
            .unwrap()
            .snapshot();
        for buffer_size in 1..8 {
            let config = ScanConfig {
                buffer_size,
                ..ScanConfig::default()
            };
            let got = ChunkScanner::new(config)
                .scan(&source, whole(&source))
                .unwrap()
                .snapshot();
            assert_eq!(got, expected, "buffer_size {}", buffer_size);
        }
    }

    #[test]
    fn test_overlong_line_is_cut_into_fragments() {
        // 16 filler bytes fill the line buffer; the marker starts the next fragment.
        let source = MemorySource::from("0123456789abcdefError: E1\"\n");
        let config = ScanConfig {
            max_line_len: 16,
            ..ScanConfig::default()
        };
        let table = ChunkScanner::new(config)
            .scan(&source, whole(&source))
            .unwrap();
        assert_eq!(counts(&table), vec![("E1".to_string(), 1)]);
    }

    #[test]
    fn test_fragment_cut_through_marker_loses_code() {
        let source = MemorySource::from("0123456789Error: E1\"\n");
        let config = ScanConfig {
            max_line_len: 12,
            ..ScanConfig::default()
        };
        let table = ChunkScanner::new(config)
            .scan(&source, whole(&source))
            .unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_line_exactly_at_cap_then_newline() {
        let source = MemorySource::from("Error: ABCDE\nError: F\n");
        let config = ScanConfig {
            max_line_len: 12,
            buffer_size: 5,
            ..ScanConfig::default()
        };
        let table = ChunkScanner::new(config)
            .scan(&source, whole(&source))
            .unwrap();
        assert_eq!(
            counts(&table),
            vec![("ABCDE".to_string(), 1), ("F".to_string(), 1)]
        );
        assert_eq!(table.get(""), None);
    }

    #[test]
    fn test_reassemble_any_split_matches_single_scan() {
        let text =
            "x Error: E1\"\ny Error: LONGER-CODE\"\n\nz Error: E1\nno marker here\nError: E3\"";
        let source = MemorySource::from(text);
        let len = text.len() as u64;
        let expected = scan_split(&source, &[], ScanConfig::default());
        assert_eq!(expected.values().sum::<u64>(), 4);

        for buffer_size in [1, 3, 8192] {
            let config = ScanConfig {
                buffer_size,
                ..ScanConfig::default()
            };
            for cut in 0..=len {
                assert_eq!(
                    scan_split(&source, &[cut], config),
                    expected,
                    "cut at {} with buffer {}",
                    cut,
                    buffer_size
                );
            }
            for a in (0..=len).step_by(5) {
                for b in (a..=len).step_by(7) {
                    assert_eq!(scan_split(&source, &[a, b], config), expected);
                }
            }
        }
    }

    #[test]
    fn test_reassemble_with_fragmenting_cap() {
        let text = "0123456789Error: E1\"\nError: E2\"\n0123456789abcdefError: E3\"\n";
        let source = MemorySource::from(text);
        let config = ScanConfig {
            max_line_len: 10,
            buffer_size: 4,
            ..ScanConfig::default()
        };
        let expected = scan_split(&source, &[], config);
        for cut in 0..=text.len() as u64 {
            assert_eq!(scan_split(&source, &[cut], config), expected, "cut at {}", cut);
        }
    }

    #[test]
    fn test_discard_loses_code_on_straddling_line() {
        let text = "aaa Error: E1\"\nbbb Error: E2\"\n";
        let source = MemorySource::from(text);
        // Cut inside the second marker: "bbb Err" | "or: E2\"\n".
        let cut = text.find("or: E2").unwrap() as u64;
        let discard = ScanConfig {
            boundary: BoundaryPolicy::Discard,
            ..ScanConfig::default()
        };
        let got = scan_split(&source, &[cut], discard);
        assert_eq!(got.get(&crate::Token::from("E1")), Some(&1));
        assert_eq!(got.get(&crate::Token::from("E2")), None);

        let fixed = scan_split(&source, &[cut], ScanConfig::default());
        assert_eq!(fixed.get(&crate::Token::from("E2")), Some(&1));
    }

    #[test]
    fn test_discard_scans_leading_fragment_as_a_line() {
        let text = "zz Error: E1\"\n";
        let source = MemorySource::from(text);
        let discard = ScanConfig {
            boundary: BoundaryPolicy::Discard,
            ..ScanConfig::default()
        };
        // "zz " | "Error: E1\"\n": first fragment dropped, second still has the marker.
        let got = scan_split(&source, &[3], discard);
        assert_eq!(got.get(&crate::Token::from("E1")), Some(&1));
    }

    #[test]
    fn test_reassemble_skips_partition_inside_a_line() {
        let text = "Error: E1 with a long tail of text\n";
        let source = MemorySource::from(text);
        let scanner = ChunkScanner::new(ScanConfig::default());
        let middle = Partition {
            index: 1,
            start: 10,
            end: 20,
        };
        assert!(scanner.scan(&source, middle).unwrap().is_empty());
        let head = Partition {
            index: 0,
            start: 0,
            end: 10,
        };
        assert_eq!(
            scanner.scan(&source, head).unwrap().get("E1 with a long tail of text"),
            Some(1)
        );
    }

    #[test]
    fn test_empty_and_out_of_range_partitions() {
        let source = MemorySource::from(SAMPLE);
        let scanner = ChunkScanner::new(ScanConfig::default());
        let empty = Partition {
            index: 0,
            start: 5,
            end: 5,
        };
        assert!(scanner.scan(&source, empty).unwrap().is_empty());
        let beyond = Partition {
            index: 1,
            start: 0,
            end: 10_000,
        };
        assert_eq!(scanner.scan(&source, beyond).unwrap().get("E1"), Some(2));
    }

    #[test]
    fn test_scan_within_ignores_bytes_appended_after_planning() {
        let planned = "Error: A\"\nError: B";
        let source = MemorySource::from(format!("{}C\"\nError: D\"\n", planned));
        let total_len = planned.len() as u64;
        for boundary in [BoundaryPolicy::Reassemble, BoundaryPolicy::Discard] {
            let scanner = ChunkScanner::new(ScanConfig {
                boundary,
                ..ScanConfig::default()
            });
            let last = Partition {
                index: 0,
                start: 0,
                end: total_len,
            };
            let got = counts(&scanner.scan_within(&source, last, total_len).unwrap());
            assert_eq!(got, vec![("A".to_string(), 1), ("B".to_string(), 1)], "{:?}", boundary);
        }

        // The overrun that finishes a straddling line also stops at the planned end.
        let scanner = ChunkScanner::new(ScanConfig::default());
        let head = Partition {
            index: 0,
            start: 0,
            end: 12,
        };
        let table = scanner.scan_within(&source, head, total_len).unwrap();
        assert_eq!(table.get("B"), Some(1));
        assert_eq!(table.get("BC"), None);
    }
}
