use crate::TallyError;
use crate::config::RunConfig;
use crate::merger::Merger;
use crate::partition::{Partition, PartitionPlan};
use crate::scanner::ChunkScanner;
use crate::source::ByteSource;
use crate::table::AggregationTable;
use crate::top_n::{self, RankedEntry};
use serde::Serialize;
use std::thread;
use std::time::Instant;

/// A partition that could not be scanned and so contributed nothing.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionFailure {
    pub partition: Partition,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: String,
    pub ranking: Vec<RankedEntry>,
    /// Distinct codes in the final table.
    pub distinct: usize,
    /// Matched lines across all partitions.
    pub total: u64,
    pub partitions: usize,
    pub failures: Vec<PartitionFailure>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

type ScanResults = Vec<(Partition, Result<AggregationTable, TallyError>)>;

/// Runs the scan, merge and select phases over a source.
pub struct Engine {
    config: RunConfig,
}

impl Engine {
    pub fn new(config: RunConfig) -> Result<Self, TallyError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Split the source into `workers` equal partitions and rank its codes.
    pub fn run<S: ByteSource + ?Sized>(&self, source: &S) -> Result<RunReport, TallyError> {
        let total_len = source
            .len()
            .map_err(|reason| TallyError::SourceUnavailable {
                name: source.describe(),
                reason,
            })?;
        let plan = PartitionPlan::even(total_len, self.config.workers);
        self.run_with_plan(source, &plan)
    }

    /// Rank the codes of `source` using a caller-supplied partition plan.
    ///
    /// Every partition is scanned on its own thread. Merging starts only after
    /// all scanners have been joined. A partition that fails is logged and
    /// recorded in the report, or returned as an error in strict mode.
    pub fn run_with_plan<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        plan: &PartitionPlan,
    ) -> Result<RunReport, TallyError> {
        let name = source.describe();
        let total_len = source
            .len()
            .map_err(|reason| TallyError::SourceUnavailable {
                name: name.clone(),
                reason,
            })?;
        if plan.total_len() != total_len {
            return Err(TallyError::InvalidPlan(format!(
                "plan covers {} bytes but {} has {}",
                plan.total_len(),
                name,
                total_len
            )));
        }

        let started = Instant::now();
        tracing::info!(
            source = %name,
            bytes = total_len,
            partitions = plan.len(),
            boundary = ?self.config.scan.boundary,
            "scan started"
        );

        let scanner = ChunkScanner::new(self.config.scan);
        let results = scan_all(source, plan, &scanner)?;

        let merger = Merger::new(AggregationTable::with_policy(0, self.config.scan.growth));
        let mut failures = Vec::new();
        for (partition, result) in results {
            match result {
                Ok(local) => merger.merge(local)?,
                Err(err) if self.config.strict => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        partition = partition.index,
                        start = partition.start,
                        end = partition.end,
                        error = %err,
                        "partition skipped"
                    );
                    failures.push(PartitionFailure {
                        partition,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let final_table = merger.into_inner()?;
        let distinct = final_table.len();
        let total = final_table.total_count();
        let ranking = top_n::select(final_table.into_entries(), self.config.top);

        tracing::info!(
            distinct,
            total,
            failed = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan finished"
        );

        Ok(RunReport {
            source: name,
            ranking,
            distinct,
            total,
            partitions: plan.len(),
            failures,
        })
    }
}

/// Scan every partition on its own thread and wait for all of them.
fn scan_all<S: ByteSource + ?Sized>(
    source: &S,
    plan: &PartitionPlan,
    scanner: &ChunkScanner,
) -> Result<ScanResults, TallyError> {
    thread::scope(|scope| {
        let handles = plan
            .partitions()
            .iter()
            .map(|&partition| {
                thread::Builder::new()
                    .name(format!("errtally-scan-{}", partition.index))
                    .spawn_scoped(scope, move || {
                        let _span =
                            tracing::info_span!("scan", partition = partition.index).entered();
                        scanner.scan_within(source, partition, plan.total_len())
                    })
                    .map(|handle| (partition, handle))
            })
            .collect::<Result<Vec<_>, _>>()?;

        handles
            .into_iter()
            .map(|(partition, handle)| {
                handle
                    .join()
                    .map(|result| (partition, result))
                    .map_err(|_| {
                        TallyError::Worker(format!(
                            "scanner for partition {} panicked",
                            partition.index
                        ))
                    })
            })
            .collect()
    })
}
