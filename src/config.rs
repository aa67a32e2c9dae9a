use crate::TallyError;
use crate::scanner::BoundaryPolicy;
use crate::table::GrowthPolicy;
use serde::Serialize;

/// Worker count used when the platform cannot report its parallelism.
pub const FALLBACK_WORKERS: usize = 4;
pub const DEFAULT_BUFFER_SIZE: usize = 8192;
pub const DEFAULT_MAX_LINE_LEN: usize = 1023;
pub const DEFAULT_TOP: usize = 10;

/// Settings for a single partition scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanConfig {
    /// Bytes requested per read.
    pub buffer_size: usize,
    /// Lines longer than this are cut into fragments of this size.
    pub max_line_len: usize,
    pub boundary: BoundaryPolicy,
    pub growth: GrowthPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            boundary: BoundaryPolicy::default(),
            growth: GrowthPolicy::default(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), TallyError> {
        if self.buffer_size == 0 {
            return Err(TallyError::Config("buffer size must be at least 1".to_string()));
        }
        if self.max_line_len == 0 {
            return Err(TallyError::Config(
                "max line length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    /// Degree of parallelism; also the number of partitions.
    pub workers: usize,
    /// How many ranked entries to return.
    pub top: usize,
    /// Escalate a failed partition to a fatal error instead of skipping it.
    pub strict: bool,
    pub scan: ScanConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            top: DEFAULT_TOP,
            strict: false,
            scan: ScanConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), TallyError> {
        if self.workers == 0 {
            return Err(TallyError::Config("workers must be at least 1".to_string()));
        }
        self.scan.validate()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_scan(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }
}

/// Hardware parallelism, or `FALLBACK_WORKERS` when unknown.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_WORKERS)
}

/// Map an operator-supplied N onto a count; anything non-positive means none.
pub fn clamp_top(requested: i64) -> usize {
    usize::try_from(requested).unwrap_or(0)
}
