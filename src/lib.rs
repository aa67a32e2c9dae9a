pub mod config;
pub mod engine;
pub mod error;
pub mod merger;
pub mod partition;
pub mod report;
pub mod scanner;
pub mod source;
pub mod table;
pub mod token;
pub mod top_n;

pub use config::{RunConfig, ScanConfig};
pub use engine::{Engine, PartitionFailure, RunReport};
pub use error::*;
pub use merger::Merger;
pub use partition::{Partition, PartitionPlan};
pub use scanner::{BoundaryPolicy, ChunkScanner};
pub use source::{ByteSource, FileSource, MemorySource};
pub use table::{AggregationEntry, AggregationTable, GrowthPolicy};
pub use token::{Token, TokenExtractor};
pub use top_n::RankedEntry;
