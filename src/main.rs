use clap::Parser;
use errtally::config::{self, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_LINE_LEN};
use errtally::{
    BoundaryPolicy, Engine, FileSource, GrowthPolicy, RunConfig, ScanConfig, TallyError, report,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Rank the most frequent error codes in a log file.
#[derive(Parser, Debug)]
#[command(name = "errtally", version)]
struct Cli {
    /// Log file to scan.
    path: PathBuf,

    /// Number of codes to show; prompted for when omitted. Values <= 0 show nothing.
    #[arg(short = 'n', long, env = "ERRTALLY_TOP", allow_negative_numbers = true)]
    top: Option<i64>,

    /// Parallel scanners (and partitions). Defaults to available cores.
    #[arg(short, long, env = "ERRTALLY_WORKERS")]
    workers: Option<usize>,

    /// How lines crossing a partition edge are handled.
    #[arg(long, value_enum, default_value_t = BoundaryPolicy::Reassemble)]
    boundary: BoundaryPolicy,

    /// What the table counts toward its resize threshold. Use occupancy for large logs.
    #[arg(long, value_enum, default_value_t = GrowthPolicy::InsertOps)]
    growth: GrowthPolicy,

    /// Bytes read per chunk.
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Longest line kept whole; longer lines are split into fragments.
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LEN)]
    max_line_len: usize,

    /// Fail the run if any partition cannot be read.
    #[arg(long)]
    strict: bool,

    /// Print the full report as JSON.
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn prompt_top() -> Result<i64, TallyError> {
    print!("Enter number of top errors to display: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    input
        .trim()
        .parse()
        .map_err(|e| TallyError::Config(format!("invalid number {:?}: {}", input.trim(), e)))
}

fn run(cli: Cli) -> Result<ExitCode, TallyError> {
    // Fail before partitioning if the file is not readable at all.
    let source = FileSource::open(&cli.path)?;

    let top = match cli.top {
        Some(n) => n,
        None => prompt_top()?,
    };

    let run_config = RunConfig {
        workers: cli.workers.unwrap_or_else(config::default_workers),
        top: config::clamp_top(top),
        strict: cli.strict,
        scan: ScanConfig {
            buffer_size: cli.buffer_size,
            max_line_len: cli.max_line_len,
            boundary: cli.boundary,
            growth: cli.growth,
        },
    };
    let outcome = Engine::new(run_config)?.run(&source)?;

    let mut out = io::stdout().lock();
    if cli.json {
        report::write_json(&outcome, &mut out)?;
    } else {
        report::write_text(&outcome, &mut out)?;
    }
    out.flush()?;

    if !outcome.is_complete() {
        eprintln!(
            "[errtally] warning: {} of {} partitions could not be read; counts are partial",
            outcome.failures.len(),
            outcome.partitions
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[errtally] {}", err);
            ExitCode::FAILURE
        }
    }
}
