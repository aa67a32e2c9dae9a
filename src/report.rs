use crate::TallyError;
use crate::engine::RunReport;
use std::io::Write;

/// One line per ranked code: `Error: <code>, Count: <n>`.
pub fn write_text(report: &RunReport, out: &mut impl Write) -> Result<(), TallyError> {
    for entry in &report.ranking {
        writeln!(out, "Error: {}, Count: {}", entry.token, entry.count)?;
    }
    Ok(())
}

pub fn write_json(report: &RunReport, out: &mut impl Write) -> Result<(), TallyError> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}
