// ABOUTME: Parsers that turn process listing text into structured process rows
// ABOUTME: Isolated behind a trait so the listing command can change without touching callers

use crate::types::ProcessInfo;

/// Number of columns in `ps aux` output; COMMAND is the last and may contain spaces
const PS_AUX_COLUMNS: usize = 11;

/// Turns the raw text of a process listing into rows
pub trait ProcessTableParser: Send + Sync {
    /// Command to run inside the sandbox to produce the listing
    fn command(&self) -> &str;

    fn parse(&self, output: &str) -> Vec<ProcessInfo>;
}

/// Parser for procps/busybox `ps aux` output
///
/// Skips exactly one header line. Rows with fewer than eleven columns or an
/// unparseable PID are dropped; unparseable CPU/MEM values read as zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct PsAuxParser;

impl ProcessTableParser for PsAuxParser {
    fn command(&self) -> &str {
        "ps aux"
    }

    fn parse(&self, output: &str) -> Vec<ProcessInfo> {
        output
            .lines()
            .skip(1)
            .filter_map(parse_ps_aux_line)
            .collect()
    }
}

fn parse_ps_aux_line(line: &str) -> Option<ProcessInfo> {
    let mut columns = Vec::with_capacity(PS_AUX_COLUMNS);
    let mut rest = line.trim_start();

    while columns.len() < PS_AUX_COLUMNS - 1 {
        let end = rest.find(char::is_whitespace)?;
        columns.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }

    let command = rest.trim_end();
    if command.is_empty() {
        return None;
    }

    Some(ProcessInfo {
        pid: columns[1].parse().ok()?,
        user: columns[0].to_string(),
        cpu_percent: columns[2].parse().unwrap_or(0.0),
        mem_percent: columns[3].parse().unwrap_or(0.0),
        command: command.to_string(),
    })
}
