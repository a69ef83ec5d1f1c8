//! Rendering of batch results.

use std::io::{self, Write};

use fanrun_core::{CommandResult, ExitState};

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// One header line per command followed by its indented output.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Counts over a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub killed: usize,
    pub spawn_failed: usize,
    pub aborted: usize,
}

impl Summary {
    pub fn from_results(results: &[CommandResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            if result.success() {
                summary.succeeded += 1;
                continue;
            }
            summary.failed += 1;
            match result.status {
                ExitState::Killed => summary.killed += 1,
                ExitState::SpawnFailed { .. } => summary.spawn_failed += 1,
                ExitState::Aborted => summary.aborted += 1,
                _ => {}
            }
        }
        summary
    }

    pub const fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Write every result in the requested format.
pub fn render<W: Write>(
    out: &mut W,
    results: &[CommandResult],
    format: OutputFormat,
) -> io::Result<()> {
    for result in results {
        match format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, result)?;
                writeln!(out)?;
            }
            OutputFormat::Text => write_text(out, result)?,
        }
    }
    out.flush()
}

fn write_text<W: Write>(out: &mut W, result: &CommandResult) -> io::Result<()> {
    let pid = result
        .pid
        .map_or_else(|| "-".to_string(), |pid| pid.to_string());
    writeln!(
        out,
        "[{pid}] {} ({:.3}s) {}",
        result.status,
        result.elapsed.as_secs_f64(),
        result.command.join(" ")
    )?;
    write_stream(out, "stdout", &result.stdout_lossy(), result.stdout_truncated)?;
    write_stream(out, "stderr", &result.stderr_lossy(), result.stderr_truncated)
}

fn write_stream<W: Write>(
    out: &mut W,
    label: &str,
    text: &str,
    truncated: bool,
) -> io::Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    for line in text.lines() {
        writeln!(out, "    {label}: {line}")?;
    }
    if truncated {
        writeln!(out, "    {label}: [output truncated]")?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use fanrun_core::Engine;

    fn sample_results() -> Vec<CommandResult> {
        let mut engine = Engine::default();
        engine
            .add_command(["sh", "-c", "printf 'a\\nb\\n'; printf warn >&2"])
            .add_command(["/nonexistent/fanrun-cli-test"]);
        engine.run().unwrap()
    }

    #[test]
    fn text_output_indents_streams() {
        let results = sample_results();
        let mut buf = Vec::new();
        render(&mut buf, &results, OutputFormat::Text).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("exit 0"));
        assert!(text.contains("    stdout: a\n    stdout: b\n"));
        assert!(text.contains("    stderr: warn\n"));
        assert!(text.contains("[-] spawn failed"));
    }

    #[test]
    fn json_output_is_one_object_per_line() {
        let results = sample_results();
        let mut buf = Vec::new();
        render(&mut buf, &results, OutputFormat::Json).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let values: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values.iter().any(|v| v["stdout"] == "a\nb\n"));
        assert!(values.iter().any(|v| v["status"]["kind"] == "spawn_failed"));
    }

    #[test]
    fn summary_counts_failures_by_kind() {
        let summary = Summary::from_results(&sample_results());
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.spawn_failed, 1);
        assert!(!summary.all_succeeded());
    }
}
