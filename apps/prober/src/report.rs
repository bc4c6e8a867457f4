use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::Context;
use reachability::{CheckKind, CumulativeEndpointResult, Latency, ResultTable, RunSummary, Warning};

/// Prior table from disk; a missing file is an empty table
pub fn load_table(path: &Path) -> anyhow::Result<ResultTable> {
    if !path.exists() {
        return Ok(ResultTable::new());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("reading results {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing results {}", path.display()))
}

pub fn write_table(table: &ResultTable, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(table)?;
    fs::write(path, json).with_context(|| format!("writing results {}", path.display()))
}

fn cell(latency: Latency) -> String {
    match latency {
        Latency::NotAttempted => "-".into(),
        Latency::Failed => "x".into(),
        Latency::Millis(ms) => format!("{ms}ms"),
    }
}

fn row(out: &mut String, entry: &CumulativeEndpointResult, kinds: &[CheckKind]) {
    let mark = if entry.primary.is_available() {
        "up"
    } else if entry.working_fallback().is_some() {
        "alt"
    } else {
        "down"
    };
    let _ = write!(out, "{mark:<5} {:<40}", entry.key);
    for kind in kinds {
        let _ = write!(out, " {:>12}", cell(entry.primary.latency(*kind)));
    }
    if let Some(fallback) = entry.working_fallback() {
        let kinds: Vec<&str> = fallback.successful_kinds().map(|kind| kind.as_str()).collect();
        let _ = write!(out, "  via {} ({})", fallback.target(), kinds.join(", "));
    } else if let Some(error) = entry.primary.error() {
        let _ = write!(out, "  {error}");
    }
    out.push('\n');
}

/// Plain text rendering of a finished run
pub fn render(summary: &RunSummary) -> String {
    let kinds = CheckKind::ALL;
    let mut out = String::new();

    let _ = write!(out, "{:<5} {:<40}", "", "endpoint");
    for kind in &kinds {
        let _ = write!(out, " {:>12}", kind.as_str());
    }
    out.push('\n');

    for entry in summary.table.iter() {
        row(&mut out, entry, &kinds);
    }

    for (key, results) in &summary.interference {
        for result in results.iter().filter(|r| r.warning != Warning::None) {
            let _ = writeln!(out, "! {key}: {} {} ({})", result.kind, result.warning, result.detail);
        }
    }

    let _ = writeln!(
        out,
        "\nrun {} {}: {} checked, {} available, {} unavailable, {} skipped",
        summary.run_id, summary.status, summary.checked, summary.available, summary.unavailable, summary.skipped
    );
    if summary.failed_tasks > 0 {
        let _ = writeln!(out, "{} probe task(s) died without a result", summary.failed_tasks);
    }
    out
}
