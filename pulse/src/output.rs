use anyhow::Result;
use clap::ValueEnum;
use pulse_core::{FolderId, ProbeResult, Tree};
use report::{ChartModel, FetchMode, ReportRow};
use serde::Serialize;
use std::io::Write;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat { Text, Json, Jsonl }

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

/// Everything a test command produces, as emitted in `json` format.
#[derive(Debug, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<FolderId>,
    pub generated_at: String,
    pub rounds: u32,
    pub timeout_seconds: u64,
    pub results: Vec<ReportRow>,
    pub chart: ChartModel,
}

pub fn write_report(w: &mut dyn Write, report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => write_rows_text(w, &report.results)?,
        OutputFormat::Json => writeln!(w, "{}", serde_json::to_string_pretty(report)?)?,
        OutputFormat::Jsonl => write_jsonl(w, &report.results)?,
    }
    Ok(())
}

pub fn write_jsonl<T: Serialize>(w: &mut dyn Write, items: &[T]) -> Result<()> {
    for item in items {
        writeln!(w, "{}", serde_json::to_string(item)?)?;
    }
    Ok(())
}

fn ms(v: Option<u64>) -> String {
    v.map(|v| format!("{} ms", v)).unwrap_or_else(|| "-".into())
}

fn ssl_note(p: &ProbeResult) -> String {
    let Some(ssl) = &p.ssl else { return String::new() };
    match (ssl.ssl_valid, ssl.ssl_days_left, &ssl.ssl_error) {
        (Some(true), Some(days), _) => format!("  cert ok, {} days left", days),
        (Some(true), None, _) => "  cert ok".into(),
        (Some(false), _, Some(err)) => format!("  cert invalid: {}", err),
        (Some(false), Some(days), None) => format!("  cert expired {} days ago", -days),
        (Some(false), None, None) => "  cert invalid".into(),
        (None, _, err) => format!("  cert unknown{}", err.as_ref().map(|e| format!(": {}", e)).unwrap_or_default()),
    }
}

pub fn write_rows_text(w: &mut dyn Write, rows: &[ReportRow]) -> Result<()> {
    for r in rows {
        let head = format!("#{:<4} {:<24} {}", r.id, r.name, r.url);
        if r.fetch == FetchMode::Skipped {
            writeln!(w, "{}  SKIPPED ({})", head, r.reason.as_deref().unwrap_or("not tested"))?;
            continue;
        }
        let Some(p) = &r.probe else {
            writeln!(w, "{}  no result", head)?;
            continue;
        };
        let verdict = match (p.ok, p.status_code, &p.error) {
            (true, Some(code), _) => format!("OK {}", code),
            (false, Some(code), _) => format!("FAIL {}", code),
            (_, None, Some(err)) => format!("ERROR {}", err),
            _ => "UNKNOWN".into(),
        };
        write!(w, "{}  {}  {} ms", head, verdict, p.elapsed_ms)?;
        if let Some(st) = &r.stats {
            if r.fetch == FetchMode::Parallel {
                write!(w, "  avg {} / min {} / max {}  errors {}", st.avg_ms, st.min_ms, st.max_ms, st.errors)?;
            }
        }
        writeln!(w, "{}", ssl_note(p))?;
    }
    Ok(())
}

pub fn write_chart_summary(w: &mut dyn Write, chart: &ChartModel) -> Result<()> {
    writeln!(
        w,
        "{} measured of {}, avg {}, axis max {} ms",
        chart.count_measured,
        chart.count_total,
        ms(chart.avg_ms),
        chart.max_ms
    )?;
    Ok(())
}

/// Flat CSV record; csv cannot write flattened maps.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: i64,
    name: &'a str,
    url: &'a str,
    active: bool,
    fetch: FetchMode,
    tested: Option<bool>,
    reason: Option<&'a str>,
    ok: Option<bool>,
    status_code: Option<u16>,
    elapsed_ms: Option<u64>,
    error: Option<&'a str>,
    ssl_valid: Option<bool>,
    ssl_expires_at: Option<&'a str>,
    ssl_days_left: Option<i64>,
    ssl_error: Option<&'a str>,
    avg_ms: Option<u64>,
    min_ms: Option<u64>,
    max_ms: Option<u64>,
    errors: Option<u32>,
}

impl<'a> From<&'a ReportRow> for CsvRow<'a> {
    fn from(r: &'a ReportRow) -> Self {
        let p = r.probe.as_ref();
        let ssl = p.and_then(|p| p.ssl.as_ref());
        CsvRow {
            id: r.id,
            name: &r.name,
            url: &r.url,
            active: r.active,
            fetch: r.fetch,
            tested: r.tested,
            reason: r.reason.as_deref(),
            ok: p.map(|p| p.ok),
            status_code: p.and_then(|p| p.status_code),
            elapsed_ms: p.map(|p| p.elapsed_ms),
            error: p.and_then(|p| p.error.as_deref()),
            ssl_valid: ssl.and_then(|s| s.ssl_valid),
            ssl_expires_at: ssl.and_then(|s| s.ssl_expires_at.as_deref()),
            ssl_days_left: ssl.and_then(|s| s.ssl_days_left),
            ssl_error: ssl.and_then(|s| s.ssl_error.as_deref()),
            avg_ms: r.stats.map(|s| s.avg_ms),
            min_ms: r.stats.map(|s| s.min_ms),
            max_ms: r.stats.map(|s| s.max_ms),
            errors: r.stats.map(|s| s.errors),
        }
    }
}

pub fn write_csv<W: Write>(w: W, rows: &[ReportRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(w);
    for r in rows {
        wtr.serialize(CsvRow::from(r))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_tree(w: &mut dyn Write, tree: &Tree, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => writeln!(w, "{}", serde_json::to_string_pretty(tree)?)?,
        OutputFormat::Jsonl => {
            for f in &tree.folders {
                writeln!(w, "{}", serde_json::to_string(f)?)?;
            }
        }
        OutputFormat::Text => {
            if tree.folders.is_empty() {
                writeln!(w, "(no folders)")?;
            }
            for f in &tree.folders {
                writeln!(w, "[{}] {} ({} nodes)", f.id, f.name, f.nodes.len())?;
                for n in &f.nodes {
                    let state = if n.active { "" } else { "  (inactive)" };
                    let comment = if n.comment.is_empty() { String::new() } else { format!("  # {}", n.comment) };
                    writeln!(w, "    #{:<4} {:<24} {}{}{}", n.id, n.name, n.url, state, comment)?;
                }
            }
        }
    }
    Ok(())
}
