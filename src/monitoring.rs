use anyhow::Result;
use chrono::{DateTime, Local};
use std::{fs::OpenOptions, io::Write, path::Path};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::scanner::CycleReport;

/// `RUST_LOG` filter (default `info`); `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_current_span(false)).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

pub fn append_line(path: impl AsRef<Path>, line: &str) -> Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{line}")?;
    Ok(())
}

pub fn heartbeat_line(cycle: u64, report: &CycleReport) -> String {
    let now: DateTime<Local> = Local::now();
    format!(
        "{} heartbeat cycle={} fetched={} new={} passed={} rejected={} dispatched={} dropped={} ok={}",
        now.to_rfc3339(),
        cycle,
        report.fetched,
        report.new,
        report.passed,
        report.rejected,
        report.dispatched,
        report.dropped,
        report.fetch_ok,
    )
}
