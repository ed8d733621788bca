use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use uuid::Uuid;

use crate::build_info;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Yaml,
}

/// Human-readable rendering of a report body.
pub trait PrettyReport {
    fn write_pretty(&self, out: &mut String) -> std::fmt::Result;
}

/// Header wrapped around every report.
#[derive(Debug, Serialize)]
pub struct Envelope<'a, T: Serialize> {
    pub command: &'a str,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_sha: Option<&'static str>,
    pub report: &'a T,
}

impl<'a, T: Serialize> Envelope<'a, T> {
    pub fn new(command: &'a str, report: &'a T) -> Self {
        Self {
            command,
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_sha: build_info::git_sha(),
            report,
        }
    }
}

pub fn render<T: Serialize + PrettyReport>(
    envelope: &Envelope<'_, T>,
    format: Format,
) -> Result<String> {
    Ok(match format {
        Format::Json => format!("{}\n", serde_json::to_string_pretty(envelope)?),
        Format::Yaml => serde_yaml::to_string(envelope)?,
        Format::Pretty => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "{} {} ({}, run {})",
                "monmig".bold(),
                envelope.command,
                envelope.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
                envelope.run_id
            );
            let _ = envelope.report.write_pretty(&mut out);
            out
        }
    })
}

/// Render a report and write it to stdout or, when given, a file.
pub fn emit<T: Serialize + PrettyReport>(
    command: &str,
    report: &T,
    format: Format,
    output: Option<&Path>,
) -> Result<()> {
    let envelope = Envelope::new(command, report);
    match output {
        Some(path) => {
            colored::control::set_override(false);
            let rendered = render(&envelope, format)?;
            colored::control::unset_override();
            std::fs::write(path, rendered)?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => print!("{}", render(&envelope, format)?),
    }
    Ok(())
}

/// `YYYY-MM-DD HH:MM:SS` in UTC, or the raw number when out of range.
pub fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Fill a `{host}` link template.
pub fn link(template: Option<&str>, host: &str) -> Option<String> {
    template.map(|t| t.replace("{host}", host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Dummy {
        count: usize,
    }

    impl PrettyReport for Dummy {
        fn write_pretty(&self, out: &mut String) -> std::fmt::Result {
            writeln!(out, "count: {}", self.count)
        }
    }

    #[test]
    fn json_envelope_carries_run_metadata() {
        let report = Dummy { count: 3 };
        let rendered = render(&Envelope::new("compare-hosts", &report), Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["command"], "compare-hosts");
        assert_eq!(value["report"]["count"], 3);
        assert!(value["run_id"].as_str().is_some());
        assert!(value["generated_at"].as_str().is_some());
    }

    #[test]
    fn yaml_and_pretty_render() {
        let report = Dummy { count: 1 };
        let envelope = Envelope::new("x", &report);
        assert!(render(&envelope, Format::Yaml).unwrap().contains("count: 1"));
        assert!(render(&envelope, Format::Pretty).unwrap().contains("count: 1"));
    }

    #[test]
    fn timestamps_render_in_utc() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(1476092609), "2016-10-10 09:43:29");
    }

    #[test]
    fn emit_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        emit("x", &Dummy { count: 2 }, Format::Json, Some(&path)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"count\": 2"));
    }
}
