//! Replaying operational state from Source into Target.
//!
//! Every entity yields one [`MigrationRecord`]. Per-entity problems become
//! `skipped_unmatched` or `failed` records; only a store failure (retry
//! budget exhausted, API rejecting a query) aborts the batch.

mod acknowledgements;
mod checks;
mod downtimes;
mod notification_states;

use std::fmt::Write as _;

use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MigrationSettings;
use crate::correlate::{Correlation, Correlator};
use crate::error::Result;
use crate::index::{SourceIndex, TargetIndex};
use crate::normalize::TargetService;
use crate::output::PrettyReport;
use crate::store::{ActionResponse, Query, SourceSnapshot, TargetStore};

pub use checks::DEFAULT_CHECKS_COMMENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Read-only: existence checks run, mutations are only planned.
    Simulate,
    Apply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    HostDowntime,
    ServiceDowntime,
    HostAcknowledgement,
    ServiceAcknowledgement,
    HostNotificationState,
    ServiceNotificationState,
    MigratedDowntime,
    HostActiveChecks,
    ServiceActiveChecks,
    ChecksComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Removed,
    /// What apply mode would do.
    Planned,
    SkippedExisting,
    SkippedUnmatched,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationRecord {
    pub kind: Kind,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl MigrationRecord {
    fn new(kind: Kind, host: &str, service: Option<&str>) -> Self {
        Self {
            kind,
            host: host.to_string(),
            service: service.map(str::to_string),
            outcome: Outcome::Planned,
            detail: None,
        }
    }

    fn with(mut self, outcome: Outcome, detail: Option<String>) -> Self {
        self.outcome = outcome;
        self.detail = detail;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub planned: usize,
    pub skipped_existing: usize,
    pub skipped_unmatched: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub mode: Mode,
    pub summary: MigrationSummary,
    pub records: Vec<MigrationRecord>,
}

impl MigrationReport {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            summary: MigrationSummary::default(),
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: MigrationRecord) {
        let s = &mut self.summary;
        match record.outcome {
            Outcome::Created => s.created += 1,
            Outcome::Updated => s.updated += 1,
            Outcome::Removed => s.removed += 1,
            Outcome::Planned => s.planned += 1,
            Outcome::SkippedExisting => s.skipped_existing += 1,
            Outcome::SkippedUnmatched => s.skipped_unmatched += 1,
            Outcome::Failed => s.failed += 1,
        }
        self.records.push(record);
    }

    /// Append another report's records, e.g. service results after host results.
    pub fn extend(&mut self, other: MigrationReport) {
        for record in other.records {
            self.push(record);
        }
    }

    pub fn count(&self, kind: Kind, outcome: Outcome) -> usize {
        self.records
            .iter()
            .filter(|r| r.kind == kind && r.outcome == outcome)
            .count()
    }
}

impl PrettyReport for MigrationReport {
    fn write_pretty(&self, out: &mut String) -> std::fmt::Result {
        for record in &self.records {
            let outcome = match record.outcome {
                Outcome::Created | Outcome::Updated | Outcome::Removed => {
                    format!("{:?}", record.outcome).green()
                }
                Outcome::Planned => "Planned".cyan(),
                Outcome::SkippedExisting => "SkippedExisting".dimmed(),
                Outcome::SkippedUnmatched => "SkippedUnmatched".yellow(),
                Outcome::Failed => "Failed".red(),
            };
            let target = match &record.service {
                Some(service) => format!("{}!{service}", record.host),
                None => record.host.clone(),
            };
            write!(out, "{outcome:>16} {:?} {target}", record.kind)?;
            if let Some(detail) = &record.detail {
                write!(out, " ({detail})")?;
            }
            writeln!(out)?;
        }
        let s = &self.summary;
        writeln!(
            out,
            "\n{:?}: created {} | updated {} | removed {} | planned {} | existing {} | unmatched {} | failed {}",
            self.mode,
            s.created,
            s.updated,
            s.removed,
            s.planned,
            s.skipped_existing,
            s.skipped_unmatched,
            s.failed
        )
    }
}

/// Everything a migration pass reads, fixed for the whole run.
pub struct Migrator<'a> {
    pub source: &'a SourceSnapshot,
    pub source_index: &'a SourceIndex,
    pub target_index: &'a TargetIndex,
    pub store: &'a dyn TargetStore,
    pub correlator: &'a Correlator,
    pub settings: &'a MigrationSettings,
    pub mode: Mode,
}

impl<'a> Migrator<'a> {
    /// The Target counterpart of a Source service, identified by description.
    fn resolve_service(&self, host: &str, description: &str) -> std::result::Result<&'a TargetService, String> {
        let sources = self.source_index.services(host);
        let Some(source) = sources.iter().find(|s| s.description == description) else {
            return Err(format!("source service '{description}' not found"));
        };
        let correlations = self
            .correlator
            .correlate(sources, self.target_index.services(host));
        match Correlator::resolve(&correlations, source) {
            Some(Correlation::Pair { target, .. }) => Ok(*target),
            Some(Correlation::Ambiguous { candidates, reason, .. }) => {
                let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
                warn!(host, service = description, %reason, candidates = ?names, "ambiguous service");
                Err(format!("ambiguous ({reason}): {}", names.join(", ")))
            }
            _ => Err(format!("no target service for '{}'", source.extracted)),
        }
    }

    /// Shared tail of every create: existence check, then plan or apply.
    fn replay(
        &self,
        record: MigrationRecord,
        existing: &Query,
        apply: impl FnOnce() -> Result<ActionResponse>,
        created: Outcome,
    ) -> Result<MigrationRecord> {
        if !self.store.query(existing)?.is_empty() {
            info!(kind = ?record.kind, host = %record.host, service = ?record.service, "already present, skipping");
            return Ok(record.with(Outcome::SkippedExisting, None));
        }
        self.execute(record, apply, created)
    }

    fn execute(
        &self,
        record: MigrationRecord,
        apply: impl FnOnce() -> Result<ActionResponse>,
        done: Outcome,
    ) -> Result<MigrationRecord> {
        if self.mode == Mode::Simulate {
            info!(kind = ?record.kind, host = %record.host, service = ?record.service, "would migrate");
            return Ok(record.with(Outcome::Planned, None));
        }
        let response = apply()?;
        if response.is_success() {
            info!(kind = ?record.kind, host = %record.host, service = ?record.service, "migrated");
            Ok(record.with(done, None))
        } else {
            let detail = response.describe();
            warn!(kind = ?record.kind, host = %record.host, service = ?record.service, response = %detail, "migration failed");
            Ok(record.with(Outcome::Failed, Some(detail)))
        }
    }

    fn unmatched(&self, record: MigrationRecord, reason: String) -> MigrationRecord {
        warn!(kind = ?record.kind, host = %record.host, service = ?record.service, %reason, "skipping");
        record.with(Outcome::SkippedUnmatched, Some(reason))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    use crate::model::{SourceRecord, TargetRecord, kinds};
    use crate::normalize::Normalizer;
    use crate::store::{MemoryTarget, ObjectType, Query, SourceSnapshot, TargetStore};

    use super::*;

    pub struct World {
        pub source: SourceSnapshot,
        pub source_index: SourceIndex,
        pub target_index: TargetIndex,
        pub store: MemoryTarget,
        pub correlator: Correlator,
        pub settings: MigrationSettings,
    }

    impl World {
        pub fn new(records: Vec<SourceRecord>, target: Vec<TargetRecord>) -> Self {
            let normalizer = Normalizer::default();
            let source = SourceSnapshot::from_records("test", records).unwrap();
            let source_index = SourceIndex::build(&source, &normalizer);
            let store = MemoryTarget::new(target);
            let hosts = store.query(&Query::new(ObjectType::Host)).unwrap();
            let services = store.query(&Query::new(ObjectType::Service)).unwrap();
            let target_index = TargetIndex::build(&hosts, &services, &normalizer);
            Self {
                source,
                source_index,
                target_index,
                store,
                correlator: Correlator::new("nrpe-health"),
                settings: MigrationSettings::default(),
            }
        }

        pub fn migrator(&self, mode: Mode) -> Migrator<'_> {
            Migrator {
                source: &self.source,
                source_index: &self.source_index,
                target_index: &self.target_index,
                store: &self.store,
                correlator: &self.correlator,
                settings: &self.settings,
                mode,
            }
        }
    }

    pub fn web1_source() -> Vec<SourceRecord> {
        vec![
            SourceRecord::new(kinds::HOST)
                .with("host_name", "web1")
                .with("notifications_enabled", "1"),
            SourceRecord::new(kinds::SERVICE)
                .with("host_name", "web1")
                .with("service_description", "PING")
                .with("check_command", "check_ping_4!100.0,20%")
                .with("notifications_enabled", "1"),
        ]
    }

    pub fn web1_target() -> Vec<TargetRecord> {
        vec![
            TargetRecord::new(
                "Host",
                "web1",
                json!({"enable_notifications": true, "enable_active_checks": true}),
            ),
            TargetRecord::new(
                "Service",
                "web1!ping",
                json!({"check_command": "ping", "enable_notifications": true}),
            ),
            TargetRecord::new(
                "Service",
                "web1!nrpe-health",
                json!({"check_command": "nrpe", "enable_notifications": true}),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_follow_outcomes() {
        let mut report = MigrationReport::new(Mode::Apply);
        report.push(MigrationRecord::new(Kind::HostDowntime, "web1", None).with(Outcome::Created, None));
        report.push(
            MigrationRecord::new(Kind::ServiceDowntime, "web1", Some("ping"))
                .with(Outcome::SkippedUnmatched, Some("x".into())),
        );
        let mut more = MigrationReport::new(Mode::Apply);
        more.push(MigrationRecord::new(Kind::HostDowntime, "web2", None).with(Outcome::Failed, None));
        report.extend(more);

        assert_eq!(report.summary.created, 1);
        assert_eq!(report.summary.skipped_unmatched, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.count(Kind::HostDowntime, Outcome::Failed), 1);
        assert_eq!(report.records.len(), 3);
    }

    #[test]
    fn pretty_report_lists_every_record() {
        let mut report = MigrationReport::new(Mode::Simulate);
        report.push(MigrationRecord::new(Kind::HostAcknowledgement, "db1", None));
        let mut out = String::new();
        report.write_pretty(&mut out).unwrap();
        assert!(out.contains("db1"));
        assert!(out.contains("planned 1"));
    }
}
