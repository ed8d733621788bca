use tracing::{debug, info};

use super::{Kind, MigrationRecord, MigrationReport, Migrator, Mode, Outcome};
use crate::error::Result;
use crate::model::{Scope, SourceDowntime};
use crate::store::{DowntimeRequest, Filter, ObjectType, Query};

impl Migrator<'_> {
    /// Replay Source host downtimes onto Target hosts.
    pub fn migrate_host_downtimes(&self, host: Option<&str>) -> Result<MigrationReport> {
        self.migrate_downtimes(Scope::Host, host)
    }

    /// Replay Source service downtimes onto the correlated Target services.
    pub fn migrate_service_downtimes(&self, host: Option<&str>) -> Result<MigrationReport> {
        self.migrate_downtimes(Scope::Service, host)
    }

    fn migrate_downtimes(&self, scope: Scope, host: Option<&str>) -> Result<MigrationReport> {
        let downtimes: Vec<SourceDowntime> = self
            .source
            .list_downtimes(scope, host)
            .into_iter()
            .filter(|d| {
                let recurring = self.settings.is_recurring(&d.comment);
                if recurring {
                    debug!(host = %d.host_name, comment = %d.comment, "recurring downtime, not migrated");
                }
                !recurring
            })
            .collect();
        info!(%scope, count = downtimes.len(), "downtimes to migrate");

        let mut report = MigrationReport::new(self.mode);
        for downtime in &downtimes {
            report.push(self.migrate_downtime(downtime)?);
        }
        info!(%scope, created = report.summary.created, planned = report.summary.planned, "downtime migration done");
        Ok(report)
    }

    fn migrate_downtime(&self, downtime: &SourceDowntime) -> Result<MigrationRecord> {
        let host = downtime.host_name.as_str();
        let kind = match downtime.scope {
            Scope::Host => Kind::HostDowntime,
            Scope::Service => Kind::ServiceDowntime,
        };
        let record = MigrationRecord::new(kind, host, downtime.service_description.as_deref());
        if self.target_index.host(host).is_none() {
            return Ok(self.unmatched(record, format!("host '{host}' not in target")));
        }

        let (object_type, target_filter, service_name) = match &downtime.service_description {
            None => (ObjectType::Host, Filter::new().eq("host.name", host), String::new()),
            Some(description) => match self.resolve_service(host, description) {
                Ok(service) => (
                    ObjectType::Service,
                    Filter::new()
                        .eq("host.name", host)
                        .eq("service.name", service.name.as_str()),
                    service.name.clone(),
                ),
                Err(reason) => return Ok(self.unmatched(record, reason)),
            },
        };

        let comment = self.settings.tagged(&downtime.comment);
        let existing = Query::new(ObjectType::Downtime).filter(
            Filter::new()
                .eq("host.name", host)
                .eq("downtime.service_name", service_name.as_str())
                .eq("downtime.author", downtime.author.as_str())
                .eq("downtime.comment", comment.as_str())
                .eq("downtime.start_time", downtime.start_time)
                .eq("downtime.end_time", downtime.end_time)
                .eq("downtime.duration", downtime.duration)
                .eq("downtime.fixed", downtime.fixed),
        );
        let request = DowntimeRequest {
            object_type,
            filter: target_filter,
            author: downtime.author.clone(),
            comment,
            start_time: downtime.start_time,
            end_time: downtime.end_time,
            duration: downtime.duration,
            fixed: downtime.fixed,
        };
        self.replay(
            record,
            &existing,
            || self.store.schedule_downtime(&request),
            Outcome::Created,
        )
    }

    /// Remove every Target downtime carrying the provenance suffix.
    pub fn clean_migrated_downtimes(&self) -> Result<MigrationReport> {
        let pattern = format!("*{}", self.settings.provenance_suffix);
        let filter = Filter::new().glob("downtime.comment", &pattern);
        let found = self
            .store
            .query(&Query::new(ObjectType::Downtime).filter(filter.clone()))?;
        info!(count = found.len(), "migrated downtimes found");

        let records: Vec<MigrationRecord> = found
            .iter()
            .map(|d| {
                let service = d.attr_str("service_name").filter(|s| !s.is_empty());
                MigrationRecord::new(
                    Kind::MigratedDowntime,
                    d.host_name().unwrap_or(&d.name),
                    service,
                )
            })
            .collect();

        let mut report = MigrationReport::new(self.mode);
        if records.is_empty() {
            return Ok(report);
        }
        let outcome = match self.mode {
            Mode::Simulate => (Outcome::Planned, None),
            Mode::Apply => {
                let response = self.store.remove_downtime(&filter)?;
                if response.is_success() {
                    (Outcome::Removed, None)
                } else {
                    (Outcome::Failed, Some(response.describe()))
                }
            }
        };
        for record in records {
            report.push(record.with(outcome.0, outcome.1.clone()));
        }
        Ok(report)
    }
}
