use tracing::info;

use super::{Kind, MigrationRecord, MigrationReport, Migrator, Outcome};
use crate::error::Result;
use crate::model::{Scope, SourceAcknowledgement};
use crate::store::{Filter, ObjectType, Query};

/// Target comment `entry_type` of an acknowledgement.
const ACKNOWLEDGEMENT: i64 = 4;

impl Migrator<'_> {
    pub fn migrate_host_acknowledgements(&self, host: Option<&str>) -> Result<MigrationReport> {
        self.migrate_acknowledgements(Scope::Host, host)
    }

    pub fn migrate_service_acknowledgements(&self, host: Option<&str>) -> Result<MigrationReport> {
        self.migrate_acknowledgements(Scope::Service, host)
    }

    fn migrate_acknowledgements(&self, scope: Scope, host: Option<&str>) -> Result<MigrationReport> {
        let acks = self.source.list_acknowledgements(scope, host);
        info!(%scope, count = acks.len(), "acknowledgements to migrate");
        let mut report = MigrationReport::new(self.mode);
        for ack in &acks {
            report.push(self.migrate_acknowledgement(ack)?);
        }
        Ok(report)
    }

    fn migrate_acknowledgement(&self, ack: &SourceAcknowledgement) -> Result<MigrationRecord> {
        let host = ack.host_name.as_str();
        let kind = match ack.scope {
            Scope::Host => Kind::HostAcknowledgement,
            Scope::Service => Kind::ServiceAcknowledgement,
        };
        let record = MigrationRecord::new(kind, host, ack.service_description.as_deref());
        if self.target_index.host(host).is_none() {
            return Ok(self.unmatched(record, format!("host '{host}' not in target")));
        }

        let (object_type, target_filter, service_name) = match &ack.service_description {
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

        let comment = self.settings.tagged(&ack.comment);
        let existing = Query::new(ObjectType::Comment).filter(
            Filter::new()
                .eq("host.name", host)
                .eq("comment.service_name", service_name.as_str())
                .eq("comment.entry_type", ACKNOWLEDGEMENT)
                .eq("comment.author", ack.author.as_str())
                .eq("comment.text", comment.as_str()),
        );
        self.replay(
            record,
            &existing,
            || {
                self.store
                    .acknowledge(object_type, &target_filter, &ack.author, &comment)
            },
            Outcome::Created,
        )
    }
}
