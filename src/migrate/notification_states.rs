use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{Kind, MigrationRecord, MigrationReport, Migrator, Outcome};
use crate::error::Result;
use crate::normalize::{source_flag, target_notifications_live};
use crate::store::ObjectType;

/// Source notifications: configured on, switched off at runtime.
fn disabled_at_runtime(config: Option<&str>, status: Option<&str>) -> bool {
    config.and_then(source_flag) == Some(true) && status.and_then(source_flag) == Some(false)
}

impl Migrator<'_> {
    /// Disable Target host notifications that an operator disabled on the Source.
    ///
    /// Must run before [`Self::migrate_service_notification_states`].
    pub fn migrate_host_notification_states(&self, host: Option<&str>) -> Result<MigrationReport> {
        let mut report = MigrationReport::new(self.mode);
        let hosts: Vec<&str> = match host {
            Some(h) => vec![h],
            None => self.source_index.host_names().collect(),
        };
        for name in hosts {
            let record = MigrationRecord::new(Kind::HostNotificationState, name, None);
            let Some(source) = self.source_index.host(name) else {
                report.push(self.unmatched(record, format!("host '{name}' not in source")));
                continue;
            };
            let Some(target) = self.target_index.host(name) else {
                report.push(self.unmatched(record, format!("host '{name}' not in target")));
                continue;
            };
            let status = self.source_index.host_status(name);
            if !disabled_at_runtime(
                source.get("notifications_enabled"),
                status.and_then(|s| s.get("notifications_enabled")),
            ) {
                continue;
            }
            if target_notifications_live(target) == Some(false) {
                report.push(record.with(Outcome::SkippedExisting, None));
                continue;
            }
            let attrs = self.disabled_notifications();
            report.push(self.execute(
                record,
                || self.store.update(ObjectType::Host, &target.name, attrs),
                Outcome::Updated,
            )?);
        }
        info!(updated = report.summary.updated, planned = report.summary.planned, "host notification states done");
        Ok(report)
    }

    /// Disable Target service notifications that were switched off on the Source.
    ///
    /// Services of hosts whose own notifications are off at runtime are left
    /// to the host-level migration. A host without a status record counts
    /// with its configured value.
    pub fn migrate_service_notification_states(&self, host: Option<&str>) -> Result<MigrationReport> {
        let mut report = MigrationReport::new(self.mode);
        let hosts: Vec<&str> = match host {
            Some(h) => vec![h],
            None => self.source_index.host_names().collect(),
        };
        for name in hosts {
            // Without a status record the configured value is the runtime value.
            let host_enabled = self
                .source_index
                .host_status(name)
                .and_then(|s| s.get("notifications_enabled"))
                .or_else(|| {
                    self.source_index
                        .host(name)
                        .and_then(|h| h.get("notifications_enabled"))
                })
                .and_then(source_flag);
            match host_enabled {
                Some(true) => {}
                Some(false) => {
                    debug!(host = name, "host notifications disabled on source, services left alone");
                    continue;
                }
                None => {
                    let record = MigrationRecord::new(Kind::ServiceNotificationState, name, None);
                    report.push(self.unmatched(
                        record,
                        format!("host '{name}' has no notification state in source"),
                    ));
                    continue;
                }
            }
            if self.target_index.host(name).is_none() {
                let record = MigrationRecord::new(Kind::ServiceNotificationState, name, None);
                report.push(self.unmatched(record, format!("host '{name}' not in target")));
                continue;
            }
            for service in self.source_index.services(name) {
                let status = self.source_index.service_status(service);
                if !disabled_at_runtime(
                    service.record.get("notifications_enabled"),
                    status.and_then(|s| s.get("notifications_enabled")),
                ) {
                    continue;
                }
                let record = MigrationRecord::new(
                    Kind::ServiceNotificationState,
                    name,
                    Some(&service.description),
                );
                let target = match self.resolve_service(name, &service.description) {
                    Ok(target) => target,
                    Err(reason) => {
                        report.push(self.unmatched(record, reason));
                        continue;
                    }
                };
                if target_notifications_live(&target.record) != Some(true) {
                    debug!(host = name, service = %target.name, "service notifications already disabled");
                    report.push(record.with(Outcome::SkippedExisting, None));
                    continue;
                }
                let attrs = self.disabled_notifications();
                report.push(self.execute(
                    record,
                    || self.store.update(ObjectType::Service, &target.full_name, attrs),
                    Outcome::Updated,
                )?);
            }
        }
        info!(updated = report.summary.updated, planned = report.summary.planned, "service notification states done");
        Ok(report)
    }

    fn disabled_notifications(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("enable_notifications".into(), json!(false));
        attrs.insert(
            "notes".into(),
            json!(self.settings.tagged(&self.settings.notes_prefix)),
        );
        attrs
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::migrate::fixtures::{World, web1_source, web1_target};
    use crate::migrate::{Kind, Mode, Outcome};
    use crate::model::{SourceRecord, kinds};
    use crate::store::ObjectType;

    fn statuses(host: &str, service: &str) -> Vec<SourceRecord> {
        let mut records = web1_source();
        records.push(
            SourceRecord::new(kinds::HOST_STATUS)
                .with("host_name", "web1")
                .with("notifications_enabled", host),
        );
        records.push(
            SourceRecord::new(kinds::SERVICE_STATUS)
                .with("host_name", "web1")
                .with("service_description", "PING")
                .with("check_command", "check_ping_4!100.0,20%")
                .with("notifications_enabled", service),
        );
        records
    }

    #[test]
    fn host_state_is_disabled_with_provenance_note() {
        let world = World::new(statuses("0", "1"), web1_target());
        let report = world
            .migrator(Mode::Apply)
            .migrate_host_notification_states(None)
            .unwrap();
        assert_eq!(report.count(Kind::HostNotificationState, Outcome::Updated), 1);

        let host = &world.store.objects_of(ObjectType::Host)[0];
        assert_eq!(host.attr(&["enable_notifications"]), Some(&json!(false)));
        assert_eq!(
            host.attr_str("notes"),
            Some("Notifications disabled during migration [migrated]")
        );

        let services = world
            .migrator(Mode::Apply)
            .migrate_service_notification_states(None)
            .unwrap();
        assert!(services.records.is_empty());
    }

    #[test]
    fn service_state_follows_runtime_status() {
        let world = World::new(statuses("1", "0"), web1_target());
        let hosts = world
            .migrator(Mode::Apply)
            .migrate_host_notification_states(None)
            .unwrap();
        assert!(hosts.records.is_empty());

        let services = world
            .migrator(Mode::Apply)
            .migrate_service_notification_states(None)
            .unwrap();
        assert_eq!(services.count(Kind::ServiceNotificationState, Outcome::Updated), 1);
        let ping = world
            .store
            .objects_of(ObjectType::Service)
            .into_iter()
            .find(|s| s.name == "web1!ping")
            .unwrap();
        assert_eq!(ping.attr(&["enable_notifications"]), Some(&json!(false)));
        assert_eq!(world.store.mutation_count(), 1);
    }

    #[test]
    fn host_without_status_falls_back_to_configured_value() {
        let mut records = web1_source();
        records.push(
            SourceRecord::new(kinds::SERVICE_STATUS)
                .with("host_name", "web1")
                .with("service_description", "PING")
                .with("check_command", "check_ping_4!100.0,20%")
                .with("notifications_enabled", "0"),
        );
        let world = World::new(records, web1_target());
        let report = world
            .migrator(Mode::Simulate)
            .migrate_service_notification_states(None)
            .unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.count(Kind::ServiceNotificationState, Outcome::Planned), 1);
        assert_eq!(world.store.mutation_count(), 0);
    }

    #[test]
    fn host_without_any_notification_state_is_reported() {
        let mut records = vec![SourceRecord::new(kinds::HOST).with("host_name", "web1")];
        records.extend(web1_source().into_iter().skip(1));
        let world = World::new(records, web1_target());
        let report = world
            .migrator(Mode::Simulate)
            .migrate_service_notification_states(None)
            .unwrap();
        assert_eq!(report.count(Kind::ServiceNotificationState, Outcome::SkippedUnmatched), 1);
    }

    #[test]
    fn already_disabled_target_is_skipped() {
        let mut target = web1_target();
        target[0].attrs.insert("enable_notifications".into(), json!(false));
        let world = World::new(statuses("0", "1"), target);
        let report = world
            .migrator(Mode::Simulate)
            .migrate_host_notification_states(None)
            .unwrap();
        assert_eq!(report.summary.skipped_existing, 1);
        assert_eq!(world.store.mutation_count(), 0);
    }
}
