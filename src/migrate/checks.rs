use serde_json::{Map, Value};
use tracing::info;

use super::{Kind, MigrationRecord, MigrationReport, Migrator, Outcome};
use crate::error::{MigrateError, Result};
use crate::store::{Filter, ObjectType};

/// Host comment marking active checks as switched off during migration.
pub const DEFAULT_CHECKS_COMMENT: &str = "Active checks disabled during migration";

impl Migrator<'_> {
    /// Toggle active checks on a Target host and every one of its services.
    ///
    /// Disabling leaves a host comment behind; enabling removes the comment
    /// with the same text.
    pub fn set_active_checks(
        &self,
        host: &str,
        enable: bool,
        comment: &str,
        author: &str,
    ) -> Result<MigrationReport> {
        let target = self
            .target_index
            .host(host)
            .ok_or_else(|| MigrateError::HostNotFound(host.to_string()))?;
        info!(host, enable, comment, "setting active checks");

        let mut report = MigrationReport::new(self.mode);
        let record = MigrationRecord::new(Kind::HostActiveChecks, host, None);
        report.push(self.execute(
            record,
            || self.store.update(ObjectType::Host, &target.name, active(enable)),
            Outcome::Updated,
        )?);

        let record = MigrationRecord::new(Kind::ChecksComment, host, None);
        let host_filter = Filter::new().eq("host.name", host);
        if enable {
            let filter = host_filter.eq("comment.text", comment);
            report.push(self.execute(
                record,
                || self.store.remove_comment(&filter),
                Outcome::Removed,
            )?);
        } else {
            report.push(self.execute(
                record,
                || {
                    self.store
                        .add_comment(ObjectType::Host, &host_filter, author, comment)
                },
                Outcome::Created,
            )?);
        }

        for service in self.target_index.services(host) {
            let record = MigrationRecord::new(Kind::ServiceActiveChecks, host, Some(&service.name));
            report.push(self.execute(
                record,
                || {
                    self.store
                        .update(ObjectType::Service, &service.full_name, active(enable))
                },
                Outcome::Updated,
            )?);
        }
        Ok(report)
    }
}

fn active(enable: bool) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("enable_active_checks".into(), Value::Bool(enable));
    attrs
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::DEFAULT_CHECKS_COMMENT;
    use crate::error::MigrateError;
    use crate::migrate::fixtures::{World, web1_source, web1_target};
    use crate::migrate::{Kind, Mode, Outcome};
    use crate::store::ObjectType;

    #[test]
    fn disable_then_enable_round_trip() {
        let world = World::new(web1_source(), web1_target());

        let off = world
            .migrator(Mode::Apply)
            .set_active_checks("web1", false, DEFAULT_CHECKS_COMMENT, "ops")
            .unwrap();
        assert_eq!(off.count(Kind::ServiceActiveChecks, Outcome::Updated), 2);
        assert_eq!(off.count(Kind::ChecksComment, Outcome::Created), 1);
        assert!(
            world
                .store
                .objects_of(ObjectType::Service)
                .iter()
                .all(|s| s.attr(&["enable_active_checks"]) == Some(&json!(false)))
        );
        assert_eq!(world.store.objects_of(ObjectType::Comment).len(), 1);

        let on = world
            .migrator(Mode::Apply)
            .set_active_checks("web1", true, DEFAULT_CHECKS_COMMENT, "ops")
            .unwrap();
        assert_eq!(on.count(Kind::ChecksComment, Outcome::Removed), 1);
        assert!(world.store.objects_of(ObjectType::Comment).is_empty());
        let host = &world.store.objects_of(ObjectType::Host)[0];
        assert_eq!(host.attr(&["enable_active_checks"]), Some(&json!(true)));
    }

    #[test]
    fn simulate_plans_without_touching_the_store() {
        let world = World::new(web1_source(), web1_target());
        let report = world
            .migrator(Mode::Simulate)
            .set_active_checks("web1", false, DEFAULT_CHECKS_COMMENT, "ops")
            .unwrap();
        assert_eq!(report.summary.planned, 4);
        assert_eq!(world.store.mutation_count(), 0);
    }

    #[test]
    fn unknown_host_is_an_error() {
        let world = World::new(web1_source(), web1_target());
        let err = world
            .migrator(Mode::Simulate)
            .set_active_checks("nope", false, DEFAULT_CHECKS_COMMENT, "ops")
            .unwrap_err();
        assert!(matches!(err, MigrateError::HostNotFound(_)));
    }
}
