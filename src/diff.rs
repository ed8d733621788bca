use serde::Serialize;
use serde_json::Value;

use crate::model::{SourceRecord, TargetRecord};
use crate::normalize::{
    Canonical, HostAttribute, NO_SLA_VAR, NormalizeError, Normalizer, ServiceAttribute,
    SourceService, TargetService,
};

/// One attribute that differs, or that could not be compared.
///
/// `source` and `target` carry the literal values as each system stores
/// them, not the normalized forms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDiff {
    pub attribute: String,
    pub source: Value,
    pub target: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incomparable: Option<String>,
}

impl AttributeDiff {
    pub fn is_incomparable(&self) -> bool {
        self.incomparable.is_some()
    }
}

pub struct Differ<'a> {
    normalizer: &'a Normalizer,
}

impl<'a> Differ<'a> {
    pub fn new(normalizer: &'a Normalizer) -> Self {
        Self { normalizer }
    }

    /// Compare the requested host attributes; equal attributes are omitted.
    pub fn diff_host(
        &self,
        source: &SourceRecord,
        target: &TargetRecord,
        attributes: &[HostAttribute],
    ) -> Vec<AttributeDiff> {
        attributes
            .iter()
            .filter_map(|&attribute| {
                let (source_key, target_path): (&str, &[&str]) = match attribute {
                    HostAttribute::NoSla => ("notes", &["vars", NO_SLA_VAR][..]),
                    HostAttribute::NotificationsEnabled => {
                        ("notifications_enabled", &["enable_notifications"][..])
                    }
                    HostAttribute::CheckInterval => ("check_interval", &["check_interval"][..]),
                    HostAttribute::RetryInterval => ("retry_interval", &["retry_interval"][..]),
                    HostAttribute::MaxCheckAttempts => {
                        ("max_check_attempts", &["max_check_attempts"][..])
                    }
                };
                compare(
                    attribute.name(),
                    self.normalizer.source_host(source, attribute),
                    self.normalizer.target_host(target, attribute),
                    || source.raw(source_key),
                    || target.raw(target_path),
                )
            })
            .collect()
    }

    /// Compare the requested service attributes of a correlated pair.
    ///
    /// `status` is the Source runtime status record, when one exists.
    /// `contacts` is the resolved Target recipient list for the service.
    pub fn diff_service(
        &self,
        source: &SourceService,
        status: Option<&SourceRecord>,
        target: &TargetService,
        contacts: Option<&[String]>,
        attributes: &[ServiceAttribute],
    ) -> Vec<AttributeDiff> {
        attributes
            .iter()
            .filter_map(|&attribute| {
                let src = self.normalizer.source_service_attr(source, status, attribute);
                if attribute == ServiceAttribute::Contacts && src == Ok(Canonical::Absent) {
                    // Contacts are not managed for this service.
                    return None;
                }
                compare(
                    attribute.name(),
                    src,
                    self.normalizer.target_service_attr(target, contacts, attribute),
                    || match attribute {
                        ServiceAttribute::NotificationsEnabled => status
                            .filter(|s| s.get("notifications_enabled").is_some())
                            .unwrap_or(&source.record)
                            .raw("notifications_enabled"),
                        ServiceAttribute::NoSla => source.record.raw("notes"),
                        ServiceAttribute::NotesUrl => source.record.raw("notes_url"),
                        ServiceAttribute::Contacts => source.record.raw("contacts"),
                    },
                    || match attribute {
                        ServiceAttribute::NotificationsEnabled => target
                            .record
                            .attr(&["original_attributes", "enable_notifications"])
                            .cloned()
                            .unwrap_or_else(|| target.record.raw(&["enable_notifications"])),
                        ServiceAttribute::NoSla => target.record.raw(&["vars", NO_SLA_VAR]),
                        ServiceAttribute::NotesUrl => target.record.raw(&["notes_url"]),
                        ServiceAttribute::Contacts => {
                            serde_json::json!(contacts.unwrap_or_default())
                        }
                    },
                )
            })
            .collect()
    }
}

fn compare(
    attribute: &str,
    source: Result<Canonical, NormalizeError>,
    target: Result<Canonical, NormalizeError>,
    source_raw: impl FnOnce() -> Value,
    target_raw: impl FnOnce() -> Value,
) -> Option<AttributeDiff> {
    let incomparable = match (&source, &target) {
        (Ok(s), Ok(t)) if s == t => return None,
        (Ok(_), Ok(_)) => None,
        (Err(e), _) => Some(format!("source: {e}")),
        (_, Err(e)) => Some(format!("target: {e}")),
    };
    Some(AttributeDiff {
        attribute: attribute.to_string(),
        source: source_raw(),
        target: target_raw(),
        incomparable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::kinds;
    use serde_json::json;

    fn host_pair() -> (SourceRecord, TargetRecord) {
        let source = SourceRecord::new(kinds::HOST)
            .with("host_name", "web1")
            .with("check_interval", "5")
            .with("retry_interval", "1")
            .with("max_check_attempts", "3")
            .with("notes", "no-sla");
        let target = TargetRecord::new(
            "Host",
            "web1",
            json!({
                "check_interval": 300.0,
                "retry_interval": 60,
                "max_check_attempts": 5,
                "vars": {"nosla": true},
            }),
        );
        (source, target)
    }

    #[test]
    fn host_diff_reports_raw_values_of_differences_only() {
        let normalizer = Normalizer::default();
        let (source, target) = host_pair();
        let diffs = Differ::new(&normalizer).diff_host(&source, &target, HostAttribute::DEFAULT);

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].attribute, "max_check_attempts");
        assert_eq!(diffs[0].source, json!("3"));
        assert_eq!(diffs[0].target, json!(5));
        assert!(!diffs[0].is_incomparable());
    }

    #[test]
    fn interval_scaling_equalizes_minutes_and_seconds() {
        let normalizer = Normalizer::default();
        let (source, target) = host_pair();
        let diffs = Differ::new(&normalizer).diff_host(
            &source,
            &target,
            &[HostAttribute::CheckInterval, HostAttribute::RetryInterval],
        );
        assert!(diffs.is_empty());
    }

    #[test]
    fn unparseable_values_are_incomparable_not_fatal() {
        let normalizer = Normalizer::default();
        let (mut source, target) = host_pair();
        source.set("check_interval", Some("often"));
        source.set("retry_interval", None);

        let diffs = Differ::new(&normalizer).diff_host(
            &source,
            &target,
            &[HostAttribute::CheckInterval, HostAttribute::RetryInterval],
        );
        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().all(AttributeDiff::is_incomparable));
        assert_eq!(diffs[1].source, Value::Null);
    }

    fn service_pair(contacts: &str) -> (SourceService, TargetService) {
        let normalizer = Normalizer::default();
        let source = normalizer
            .source_service(
                &SourceRecord::new(kinds::SERVICE)
                    .with("host_name", "web1")
                    .with("service_description", "PING")
                    .with("check_command", "check_ping_4!1")
                    .with("notifications_enabled", "1")
                    .with("contacts", contacts)
                    .with("notes_url", "https://wiki/ping"),
            )
            .unwrap();
        let target = normalizer
            .target_service(&TargetRecord::new(
                "Service",
                "web1!ping",
                json!({
                    "host_name": "web1",
                    "name": "ping",
                    "check_command": "ping",
                    "enable_notifications": true,
                    "notes_url": "https://wiki/ping",
                }),
            ))
            .unwrap();
        (source, target)
    }

    #[test]
    fn runtime_status_overrides_configured_notifications() {
        let normalizer = Normalizer::default();
        let (source, target) = service_pair("alice");
        let status = SourceRecord::new(kinds::SERVICE_STATUS).with("notifications_enabled", "0");

        let diffs = Differ::new(&normalizer).diff_service(
            &source,
            Some(&status),
            &target,
            None,
            &[ServiceAttribute::NotificationsEnabled],
        );
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].source, json!("0"));
        assert_eq!(diffs[0].target, json!(true));
    }

    #[test]
    fn contacts_compare_as_sorted_sets() {
        let normalizer = Normalizer::default();
        let differ = Differ::new(&normalizer);
        let (source, target) = service_pair("bob, alice");

        let same = vec!["alice".to_string(), "bob".to_string()];
        assert!(
            differ
                .diff_service(&source, None, &target, Some(same.as_slice()), &[ServiceAttribute::Contacts])
                .is_empty()
        );

        let fewer = vec!["alice".to_string()];
        let diffs =
            differ.diff_service(&source, None, &target, Some(fewer.as_slice()), &[ServiceAttribute::Contacts]);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].target, json!(["alice"]));
    }

    #[test]
    fn repeated_source_contact_is_drift() {
        let normalizer = Normalizer::default();
        let (source, target) = service_pair("bob,bob");
        let resolved = vec!["bob".to_string()];
        let diffs = Differ::new(&normalizer).diff_service(
            &source,
            None,
            &target,
            Some(resolved.as_slice()),
            &[ServiceAttribute::Contacts],
        );
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].source, json!("bob,bob"));
    }

    #[test]
    fn unmanaged_contacts_are_skipped() {
        let normalizer = Normalizer::default();
        let (source, target) = service_pair("dummy");
        let diffs = Differ::new(&normalizer).diff_service(
            &source,
            None,
            &target,
            Some(&[][..]),
            &[ServiceAttribute::Contacts, ServiceAttribute::NotesUrl],
        );
        assert!(diffs.is_empty());
    }
}
