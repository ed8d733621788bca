//! Lookup tables built once per run from the two snapshots.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{SourceRecord, TargetRecord};
use crate::normalize::{Normalizer, SourceService, TargetService};
use crate::store::SourceSnapshot;

#[derive(Debug, Default)]
pub struct SourceIndex {
    hosts: BTreeMap<String, SourceRecord>,
    services: BTreeMap<String, Vec<SourceService>>,
    host_status: HashMap<String, SourceRecord>,
    service_status: HashMap<String, Vec<SourceRecord>>,
    rejected: usize,
}

impl SourceIndex {
    pub fn build(snapshot: &SourceSnapshot, normalizer: &Normalizer) -> Self {
        let mut index = Self::default();
        for record in snapshot.list_hosts(&[]) {
            match record.host_name() {
                Some(name) => {
                    index.hosts.insert(name.to_string(), record.clone());
                }
                None => index.rejected += 1,
            }
        }
        for record in snapshot.list_services(&[]) {
            match normalizer.source_service(record) {
                Ok(service) => index
                    .services
                    .entry(service.host_name.clone())
                    .or_default()
                    .push(service),
                Err(e) => {
                    warn!(error = %e, host = ?record.host_name(), "skipping source service");
                    index.rejected += 1;
                }
            }
        }
        for record in snapshot.host_statuses(&[]) {
            if let Some(name) = record.host_name() {
                index.host_status.insert(name.to_string(), record.clone());
            }
        }
        for record in snapshot.service_statuses(&[]) {
            if let Some(name) = record.host_name() {
                index
                    .service_status
                    .entry(name.to_string())
                    .or_default()
                    .push(record.clone());
            }
        }
        debug!(
            hosts = index.hosts.len(),
            services = index.services.values().map(Vec::len).sum::<usize>(),
            rejected = index.rejected,
            "source index built"
        );
        index
    }

    pub fn host(&self, name: &str) -> Option<&SourceRecord> {
        self.hosts.get(name)
    }

    /// Host names in sorted order.
    pub fn host_names(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    /// Hosts that own services, whether or not a host record exists.
    pub fn service_host_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn services(&self, host: &str) -> &[SourceService] {
        self.services.get(host).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn host_status(&self, host: &str) -> Option<&SourceRecord> {
        self.host_status.get(host)
    }

    /// Status record for a service, matched on command and description.
    pub fn service_status(&self, service: &SourceService) -> Option<&SourceRecord> {
        self.service_status.get(&service.host_name)?.iter().find(|status| {
            status.get("check_command") == Some(service.check_command.as_str())
                && status.get("service_description") == Some(service.description.as_str())
        })
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

#[derive(Debug, Default)]
pub struct TargetIndex {
    hosts: BTreeMap<String, TargetRecord>,
    services: BTreeMap<String, Vec<TargetService>>,
    rejected: usize,
}

impl TargetIndex {
    pub fn build(hosts: &[TargetRecord], services: &[TargetRecord], normalizer: &Normalizer) -> Self {
        let mut index = Self::default();
        for record in hosts {
            index.hosts.insert(record.name.clone(), record.clone());
        }
        for record in services {
            match normalizer.target_service(record) {
                Ok(service) => index
                    .services
                    .entry(service.host_name.clone())
                    .or_default()
                    .push(service),
                Err(e) => {
                    warn!(error = %e, name = %record.name, "skipping target service");
                    index.rejected += 1;
                }
            }
        }
        debug!(
            hosts = index.hosts.len(),
            services = index.services.values().map(Vec::len).sum::<usize>(),
            rejected = index.rejected,
            "target index built"
        );
        index
    }

    pub fn host(&self, name: &str) -> Option<&TargetRecord> {
        self.hosts.get(name)
    }

    pub fn host_names(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    pub fn services(&self, host: &str) -> &[TargetService] {
        self.services.get(host).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

/// Who gets notified for each target checkable, keyed `host` or `host!service`.
#[derive(Debug, Default)]
pub struct ContactIndex {
    users: BTreeMap<String, TargetRecord>,
    recipients: HashMap<String, BTreeSet<String>>,
}

impl ContactIndex {
    /// Resolve notification recipients.
    ///
    /// Recipients come from each Notification's `users` and the members of
    /// its `user_groups`. A service's `vars.notifications.users` adds to
    /// that. Names in `excludes` are dropped, as are names that are not
    /// known users.
    pub fn build(
        users: &[TargetRecord],
        notifications: &[TargetRecord],
        services: &[TargetRecord],
        excludes: &[String],
        notification_filter: Option<&Regex>,
    ) -> Self {
        let users: BTreeMap<String, TargetRecord> =
            users.iter().map(|u| (u.name.clone(), u.clone())).collect();
        let mut group_members: HashMap<&str, Vec<&str>> = HashMap::new();
        for user in users.values() {
            for group in string_list(user.attr(&["groups"])) {
                group_members.entry(group).or_default().push(&user.name);
            }
        }

        let mut recipients: HashMap<String, BTreeSet<String>> = HashMap::new();
        for notification in notifications {
            if notification_filter.is_some_and(|re| !re.is_match(&notification.name)) {
                continue;
            }
            let Some(host) = notification.attr_str("host_name") else {
                continue;
            };
            let key = match notification.attr_str("service_name").filter(|s| !s.is_empty()) {
                Some(service) => format!("{host}!{service}"),
                None => host.to_string(),
            };
            let entry = recipients.entry(key).or_default();
            entry.extend(string_list(notification.attr(&["users"])).map(str::to_string));
            for group in string_list(notification.attr(&["user_groups"])) {
                if let Some(members) = group_members.get(group) {
                    entry.extend(members.iter().map(|m| m.to_string()));
                }
            }
        }

        for service in services {
            let overrides = string_list(service.attr(&["vars", "notifications", "users"]));
            recipients
                .entry(service.name.clone())
                .or_default()
                .extend(overrides.map(str::to_string));
        }

        for names in recipients.values_mut() {
            names.retain(|name| users.contains_key(name) && !excludes.contains(name));
        }

        Self { users, recipients }
    }

    pub fn user(&self, name: &str) -> Option<&TargetRecord> {
        self.users.get(name)
    }

    pub fn recipients(&self, key: &str) -> Vec<String> {
        self.recipients
            .get(key)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn string_list(value: Option<&Value>) -> impl Iterator<Item = &str> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::kinds;
    use serde_json::json;

    #[test]
    fn source_index_groups_services_and_status() {
        let snapshot = SourceSnapshot::from_records(
            "t",
            vec![
                SourceRecord::new(kinds::HOST).with("host_name", "web1"),
                SourceRecord::new(kinds::SERVICE)
                    .with("host_name", "web1")
                    .with("service_description", "PING")
                    .with("check_command", "check_ping_4!100,20%"),
                SourceRecord::new(kinds::SERVICE)
                    .with("host_name", "web1")
                    .with("service_description", "broken"),
                SourceRecord::new(kinds::SERVICE_STATUS)
                    .with("host_name", "web1")
                    .with("service_description", "PING")
                    .with("check_command", "check_ping_4!100,20%")
                    .with("notifications_enabled", "0"),
            ],
        )
        .unwrap();
        let index = SourceIndex::build(&snapshot, &Normalizer::default());
        assert_eq!(index.services("web1").len(), 1);
        assert_eq!(index.services("web1")[0].extracted, "ping");
        assert_eq!(index.rejected(), 1);
        assert!(index.services("other").is_empty());

        let status = index.service_status(&index.services("web1")[0]).unwrap();
        assert_eq!(status.get("notifications_enabled"), Some("0"));
    }

    #[test]
    fn contact_index_merges_users_groups_and_overrides() {
        let users = vec![
            TargetRecord::new("User", "alice", json!({"groups": ["ops"]})),
            TargetRecord::new("User", "bob", json!({"groups": ["ops"]})),
            TargetRecord::new("User", "carol", json!({})),
            TargetRecord::new("User", "robot", json!({})),
        ];
        let notifications = vec![TargetRecord::new(
            "Notification",
            "web1!ping!mail",
            json!({
                "host_name": "web1",
                "service_name": "ping",
                "users": ["robot"],
                "user_groups": ["ops"],
            }),
        )];
        let services = vec![TargetRecord::new(
            "Service",
            "web1!ping",
            json!({"vars": {"notifications": {"users": ["carol", "ghost"]}}}),
        )];

        let index = ContactIndex::build(
            &users,
            &notifications,
            &services,
            &["robot".to_string()],
            None,
        );
        assert_eq!(index.recipients("web1!ping"), vec!["alice", "bob", "carol"]);
        assert!(index.recipients("web1!other").is_empty());
    }

    #[test]
    fn notification_filter_limits_sources() {
        let users = vec![TargetRecord::new("User", "alice", json!({}))];
        let notifications = vec![TargetRecord::new(
            "Notification",
            "web1!ping!sms",
            json!({"host_name": "web1", "service_name": "ping", "users": ["alice"]}),
        )];
        let only_mail = Regex::new("^.*!mail$").unwrap();
        let index = ContactIndex::build(&users, &notifications, &[], &[], Some(&only_mail));
        assert!(index.recipients("web1!ping").is_empty());
    }
}
