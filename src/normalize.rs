//! Canonical views of Source and Target attributes.
//!
//! Both systems describe the same concepts with different units, encodings
//! and attribute names. Everything here is pure: the differ and migrator
//! only ever compare values that went through this module.


use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::CheckCommandRule;
use crate::model::{SourceRecord, TargetRecord};

/// Legacy `notes` value marking a host or service as excluded from SLAs.
pub const NO_SLA_NOTE: &str = "no-sla";
/// Target custom variable carrying the same marker.
pub const NO_SLA_VAR: &str = "nosla";
/// Target custom variable used as a hand-written correlation alias.
pub const ALIAS_VAR: &str = "comment";
/// Contact placeholder meaning "contacts are not managed for this service".
pub const UNMANAGED_CONTACT: &str = "dummy";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("missing attribute '{0}'")]
    MissingAttribute(String),
    #[error("attribute '{attribute}' has unusable value '{value}'")]
    InvalidValue { attribute: String, value: String },
}

impl NormalizeError {
    fn invalid(attribute: &str, value: impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }
}

type Normalized = std::result::Result<Canonical, NormalizeError>;

/// A value in the shared representation both sides are compared in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Canonical {
    Number(f64),
    Flag(bool),
    Text(String),
    Names(Vec<String>),
    Absent,
}

/// Host attributes the differ knows how to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HostAttribute {
    CheckInterval,
    MaxCheckAttempts,
    RetryInterval,
    NotificationsEnabled,
    NoSla,
}

impl HostAttribute {
    pub const DEFAULT: &'static [HostAttribute] = &[
        HostAttribute::CheckInterval,
        HostAttribute::MaxCheckAttempts,
        HostAttribute::RetryInterval,
        HostAttribute::NoSla,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::CheckInterval => "check_interval",
            Self::MaxCheckAttempts => "max_check_attempts",
            Self::RetryInterval => "retry_interval",
            Self::NotificationsEnabled => "notifications_enabled",
            Self::NoSla => "nosla",
        }
    }
}

/// Service attributes the differ knows how to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAttribute {
    NotificationsEnabled,
    NoSla,
    NotesUrl,
    Contacts,
}

impl ServiceAttribute {
    pub const DEFAULT: &'static [ServiceAttribute] = &[
        ServiceAttribute::NotificationsEnabled,
        ServiceAttribute::NoSla,
        ServiceAttribute::NotesUrl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::NotificationsEnabled => "notifications_enabled",
            Self::NoSla => "nosla",
            Self::NotesUrl => "notes_url",
            Self::Contacts => "contacts",
        }
    }
}

/// Walk a nested JSON value. Null anywhere along the path reads as absent.
pub fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    (!current.is_null()).then_some(current)
}

/// Legacy booleans are the strings "0" and "1".
pub fn source_flag(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Legacy intervals are minutes; the target uses seconds.
pub fn source_interval(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().map(|minutes| minutes * 60.0)
}

/// Strip a single international "00" dialing prefix.
pub fn normalize_pager(raw: &str) -> String {
    raw.strip_prefix("00").unwrap_or(raw).to_string()
}

/// Split a legacy comma-separated contact list. Duplicates are kept.
///
/// Returns `None` when the list is the unmanaged placeholder.
pub fn source_contacts(raw: Option<&str>) -> Option<Vec<String>> {
    let mut names: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if names == [UNMANAGED_CONTACT] {
        return None;
    }
    names.sort();
    Some(names)
}

/// Translate a shell-style glob into an anchored regex.
pub fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

/// Ordered table mapping legacy check commands onto target command names.
#[derive(Debug, Clone)]
pub struct CheckCommandMap {
    rules: Vec<(Regex, String)>,
}

impl CheckCommandMap {
    pub fn new(rules: &[CheckCommandRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&format!("^(?:{})$", rule.pattern)).map(|re| (re, rule.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Reduce a raw command invocation to the name the target knows it by.
    ///
    /// Arguments after the first `!` are dropped, then the first matching
    /// rule wins. Unmatched commands pass through unchanged.
    pub fn extract(&self, raw: &str) -> String {
        let base = raw.split('!').next().unwrap_or_default().trim();
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(base))
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| base.to_string())
    }
}

impl Default for CheckCommandMap {
    fn default() -> Self {
        Self::new(&CheckCommandRule::defaults())
            .expect("built-in check command patterns are valid")
    }
}

/// A Source service reduced to the fields correlation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceService {
    pub host_name: String,
    pub description: String,
    pub check_command: String,
    pub extracted: String,
    pub record: SourceRecord,
}

/// A Target service reduced to the fields correlation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetService {
    pub host_name: String,
    pub name: String,
    pub full_name: String,
    pub check_command: String,
    pub extracted: String,
    pub alias: Option<String>,
    pub record: TargetRecord,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    commands: CheckCommandMap,
}

impl Normalizer {
    pub fn new(commands: CheckCommandMap) -> Self {
        Self { commands }
    }

    pub fn extract_command(&self, raw: &str) -> String {
        self.commands.extract(raw)
    }

    pub fn source_service(
        &self,
        record: &SourceRecord,
    ) -> std::result::Result<SourceService, NormalizeError> {
        let host_name = required(record, "host_name")?;
        let description = required(record, "service_description")?;
        let check_command = required(record, "check_command")?;
        Ok(SourceService {
            extracted: self.extract_command(check_command),
            host_name: host_name.to_string(),
            description: description.to_string(),
            check_command: check_command.to_string(),
            record: record.clone(),
        })
    }

    pub fn target_service(
        &self,
        record: &TargetRecord,
    ) -> std::result::Result<TargetService, NormalizeError> {
        let host_name = record
            .host_name()
            .ok_or_else(|| NormalizeError::MissingAttribute("host_name".into()))?;
        let name = record
            .attr_str("name")
            .filter(|n| !n.is_empty())
            .or_else(|| record.name.rsplit('!').next())
            .ok_or_else(|| NormalizeError::MissingAttribute("name".into()))?;
        let check_command = record
            .attr_str("check_command")
            .ok_or_else(|| NormalizeError::MissingAttribute("check_command".into()))?;
        let alias = record
            .attr(&["vars", ALIAS_VAR])
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        Ok(TargetService {
            extracted: self.extract_command(check_command),
            host_name: host_name.to_string(),
            name: name.to_string(),
            full_name: format!("{host_name}!{name}"),
            check_command: check_command.to_string(),
            alias,
            record: record.clone(),
        })
    }

    pub fn source_host(&self, record: &SourceRecord, attribute: HostAttribute) -> Normalized {
        match attribute {
            HostAttribute::CheckInterval | HostAttribute::RetryInterval => {
                let raw = required(record, attribute.name())?;
                source_interval(raw)
                    .map(Canonical::Number)
                    .ok_or_else(|| NormalizeError::invalid(attribute.name(), raw))
            }
            HostAttribute::MaxCheckAttempts => {
                let raw = required(record, attribute.name())?;
                raw.trim()
                    .parse::<f64>()
                    .map(Canonical::Number)
                    .map_err(|_| NormalizeError::invalid(attribute.name(), raw))
            }
            HostAttribute::NotificationsEnabled => source_flag_attr(record, "notifications_enabled"),
            HostAttribute::NoSla => Ok(source_no_sla(record)),
        }
    }

    pub fn target_host(&self, record: &TargetRecord, attribute: HostAttribute) -> Normalized {
        match attribute {
            HostAttribute::CheckInterval
            | HostAttribute::RetryInterval
            | HostAttribute::MaxCheckAttempts => {
                let value = record
                    .attr(&[attribute.name()])
                    .ok_or_else(|| NormalizeError::MissingAttribute(attribute.name().into()))?;
                number(value)
                    .map(Canonical::Number)
                    .ok_or_else(|| NormalizeError::invalid(attribute.name(), value))
            }
            HostAttribute::NotificationsEnabled => target_notifications(record),
            HostAttribute::NoSla => Ok(target_no_sla(record)),
        }
    }

    /// Source value for a service attribute.
    ///
    /// Notification state prefers the runtime status record over the
    /// configured value, since operators toggle it at runtime.
    pub fn source_service_attr(
        &self,
        service: &SourceService,
        status: Option<&SourceRecord>,
        attribute: ServiceAttribute,
    ) -> Normalized {
        let record = &service.record;
        match attribute {
            ServiceAttribute::NotificationsEnabled => match status {
                Some(status) if status.get("notifications_enabled").is_some() => {
                    source_flag_attr(status, "notifications_enabled")
                }
                _ => source_flag_attr(record, "notifications_enabled"),
            },
            ServiceAttribute::NoSla => Ok(source_no_sla(record)),
            ServiceAttribute::NotesUrl => Ok(record
                .get("notes_url")
                .map(|url| Canonical::Text(url.to_string()))
                .unwrap_or(Canonical::Absent)),
            ServiceAttribute::Contacts => Ok(match source_contacts(record.get("contacts")) {
                Some(names) => Canonical::Names(names),
                None => Canonical::Absent,
            }),
        }
    }

    /// Target value for a service attribute. `contacts` is the resolved
    /// notification recipient list, which lives outside the service record.
    pub fn target_service_attr(
        &self,
        service: &TargetService,
        contacts: Option<&[String]>,
        attribute: ServiceAttribute,
    ) -> Normalized {
        let record = &service.record;
        match attribute {
            ServiceAttribute::NotificationsEnabled => target_notifications(record),
            ServiceAttribute::NoSla => Ok(target_no_sla(record)),
            ServiceAttribute::NotesUrl => Ok(record
                .attr_str("notes_url")
                .filter(|url| !url.is_empty())
                .map(|url| Canonical::Text(url.to_string()))
                .unwrap_or(Canonical::Absent)),
            ServiceAttribute::Contacts => {
                let mut names: Vec<String> = contacts.unwrap_or_default().to_vec();
                names.sort();
                names.dedup();
                Ok(Canonical::Names(names))
            }
        }
    }
}

fn required<'a>(
    record: &'a SourceRecord,
    key: &str,
) -> std::result::Result<&'a str, NormalizeError> {
    record
        .get(key)
        .ok_or_else(|| NormalizeError::MissingAttribute(key.to_string()))
}

fn source_flag_attr(record: &SourceRecord, key: &str) -> Normalized {
    let raw = required(record, key)?;
    source_flag(raw)
        .map(Canonical::Flag)
        .ok_or_else(|| NormalizeError::invalid(key, raw))
}

fn source_no_sla(record: &SourceRecord) -> Canonical {
    Canonical::Flag(record.get("notes") == Some(NO_SLA_NOTE))
}

fn target_no_sla(record: &TargetRecord) -> Canonical {
    Canonical::Flag(record.attr(&["vars", NO_SLA_VAR]).is_some_and(is_truthy))
}

/// Runtime changes on the target shadow the configured value and record
/// the configured one under `original_attributes`.
pub fn target_notifications(record: &TargetRecord) -> Normalized {
    let value = record
        .attr(&["original_attributes", "enable_notifications"])
        .or_else(|| record.attr(&["enable_notifications"]))
        .ok_or_else(|| NormalizeError::MissingAttribute("enable_notifications".into()))?;
    match value {
        Value::Bool(b) => Ok(Canonical::Flag(*b)),
        other => number(other)
            .map(|n| Canonical::Flag(n != 0.0))
            .ok_or_else(|| NormalizeError::invalid("enable_notifications", other)),
    }
}

/// Live notification state on the target, ignoring any configured original.
pub fn target_notifications_live(record: &TargetRecord) -> Option<bool> {
    record.attr(&["enable_notifications"]).map(is_truthy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::kinds;
    use serde_json::json;

    fn rules() -> Vec<CheckCommandRule> {
        vec![
            CheckCommandRule {
                pattern: "check_ping_.*".into(),
                name: "ping".into(),
            },
            CheckCommandRule {
                pattern: "check_http_.*".into(),
                name: "http".into(),
            },
        ]
    }

    #[test]
    fn extract_strips_arguments_and_maps_patterns() {
        let map = CheckCommandMap::new(&rules()).unwrap();
        assert_eq!(map.extract("check_ping_4!100.0,20%!500.0,60%"), "ping");
        assert_eq!(map.extract("check_http_vhost!example.org"), "http");
        assert_eq!(map.extract("check_load!5,4,3!10,8,6"), "check_load");
        assert_eq!(map.extract("check_disk"), "check_disk");
    }

    #[test]
    fn extract_is_idempotent() {
        let map = CheckCommandMap::new(&rules()).unwrap();
        for raw in ["check_ping_anything!1!2", "check_http_x", "check_nrpe!load", "ping", ""] {
            let once = map.extract(raw);
            assert_eq!(map.extract(&once), once, "not idempotent for {raw}");
        }
    }

    #[test]
    fn extract_requires_full_match() {
        let map = CheckCommandMap::default();
        assert_eq!(map.extract("check_ping_anything"), "ping");
        assert_eq!(map.extract("my_check_ping_x"), "my_check_ping_x");
    }

    #[test]
    fn first_matching_rule_wins() {
        let map = CheckCommandMap::new(&[
            CheckCommandRule {
                pattern: "check_.*".into(),
                name: "generic".into(),
            },
            CheckCommandRule {
                pattern: "check_ping_.*".into(),
                name: "ping".into(),
            },
        ])
        .unwrap();
        assert_eq!(map.extract("check_ping_1"), "generic");
    }

    #[test]
    fn source_host_intervals_are_scaled_to_seconds() {
        let normalizer = Normalizer::default();
        let host = SourceRecord::new(kinds::HOST)
            .with("check_interval", "5")
            .with("retry_interval", "1.5")
            .with("max_check_attempts", "3");
        assert_eq!(
            normalizer.source_host(&host, HostAttribute::CheckInterval),
            Ok(Canonical::Number(300.0))
        );
        assert_eq!(
            normalizer.source_host(&host, HostAttribute::RetryInterval),
            Ok(Canonical::Number(90.0))
        );
        assert_eq!(
            normalizer.source_host(&host, HostAttribute::MaxCheckAttempts),
            Ok(Canonical::Number(3.0))
        );
    }

    #[test]
    fn source_host_reports_missing_and_invalid() {
        let normalizer = Normalizer::default();
        let host = SourceRecord::new(kinds::HOST).with("check_interval", "soon");
        assert_eq!(
            normalizer.source_host(&host, HostAttribute::RetryInterval),
            Err(NormalizeError::MissingAttribute("retry_interval".into()))
        );
        assert!(matches!(
            normalizer.source_host(&host, HostAttribute::CheckInterval),
            Err(NormalizeError::InvalidValue { .. })
        ));
    }

    #[test]
    fn no_sla_markers_agree() {
        let normalizer = Normalizer::default();
        let source = SourceRecord::new(kinds::HOST).with("notes", "no-sla");
        let target = TargetRecord::new("Host", "web1", json!({"vars": {"nosla": true}}));
        assert_eq!(
            normalizer.source_host(&source, HostAttribute::NoSla),
            normalizer.target_host(&target, HostAttribute::NoSla)
        );

        let plain = SourceRecord::new(kinds::HOST).with("notes", "something else");
        let bare = TargetRecord::new("Host", "web1", json!({"vars": null}));
        assert_eq!(
            normalizer.source_host(&plain, HostAttribute::NoSla),
            Ok(Canonical::Flag(false))
        );
        assert_eq!(
            normalizer.target_host(&bare, HostAttribute::NoSla),
            Ok(Canonical::Flag(false))
        );
    }

    #[test]
    fn target_notifications_prefer_original_attributes() {
        let overridden = TargetRecord::new(
            "Service",
            "web1!ping",
            json!({
                "enable_notifications": false,
                "original_attributes": {"enable_notifications": true}
            }),
        );
        assert_eq!(target_notifications(&overridden), Ok(Canonical::Flag(true)));
        assert_eq!(target_notifications_live(&overridden), Some(false));

        let plain = TargetRecord::new("Service", "web1!ping", json!({"enable_notifications": 1}));
        assert_eq!(target_notifications(&plain), Ok(Canonical::Flag(true)));
    }

    #[test]
    fn pager_prefix_is_stripped_once() {
        assert_eq!(normalize_pager("0049123456"), "49123456");
        assert_eq!(normalize_pager("49123456"), "49123456");
        assert_eq!(normalize_pager("000049"), "0049");
    }

    #[test]
    fn contacts_are_split_trimmed_and_sorted() {
        assert_eq!(
            source_contacts(Some("zoe, adam ,bob,adam")),
            Some(vec!["adam".to_string(), "adam".into(), "bob".into(), "zoe".into()])
        );
        assert_eq!(source_contacts(Some("dummy")), None);
        assert_eq!(source_contacts(None), Some(vec![]));
    }

    #[test]
    fn get_path_treats_null_as_absent() {
        let value = json!({"vars": {"nosla": null, "comment": "check_foo"}});
        assert_eq!(get_path(&value, &["vars", "nosla"]), None);
        assert_eq!(get_path(&value, &["vars", "missing"]), None);
        assert_eq!(
            get_path(&value, &["vars", "comment"]),
            Some(&json!("check_foo"))
        );
    }

    #[test]
    fn glob_translation_escapes_literals() {
        let re = glob_regex("* [migrated]").unwrap();
        assert!(re.is_match("Maintenance window [migrated]"));
        assert!(!re.is_match("Maintenance window [migrated] again"));
        assert!(!re.is_match("Maintenance window migrated"));
    }
}
