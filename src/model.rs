use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MigrateError, Result};
use crate::normalize::{get_path, source_flag};

/// Object types found in the legacy snapshot.
pub mod kinds {
    pub const HOST: &str = "host";
    pub const SERVICE: &str = "service";
    pub const CONTACT: &str = "contact";
    pub const HOST_STATUS: &str = "hoststatus";
    pub const SERVICE_STATUS: &str = "servicestatus";
    pub const HOST_DOWNTIME: &str = "hostdowntime";
    pub const SERVICE_DOWNTIME: &str = "servicedowntime";
    pub const HOST_COMMENT: &str = "hostcomment";
    pub const SERVICE_COMMENT: &str = "servicecomment";
}

/// Comment entry type that marks an acknowledgement rather than an operator note.
pub const ACKNOWLEDGEMENT_ENTRY_TYPE: &str = "4";

/// Whether an entity hangs off a host directly or off one of its services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Host,
    Service,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Service => write!(f, "service"),
        }
    }
}

/// A flat key/value record from the legacy system.
///
/// A key mapped to `None` was present with an empty value; a missing key
/// was never set. Both read back as `None` from [`SourceRecord::get`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRecord {
    fields: BTreeMap<String, Option<String>>,
}

impl SourceRecord {
    pub fn new(object_type: &str) -> Self {
        let mut record = Self::default();
        record.set("object_type", Some(object_type));
        record
    }

    /// Builder used by fixtures and loaders.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, Some(value));
        self
    }

    pub fn set(&mut self, key: &str, value: Option<&str>) {
        self.fields
            .insert(key.to_string(), value.map(str::to_string));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_deref())
    }

    /// Present, but with an empty value.
    pub fn is_blank(&self, key: &str) -> bool {
        matches!(self.fields.get(key), Some(None))
    }

    pub fn object_type(&self) -> Option<&str> {
        self.get("object_type")
    }

    pub fn host_name(&self) -> Option<&str> {
        self.get("host_name")
    }

    pub fn monitoring_source(&self) -> Option<&str> {
        self.get("monitoring_source")
    }

    pub fn fields(&self) -> &BTreeMap<String, Option<String>> {
        &self.fields
    }

    /// The literal value as it appears in the record, for reports.
    pub fn raw(&self, key: &str) -> Value {
        match self.get(key) {
            Some(value) => Value::String(value.to_string()),
            None => Value::Null,
        }
    }

    fn require(&self, kind: &'static str, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| MigrateError::InvalidRecord {
            kind,
            key: key.to_string(),
        })
    }

    fn require_int(&self, kind: &'static str, key: &str) -> Result<i64> {
        let raw = self.require(kind, key)?;
        raw.trim()
            .parse::<f64>()
            .map(|v| v as i64)
            .map_err(|_| MigrateError::InvalidRecord {
                kind,
                key: key.to_string(),
            })
    }
}

/// A record returned by the target API: an `attrs` bag plus optional joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub attrs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub joins: Map<String, Value>,
}

impl TargetRecord {
    pub fn new(object_type: &str, name: &str, attrs: Value) -> Self {
        let attrs = match attrs {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.to_string(),
            object_type: object_type.to_string(),
            attrs,
            joins: Map::new(),
        }
    }

    pub fn attr(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let value = self.attrs.get(*first)?;
        get_path(value, rest)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(&[key]).and_then(Value::as_str)
    }

    pub fn join(&self, object: &str, path: &[&str]) -> Option<&Value> {
        get_path(self.joins.get(object)?, path)
    }

    /// Host name from the attribute bag, falling back to the host join.
    pub fn host_name(&self) -> Option<&str> {
        self.attr_str("host_name")
            .filter(|name| !name.is_empty())
            .or_else(|| self.join("host", &["name"]).and_then(Value::as_str))
            .or_else(|| {
                (self.object_type == "Host").then_some(self.name.as_str())
            })
    }

    /// The literal attribute value, for reports.
    pub fn raw(&self, path: &[&str]) -> Value {
        self.attr(path).cloned().unwrap_or(Value::Null)
    }
}

/// A scheduled downtime from the legacy status data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDowntime {
    pub scope: Scope,
    pub host_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_description: Option<String>,
    pub author: String,
    pub comment: String,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: i64,
    pub fixed: bool,
}

impl SourceDowntime {
    pub fn from_record(record: &SourceRecord) -> Result<Self> {
        const KIND: &str = "downtime";
        let scope = match record.object_type() {
            Some(kinds::SERVICE_DOWNTIME) => Scope::Service,
            _ => Scope::Host,
        };
        let service_description = match scope {
            Scope::Service => Some(record.require(KIND, "service_description")?.to_string()),
            Scope::Host => None,
        };
        Ok(Self {
            scope,
            host_name: record.require(KIND, "host_name")?.to_string(),
            service_description,
            author: record.get("author").unwrap_or_default().to_string(),
            comment: record.get("comment").unwrap_or_default().to_string(),
            start_time: record.require_int(KIND, "start_time")?,
            end_time: record.require_int(KIND, "end_time")?,
            duration: record.require_int(KIND, "duration")?,
            fixed: record
                .get("fixed")
                .and_then(source_flag)
                .unwrap_or(false),
        })
    }
}

/// An acknowledgement comment from the legacy status data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAcknowledgement {
    pub scope: Scope,
    pub host_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_description: Option<String>,
    pub author: String,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_time: Option<i64>,
}

impl SourceAcknowledgement {
    pub fn from_record(record: &SourceRecord) -> Result<Self> {
        const KIND: &str = "acknowledgement";
        let scope = match record.object_type() {
            Some(kinds::SERVICE_COMMENT) => Scope::Service,
            _ => Scope::Host,
        };
        let service_description = match scope {
            Scope::Service => Some(record.require(KIND, "service_description")?.to_string()),
            Scope::Host => None,
        };
        Ok(Self {
            scope,
            host_name: record.require(KIND, "host_name")?.to_string(),
            service_description,
            author: record.get("author").unwrap_or_default().to_string(),
            comment: record.get("comment_data").unwrap_or_default().to_string(),
            entry_time: record.require_int(KIND, "entry_time").ok(),
        })
    }
}

/// A contact definition from the legacy configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SourceContact {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pager: Option<String>,
}

impl SourceContact {
    pub fn from_record(record: &SourceRecord) -> Result<Self> {
        Ok(Self {
            name: record.require("contact", "contact_name")?.to_string(),
            alias: record.get("alias").map(str::to_string),
            email: record.get("email").map(str::to_string),
            pager: record.get("pager").map(str::to_string),
        })
    }
}
