use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::model::{
    ACKNOWLEDGEMENT_ENTRY_TYPE, Scope, SourceAcknowledgement, SourceContact, SourceDowntime,
    SourceRecord, kinds,
};

/// Read-only view over a dump of the legacy system's records.
///
/// Each `*.json` file in the snapshot directory holds an array of flat
/// records from one monitoring source. Records without a
/// `monitoring_source` field inherit the file's stem.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    origin: String,
    records: Vec<SourceRecord>,
}

impl SourceSnapshot {
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let origin = dir.display().to_string();
        if !dir.is_dir() {
            return Err(MigrateError::EmptySource(origin));
        }

        let mut files: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let mut records = Vec::new();
        for path in &files {
            let monitoring_source = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let raw = fs::read_to_string(path)?;
            let batch: Vec<SourceRecord> = serde_json::from_str(&raw)?;
            debug!(file = %path.display(), records = batch.len(), "loaded source dump");
            records.extend(batch.into_iter().map(|mut record| {
                if record.monitoring_source().is_none() {
                    record.set("monitoring_source", Some(&monitoring_source));
                }
                record
            }));
        }

        info!(dir = %origin, files = files.len(), records = records.len(), "source snapshot loaded");
        Self::from_records(origin, records)
    }

    pub fn from_records(origin: impl Into<String>, records: Vec<SourceRecord>) -> Result<Self> {
        let origin = origin.into();
        if records.is_empty() {
            return Err(MigrateError::EmptySource(origin));
        }
        Ok(Self { origin, records })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    fn of_type<'a, 'f>(
        &'a self,
        object_type: &'static str,
        filter: &'f [(&'f str, &'f str)],
    ) -> impl Iterator<Item = &'a SourceRecord> + use<'a, 'f> {
        self.records.iter().filter(move |record| {
            record.object_type() == Some(object_type)
                && filter.iter().all(|(key, value)| record.get(key) == Some(*value))
        })
    }

    /// Hosts whose fields equal every `(key, value)` pair in `filter`.
    pub fn list_hosts(&self, filter: &[(&str, &str)]) -> Vec<&SourceRecord> {
        self.of_type(kinds::HOST, filter).collect()
    }

    pub fn list_services(&self, filter: &[(&str, &str)]) -> Vec<&SourceRecord> {
        self.of_type(kinds::SERVICE, filter).collect()
    }

    pub fn host_statuses(&self, filter: &[(&str, &str)]) -> Vec<&SourceRecord> {
        self.of_type(kinds::HOST_STATUS, filter).collect()
    }

    pub fn service_statuses(&self, filter: &[(&str, &str)]) -> Vec<&SourceRecord> {
        self.of_type(kinds::SERVICE_STATUS, filter).collect()
    }

    /// Downtimes of the given scope. Malformed records are logged and skipped.
    pub fn list_downtimes(&self, scope: Scope, host: Option<&str>) -> Vec<SourceDowntime> {
        let object_type = match scope {
            Scope::Host => kinds::HOST_DOWNTIME,
            Scope::Service => kinds::SERVICE_DOWNTIME,
        };
        self.of_type(object_type, &[])
            .filter(|record| host.is_none_or(|h| record.host_name() == Some(h)))
            .filter_map(|record| match SourceDowntime::from_record(record) {
                Ok(downtime) => Some(downtime),
                Err(e) => {
                    warn!(error = %e, host = ?record.host_name(), "skipping malformed downtime");
                    None
                }
            })
            .collect()
    }

    /// Acknowledgement comments of the given scope; plain comments are ignored.
    pub fn list_acknowledgements(
        &self,
        scope: Scope,
        host: Option<&str>,
    ) -> Vec<SourceAcknowledgement> {
        let object_type = match scope {
            Scope::Host => kinds::HOST_COMMENT,
            Scope::Service => kinds::SERVICE_COMMENT,
        };
        self.of_type(object_type, &[("entry_type", ACKNOWLEDGEMENT_ENTRY_TYPE)])
            .filter(|record| host.is_none_or(|h| record.host_name() == Some(h)))
            .filter_map(|record| match SourceAcknowledgement::from_record(record) {
                Ok(ack) => Some(ack),
                Err(e) => {
                    warn!(error = %e, host = ?record.host_name(), "skipping malformed acknowledgement");
                    None
                }
            })
            .collect()
    }

    /// Contacts across all monitoring sources, deduplicated.
    pub fn list_contacts(&self) -> Vec<SourceContact> {
        let contacts: BTreeSet<SourceContact> = self
            .of_type(kinds::CONTACT, &[])
            .filter_map(|record| match SourceContact::from_record(record) {
                Ok(contact) => Some(contact),
                Err(e) => {
                    warn!(error = %e, "skipping malformed contact");
                    None
                }
            })
            .collect();
        contacts.into_iter().collect()
    }
}
