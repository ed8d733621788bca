pub mod compare;
pub mod maintenance;
pub mod migrate;
pub mod show;

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::compare::Links;
use crate::config::Settings;
use crate::correlate::Correlator;
use crate::error::Result;
use crate::index::{ContactIndex, SourceIndex, TargetIndex};
use crate::normalize::{CheckCommandMap, Normalizer, glob_regex};
use crate::output::{self, Format, PrettyReport};
use crate::store::{self, Filter, ObjectType, Query, SourceSnapshot, TargetStore};

/// Notification attributes contact resolution reads.
const NOTIFICATION_ATTRS: &[&str] = &["host_name", "service_name", "users", "user_groups"];

/// Per-run state shared by every command.
pub struct Context {
    pub settings: Settings,
    pub normalizer: Normalizer,
    pub correlator: Correlator,
    pub format: Format,
    pub output: Option<PathBuf>,
    target: Box<dyn TargetStore>,
}

impl Context {
    /// Build the run context, opening the configured target.
    pub fn new(settings: Settings, format: Format, output: Option<PathBuf>) -> Result<Self> {
        let target = store::open_target(&settings.target)?;
        Self::with_target(settings, target, format, output)
    }

    pub fn with_target(
        settings: Settings,
        target: Box<dyn TargetStore>,
        format: Format,
        output: Option<PathBuf>,
    ) -> Result<Self> {
        let commands = CheckCommandMap::new(&settings.correlation.check_commands)?;
        let correlator = Correlator::new(settings.correlation.health_check_service.clone());
        Ok(Self {
            settings,
            normalizer: Normalizer::new(commands),
            correlator,
            format,
            output,
            target,
        })
    }

    pub fn target(&self) -> &dyn TargetStore {
        self.target.as_ref()
    }

    /// Load the Source snapshot; an empty one aborts the run.
    pub fn load_source(&self) -> Result<SourceSnapshot> {
        let snapshot = SourceSnapshot::load_dir(&self.settings.source.snapshot_dir)?;
        info!(origin = snapshot.origin(), records = snapshot.records().len(), "source loaded");
        Ok(snapshot)
    }

    pub fn source_index(&self, snapshot: &SourceSnapshot) -> SourceIndex {
        SourceIndex::build(snapshot, &self.normalizer)
    }

    /// Fetch Target hosts and services, optionally for one host only.
    pub fn target_index(&self, host: Option<&str>) -> Result<TargetIndex> {
        let filter = host_filter(host);
        let hosts = self
            .target
            .query(&Query::new(ObjectType::Host).filter(filter.clone()))?;
        let services = self
            .target
            .query(&Query::new(ObjectType::Service).filter(filter))?;
        info!(hosts = hosts.len(), services = services.len(), "target loaded");
        Ok(TargetIndex::build(&hosts, &services, &self.normalizer))
    }

    /// Users and notification recipients as the Target resolves them.
    pub fn contact_index(&self, host: Option<&str>) -> Result<ContactIndex> {
        let users = self.target.query(&Query::new(ObjectType::User))?;
        let notifications = self
            .target
            .query(
                &Query::new(ObjectType::Notification)
                    .filter(host_filter(host))
                    .attrs(NOTIFICATION_ATTRS),
            )?;
        let services = self
            .target
            .query(&Query::new(ObjectType::Service).filter(host_filter(host)))?;
        let name_filter = self
            .settings
            .compare
            .notification_name_filter
            .as_deref()
            .map(glob_regex)
            .transpose()?;
        Ok(ContactIndex::build(
            &users,
            &notifications,
            &services,
            &self.settings.compare.contact_excludes,
            name_filter.as_ref(),
        ))
    }

    pub fn links(&self) -> Links {
        Links {
            source: self.settings.source.link_template.clone(),
            target: self.settings.target.link_template.clone(),
        }
    }

    pub fn emit<T: Serialize + PrettyReport>(&self, command: &str, report: &T) -> Result<()> {
        output::emit(command, report, self.format, self.output.as_deref())
    }
}

fn host_filter(host: Option<&str>) -> Filter {
    match host {
        Some(h) => Filter::new().eq("host.name", h),
        None => Filter::new(),
    }
}
