use clap::ValueEnum;

use super::Context;
use crate::error::Result;
use crate::index::{SourceIndex, TargetIndex};
use crate::migrate::{MigrationReport, Migrator, Mode};
use crate::store::SourceSnapshot;

/// Which checkables a migration covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scopes {
    Host,
    Service,
    All,
}

impl Scopes {
    fn hosts(self) -> bool {
        matches!(self, Self::Host | Self::All)
    }

    fn services(self) -> bool {
        matches!(self, Self::Service | Self::All)
    }
}

/// Snapshots and indexes a migration reads, loaded once up front.
pub(super) struct Loaded {
    snapshot: SourceSnapshot,
    source: SourceIndex,
    target: TargetIndex,
}

impl Loaded {
    pub(super) fn new(ctx: &Context, host: Option<&str>) -> Result<Self> {
        let snapshot = ctx.load_source()?;
        let source = ctx.source_index(&snapshot);
        let target = ctx.target_index(host)?;
        Ok(Self {
            snapshot,
            source,
            target,
        })
    }

    pub(super) fn migrator<'a>(&'a self, ctx: &'a Context, mode: Mode) -> Migrator<'a> {
        Migrator {
            source: &self.snapshot,
            source_index: &self.source,
            target_index: &self.target,
            store: ctx.target(),
            correlator: &ctx.correlator,
            settings: &ctx.settings.migration,
            mode,
        }
    }
}

pub fn downtimes(ctx: &Context, scopes: Scopes, host: Option<&str>, mode: Mode) -> Result<()> {
    let loaded = Loaded::new(ctx, host)?;
    let migrator = loaded.migrator(ctx, mode);
    let mut report = MigrationReport::new(mode);
    if scopes.hosts() {
        report.extend(migrator.migrate_host_downtimes(host)?);
    }
    if scopes.services() {
        report.extend(migrator.migrate_service_downtimes(host)?);
    }
    ctx.emit("migrate-downtimes", &report)
}

pub fn acks(ctx: &Context, scopes: Scopes, host: Option<&str>, mode: Mode) -> Result<()> {
    let loaded = Loaded::new(ctx, host)?;
    let migrator = loaded.migrator(ctx, mode);
    let mut report = MigrationReport::new(mode);
    if scopes.hosts() {
        report.extend(migrator.migrate_host_acknowledgements(host)?);
    }
    if scopes.services() {
        report.extend(migrator.migrate_service_acknowledgements(host)?);
    }
    ctx.emit("migrate-acks", &report)
}

/// Host states first: service migration assumes hosts already reached theirs.
pub fn notification_states(ctx: &Context, host: Option<&str>, mode: Mode) -> Result<()> {
    let loaded = Loaded::new(ctx, host)?;
    let migrator = loaded.migrator(ctx, mode);
    let mut report = migrator.migrate_host_notification_states(host)?;
    report.extend(migrator.migrate_service_notification_states(host)?);
    ctx.emit("migrate-notification-states", &report)
}
