use tracing::info;

use super::Context;
use super::migrate::Loaded;
use crate::error::Result;
use crate::migrate::Mode;

/// Remove downtimes an earlier migration created.
pub fn clean_migrated_downtimes(ctx: &Context, mode: Mode) -> Result<()> {
    let loaded = Loaded::new(ctx, None)?;
    let report = loaded.migrator(ctx, mode).clean_migrated_downtimes()?;
    info!(removed = report.summary.removed, planned = report.summary.planned, "clean done");
    ctx.emit("clean-migrated-downtimes", &report)
}

pub fn set_active_checks(
    ctx: &Context,
    host: &str,
    enable: bool,
    comment: &str,
    author: &str,
    mode: Mode,
) -> Result<()> {
    let loaded = Loaded::new(ctx, Some(host))?;
    let report = loaded
        .migrator(ctx, mode)
        .set_active_checks(host, enable, comment, author)?;
    ctx.emit("set-active-checks", &report)
}
