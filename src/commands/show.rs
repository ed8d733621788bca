use super::Context;
use crate::compare;
use crate::error::Result;

/// Both sides' services per host, keyed by extracted check command.
pub fn services(ctx: &Context, host: Option<&str>) -> Result<()> {
    let snapshot = ctx.load_source()?;
    let source = ctx.source_index(&snapshot);
    let target = ctx.target_index(host)?;
    let dump = compare::dump_services(&source, &target, host)?;
    ctx.emit("show-services", &dump)
}
