use tracing::info;

use super::{Context, host_filter};
use crate::compare::{self, ServiceComparison};
use crate::diff::Differ;
use crate::error::Result;
use crate::model::Scope;
use crate::normalize::{HostAttribute, ServiceAttribute};
use crate::store::{ObjectType, Query};

pub fn hosts(ctx: &Context, host: Option<&str>, attributes: &[HostAttribute]) -> Result<()> {
    let snapshot = ctx.load_source()?;
    let source = ctx.source_index(&snapshot);
    let target = ctx.target_index(host)?;
    let attributes = if attributes.is_empty() {
        HostAttribute::DEFAULT
    } else {
        attributes
    };
    let differ = Differ::new(&ctx.normalizer);
    let report = compare::compare_hosts(&source, &target, &differ, attributes, host, &ctx.links());
    info!(
        compared = report.hosts_compared,
        discrepancies = report.discrepancies.len(),
        "host comparison done"
    );
    ctx.emit("compare-hosts", &report)
}

pub fn services(ctx: &Context, host: Option<&str>, attributes: &[ServiceAttribute]) -> Result<()> {
    let attributes = if attributes.is_empty() {
        ServiceAttribute::DEFAULT
    } else {
        attributes
    };
    run_services(ctx, "compare-services", host, attributes)
}

/// Service contacts: the Target side is resolved through notification objects.
pub fn service_contacts(ctx: &Context, host: Option<&str>) -> Result<()> {
    run_services(
        ctx,
        "compare-service-contacts",
        host,
        &[ServiceAttribute::Contacts],
    )
}

fn run_services(
    ctx: &Context,
    command: &str,
    host: Option<&str>,
    attributes: &[ServiceAttribute],
) -> Result<()> {
    let snapshot = ctx.load_source()?;
    let source = ctx.source_index(&snapshot);
    let target = ctx.target_index(host)?;
    let contacts = if attributes.contains(&ServiceAttribute::Contacts) {
        Some(ctx.contact_index(host)?)
    } else {
        None
    };
    let differ = Differ::new(&ctx.normalizer);
    let links = ctx.links();
    let comparison = ServiceComparison {
        correlator: &ctx.correlator,
        differ: &differ,
        attributes,
        contacts: contacts.as_ref(),
        links: &links,
    };
    let report = compare::compare_services(&source, &target, &comparison, host);
    info!(
        paired = report.summary.paired,
        ambiguous = report.summary.ambiguous,
        differences = report.differences,
        incomparable = report.incomparable,
        "service comparison done"
    );
    ctx.emit(command, &report)
}

pub fn duplicates(ctx: &Context, host: Option<&str>) -> Result<()> {
    let snapshot = ctx.load_source()?;
    let source = ctx.source_index(&snapshot);
    let target = ctx.target_index(host)?;
    let report = compare::compare_duplicates(&source, &target, &ctx.correlator, host, &ctx.links());
    ctx.emit("compare-duplicates", &report)
}

pub fn contacts(ctx: &Context) -> Result<()> {
    let snapshot = ctx.load_source()?;
    let contacts = snapshot.list_contacts();
    let users = ctx.contact_index(None)?;
    let report = compare::compare_contacts(&contacts, &users);
    info!(
        compared = report.compared,
        missing = report.missing_in_target.len(),
        "contact comparison done"
    );
    ctx.emit("compare-contacts", &report)
}

pub fn downtimes(ctx: &Context, host: Option<&str>) -> Result<()> {
    let snapshot = ctx.load_source()?;
    let mut source = snapshot.list_downtimes(Scope::Host, host);
    source.extend(snapshot.list_downtimes(Scope::Service, host));
    let target = ctx.target().query(
        &Query::new(ObjectType::Downtime)
            .filter(host_filter(host))
            .joins(&["host.name", "host.address", "service.name"]),
    )?;
    ctx.emit("compare-downtimes", &compare::list_downtimes(source, target))
}

pub fn acks(ctx: &Context, host: Option<&str>) -> Result<()> {
    let snapshot = ctx.load_source()?;
    let mut source = snapshot.list_acknowledgements(Scope::Host, host);
    source.extend(snapshot.list_acknowledgements(Scope::Service, host));
    let target = ctx.target().query(
        &Query::new(ObjectType::Comment)
            .filter(host_filter(host).eq("comment.entry_type", 4))
            .joins(&["host.name", "service.name"]),
    )?;
    ctx.emit("compare-acks", &compare::list_acknowledgements(source, target))
}
