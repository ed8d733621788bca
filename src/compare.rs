//! Drift reports between the two systems.
//!
//! Every function here accumulates a complete report; per-entity anomalies
//! become report entries, never errors.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::correlate::{AmbiguityReason, Correlation, CorrelationSummary, Correlator, MatchBasis};
use crate::diff::{AttributeDiff, Differ};
use crate::index::{ContactIndex, SourceIndex, TargetIndex};
use crate::model::{SourceAcknowledgement, SourceContact, SourceDowntime, TargetRecord};
use crate::normalize::{
    HostAttribute, NO_SLA_NOTE, NO_SLA_VAR, ServiceAttribute, SourceService, TargetService,
    is_truthy, normalize_pager,
};
use crate::output::{PrettyReport, format_timestamp, link};

/// Link templates for both systems' web interfaces.
#[derive(Debug, Clone, Default)]
pub struct Links {
    pub source: Option<String>,
    pub target: Option<String>,
}

impl Links {
    fn source(&self, host: &str) -> Option<String> {
        link(self.source.as_deref(), host)
    }

    fn target(&self, host: &str) -> Option<String> {
        link(self.target.as_deref(), host)
    }
}

fn host_selected(filter: Option<&str>, host: &str) -> bool {
    filter.is_none_or(|f| f == host)
}

// ---------------------------------------------------------------------------
// Hosts

#[derive(Debug, Default, Serialize)]
pub struct HostReport {
    pub hosts_compared: usize,
    pub missing_in_target: Vec<String>,
    pub missing_in_source: Vec<String>,
    pub discrepancies: Vec<HostDiscrepancy>,
    pub incomparable: usize,
}

#[derive(Debug, Serialize)]
pub struct HostDiscrepancy {
    pub host: String,
    pub diffs: Vec<AttributeDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_link: Option<String>,
}

pub fn compare_hosts(
    source: &SourceIndex,
    target: &TargetIndex,
    differ: &Differ<'_>,
    attributes: &[HostAttribute],
    host: Option<&str>,
    links: &Links,
) -> HostReport {
    let mut report = HostReport::default();
    for name in source.host_names().filter(|h| host_selected(host, h)) {
        let Some(target_host) = target.host(name) else {
            debug!(host = name, "host missing in target");
            report.missing_in_target.push(name.to_string());
            continue;
        };
        let Some(source_host) = source.host(name) else {
            continue;
        };
        report.hosts_compared += 1;
        let diffs = differ.diff_host(source_host, target_host, attributes);
        report.incomparable += diffs.iter().filter(|d| d.is_incomparable()).count();
        if !diffs.is_empty() {
            report.discrepancies.push(HostDiscrepancy {
                host: name.to_string(),
                diffs,
                source_link: links.source(name),
                target_link: links.target(name),
            });
        }
    }
    report.missing_in_source = target
        .host_names()
        .filter(|h| host_selected(host, h) && source.host(h).is_none())
        .map(str::to_string)
        .collect();
    report
}

impl PrettyReport for HostReport {
    fn write_pretty(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "hosts compared: {}", self.hosts_compared)?;
        for host in &self.missing_in_target {
            writeln!(out, "{} {host}", "missing in target:".red())?;
        }
        for host in &self.missing_in_source {
            writeln!(out, "{} {host}", "missing in source:".yellow())?;
        }
        for discrepancy in &self.discrepancies {
            writeln!(out, "{}", discrepancy.host.bold())?;
            write_diffs(out, &discrepancy.diffs, "  ")?;
        }
        if self.incomparable > 0 {
            writeln!(out, "incomparable attributes: {}", self.incomparable)?;
        }
        Ok(())
    }
}

fn write_diffs(out: &mut String, diffs: &[AttributeDiff], indent: &str) -> std::fmt::Result {
    for diff in diffs {
        match &diff.incomparable {
            Some(reason) => writeln!(
                out,
                "{indent}{}: {} ({reason})",
                diff.attribute,
                "incomparable".yellow()
            )?,
            None => writeln!(
                out,
                "{indent}{}: source {} target {}",
                diff.attribute, diff.source, diff.target
            )?,
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Services

#[derive(Debug, Default, Serialize)]
pub struct ServiceReport {
    pub summary: CorrelationSummary,
    pub differences: usize,
    pub incomparable: usize,
    pub hosts_missing_in_target: Vec<String>,
    pub hosts: Vec<HostServices>,
}

#[derive(Debug, Serialize)]
pub struct HostServices {
    pub host: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_in_target: Vec<ServiceRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_in_source: Vec<ServiceRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ambiguous: Vec<AmbiguousService>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discrepancies: Vec<ServiceDiscrepancy>,
}

impl HostServices {
    fn is_clean(&self) -> bool {
        self.missing_in_target.is_empty()
            && self.missing_in_source.is_empty()
            && self.ambiguous.is_empty()
            && self.discrepancies.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRef {
    pub name: String,
    pub check_command: String,
}

#[derive(Debug, Serialize)]
pub struct AmbiguousService {
    pub description: String,
    pub check_command: String,
    pub extracted: String,
    pub reason: AmbiguityReason,
    pub candidates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServiceDiscrepancy {
    pub service: String,
    pub target_service: String,
    pub check_command: String,
    pub basis: MatchBasis,
    pub diffs: Vec<AttributeDiff>,
}

/// What a service comparison needs besides the two indexes.
pub struct ServiceComparison<'a> {
    pub correlator: &'a Correlator,
    pub differ: &'a Differ<'a>,
    pub attributes: &'a [ServiceAttribute],
    /// Required when `attributes` includes contacts.
    pub contacts: Option<&'a ContactIndex>,
    pub links: &'a Links,
}

pub fn compare_services(
    source: &SourceIndex,
    target: &TargetIndex,
    comparison: &ServiceComparison<'_>,
    host: Option<&str>,
) -> ServiceReport {
    let mut report = ServiceReport::default();
    let hosts: BTreeSet<&str> = source
        .service_host_names()
        .filter(|h| host_selected(host, h))
        .collect();

    for name in hosts {
        let target_services = target.services(name);
        if target.host(name).is_none() && target_services.is_empty() {
            report.hosts_missing_in_target.push(name.to_string());
            continue;
        }
        let correlations = comparison
            .correlator
            .correlate(source.services(name), target_services);
        let summary = CorrelationSummary::of(&correlations);
        report.summary.paired += summary.paired;
        report.summary.ambiguous += summary.ambiguous;
        report.summary.missing_in_target += summary.missing_in_target;
        report.summary.missing_in_source += summary.missing_in_source;

        let mut entry = HostServices {
            host: name.to_string(),
            missing_in_target: Vec::new(),
            missing_in_source: Vec::new(),
            ambiguous: Vec::new(),
            discrepancies: Vec::new(),
        };
        for correlation in &correlations {
            match correlation {
                Correlation::Pair {
                    source: s,
                    target: t,
                    basis,
                } => {
                    let contacts = comparison.contacts.map(|c| c.recipients(&t.full_name));
                    let diffs = comparison.differ.diff_service(
                        s,
                        source.service_status(s),
                        t,
                        contacts.as_deref(),
                        comparison.attributes,
                    );
                    report.incomparable += diffs.iter().filter(|d| d.is_incomparable()).count();
                    report.differences += diffs.iter().filter(|d| !d.is_incomparable()).count();
                    if !diffs.is_empty() {
                        entry.discrepancies.push(ServiceDiscrepancy {
                            service: s.description.clone(),
                            target_service: t.name.clone(),
                            check_command: s.extracted.clone(),
                            basis: *basis,
                            diffs,
                        });
                    }
                }
                Correlation::Ambiguous {
                    source: s,
                    candidates,
                    reason,
                } => {
                    warn!(host = name, service = %s.description, %reason, "ambiguous service correlation");
                    entry.ambiguous.push(AmbiguousService {
                        description: s.description.clone(),
                        check_command: s.check_command.clone(),
                        extracted: s.extracted.clone(),
                        reason: *reason,
                        candidates: candidates.iter().map(|c| c.name.clone()).collect(),
                        source_link: comparison.links.source(name),
                        target_link: comparison.links.target(name),
                    });
                }
                Correlation::MissingInTarget { source: s } => {
                    entry.missing_in_target.push(ServiceRef {
                        name: s.description.clone(),
                        check_command: s.extracted.clone(),
                    })
                }
                Correlation::MissingInSource { target: t } => {
                    entry.missing_in_source.push(ServiceRef {
                        name: t.name.clone(),
                        check_command: t.extracted.clone(),
                    })
                }
            }
        }
        if !entry.is_clean() {
            report.hosts.push(entry);
        }
    }
    report
}

impl PrettyReport for ServiceReport {
    fn write_pretty(&self, out: &mut String) -> std::fmt::Result {
        writeln!(
            out,
            "paired {} | ambiguous {} | missing in target {} | missing in source {} | differences {} | incomparable {}",
            self.summary.paired,
            self.summary.ambiguous,
            self.summary.missing_in_target,
            self.summary.missing_in_source,
            self.differences,
            self.incomparable
        )?;
        for host in &self.hosts_missing_in_target {
            writeln!(out, "{} {host}", "host missing in target:".red())?;
        }
        for host in &self.hosts {
            writeln!(out, "{}", host.host.bold())?;
            for s in &host.missing_in_target {
                writeln!(out, "  {} {} ({})", "missing in target:".red(), s.name, s.check_command)?;
            }
            for s in &host.missing_in_source {
                writeln!(out, "  {} {} ({})", "missing in source:".yellow(), s.name, s.check_command)?;
            }
            for a in &host.ambiguous {
                writeln!(
                    out,
                    "  {} {} ({}) [{}] candidates: {}",
                    "ambiguous:".magenta(),
                    a.description,
                    a.extracted,
                    a.reason,
                    a.candidates.join(", ")
                )?;
            }
            for d in &host.discrepancies {
                writeln!(out, "  {} - {} -> {}", d.check_command, d.service, d.target_service)?;
                write_diffs(out, &d.diffs, "    ")?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Duplicates needing manual resolution

#[derive(Debug, Default, Serialize)]
pub struct DuplicateReport {
    pub hosts: Vec<DuplicateHost>,
}

#[derive(Debug, Serialize)]
pub struct DuplicateHost {
    pub host: String,
    pub commands: Vec<String>,
    pub source: Vec<DuplicateSource>,
    pub target: Vec<DuplicateTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DuplicateSource {
    pub description: String,
    pub check_command: String,
    pub no_sla: bool,
}

#[derive(Debug, Serialize)]
pub struct DuplicateTarget {
    pub name: String,
    pub display_name: Option<String>,
    pub check_command: String,
    pub no_sla: bool,
}

pub fn compare_duplicates(
    source: &SourceIndex,
    target: &TargetIndex,
    correlator: &Correlator,
    host: Option<&str>,
    links: &Links,
) -> DuplicateReport {
    let mut report = DuplicateReport::default();
    let hosts: BTreeSet<&str> = source
        .service_host_names()
        .filter(|h| host_selected(host, h))
        .collect();
    for name in hosts {
        let correlations = correlator.correlate(source.services(name), target.services(name));
        let mut sources: Vec<&SourceService> = Vec::new();
        let mut targets: Vec<&TargetService> = Vec::new();
        for correlation in &correlations {
            if let Correlation::Ambiguous {
                source: s,
                candidates,
                ..
            } = correlation
            {
                sources.push(*s);
                for candidate in candidates {
                    if !targets.iter().any(|t| std::ptr::eq(*t, *candidate)) {
                        targets.push(*candidate);
                    }
                }
            }
        }
        if sources.is_empty() {
            continue;
        }
        let commands: BTreeSet<String> = sources.iter().map(|s| s.extracted.clone()).collect();
        report.hosts.push(DuplicateHost {
            host: name.to_string(),
            commands: commands.into_iter().collect(),
            source: sources
                .iter()
                .map(|s| DuplicateSource {
                    description: s.description.clone(),
                    check_command: s.check_command.clone(),
                    no_sla: s.record.get("notes") == Some(NO_SLA_NOTE),
                })
                .collect(),
            target: targets
                .iter()
                .map(|t| DuplicateTarget {
                    name: t.name.clone(),
                    display_name: t.record.attr_str("display_name").map(str::to_string),
                    check_command: t.extracted.clone(),
                    no_sla: t.record.attr(&["vars", NO_SLA_VAR]).is_some_and(is_truthy),
                })
                .collect(),
            source_link: links.source(name),
            target_link: links.target(name),
        });
    }
    report
}

impl PrettyReport for DuplicateReport {
    fn write_pretty(&self, out: &mut String) -> std::fmt::Result {
        for host in &self.hosts {
            writeln!(
                out,
                "\n{}: found {} services: [{}]",
                host.host.bold(),
                host.commands.len(),
                host.commands.join(",")
            )?;
            writeln!(out, "Source{}", fmt_link(&host.source_link))?;
            for s in &host.source {
                writeln!(
                    out,
                    "\tcheck command: {}; no-sla: {}; description: {}",
                    s.check_command, s.no_sla, s.description
                )?;
            }
            writeln!(out, "Target{}", fmt_link(&host.target_link))?;
            for t in &host.target {
                writeln!(
                    out,
                    "\textracted check command: {}; no-sla: {}; display name: {}",
                    t.check_command,
                    t.no_sla,
                    t.display_name.as_deref().unwrap_or(&t.name)
                )?;
            }
        }
        Ok(())
    }
}

fn fmt_link(link: &Option<String>) -> String {
    link.as_deref()
        .map(|l| format!(" - link: {l}"))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Contacts

#[derive(Debug, Default, Serialize)]
pub struct ContactReport {
    pub compared: usize,
    pub missing_in_target: Vec<SourceContact>,
    pub wrong_pager: Vec<ContactMismatch>,
    pub wrong_email: Vec<ContactMismatch>,
}

#[derive(Debug, Serialize)]
pub struct ContactMismatch {
    pub name: String,
    pub source: Value,
    pub target: Value,
}

/// Compare contact definitions with target users of the same name.
///
/// Pagers compare after stripping a leading "00"; email only when the
/// source has one.
pub fn compare_contacts(contacts: &[SourceContact], users: &ContactIndex) -> ContactReport {
    let mut report = ContactReport::default();
    for contact in contacts {
        let Some(user) = users.user(&contact.name) else {
            report.missing_in_target.push(contact.clone());
            continue;
        };
        report.compared += 1;
        if let Some(pager) = &contact.pager {
            let source_pager = normalize_pager(pager);
            let target_pager = user.attr_str("pager");
            if target_pager != Some(source_pager.as_str()) {
                report.wrong_pager.push(ContactMismatch {
                    name: contact.name.clone(),
                    source: Value::String(source_pager),
                    target: user.raw(&["pager"]),
                });
            }
        }
        if let Some(email) = &contact.email
            && user.attr_str("email") != Some(email.as_str())
        {
            report.wrong_email.push(ContactMismatch {
                name: contact.name.clone(),
                source: Value::String(email.clone()),
                target: user.raw(&["email"]),
            });
        }
    }
    report
}

impl PrettyReport for ContactReport {
    fn write_pretty(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "contacts compared: {}", self.compared)?;
        for c in &self.missing_in_target {
            writeln!(
                out,
                "{} alias:'{}', contact_name:'{}', email:'{}'",
                "contact missing in target:".red(),
                c.alias.as_deref().unwrap_or_default(),
                c.name,
                c.email.as_deref().unwrap_or_default()
            )?;
        }
        for m in &self.wrong_pager {
            writeln!(out, "wrong pager for {}: source {}, target {}", m.name, m.source, m.target)?;
        }
        for m in &self.wrong_email {
            writeln!(out, "wrong email for {}: source {}, target {}", m.name, m.source, m.target)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Side-by-side listings of downtimes and acknowledgements

#[derive(Debug, Default, Serialize)]
pub struct ListingReport<S: Serialize> {
    pub hosts: Vec<HostListing<S>>,
}

#[derive(Debug, Serialize)]
pub struct HostListing<S: Serialize> {
    pub host: String,
    pub source: Vec<S>,
    pub target: Vec<TargetRecord>,
}

fn side_by_side<S: Serialize>(
    source: Vec<S>,
    source_host: impl Fn(&S) -> &str,
    target: Vec<TargetRecord>,
) -> ListingReport<S> {
    let hosts: BTreeSet<String> = source
        .iter()
        .map(|s| source_host(s).to_string())
        .chain(target.iter().filter_map(|t| t.host_name().map(str::to_string)))
        .collect();
    let mut source = source;
    let mut target = target;
    let mut report = ListingReport { hosts: Vec::new() };
    for host in hosts {
        let (mine, rest): (Vec<S>, Vec<S>) = source.into_iter().partition(|s| source_host(s) == host);
        source = rest;
        let (theirs, rest): (Vec<TargetRecord>, Vec<TargetRecord>) = target
            .into_iter()
            .partition(|t| t.host_name() == Some(host.as_str()));
        target = rest;
        report.hosts.push(HostListing {
            host,
            source: mine,
            target: theirs,
        });
    }
    report
}

pub type DowntimeListing = ListingReport<SourceDowntime>;
pub type AcknowledgementListing = ListingReport<SourceAcknowledgement>;

/// Downtimes of both systems per host, ordered by start time.
pub fn list_downtimes(mut source: Vec<SourceDowntime>, mut target: Vec<TargetRecord>) -> DowntimeListing {
    source.sort_by_key(|d| d.start_time);
    target.sort_by(|a, b| {
        let key = |r: &TargetRecord| r.attr(&["start_time"]).and_then(Value::as_f64).unwrap_or(0.0);
        key(a).total_cmp(&key(b))
    });
    side_by_side(source, |d| d.host_name.as_str(), target)
}

pub fn list_acknowledgements(
    source: Vec<SourceAcknowledgement>,
    target: Vec<TargetRecord>,
) -> AcknowledgementListing {
    side_by_side(source, |a| a.host_name.as_str(), target)
}

impl PrettyReport for DowntimeListing {
    fn write_pretty(&self, out: &mut String) -> std::fmt::Result {
        for host in &self.hosts {
            writeln!(out, "{}", host.host.bold())?;
            if !host.source.is_empty() {
                writeln!(out, "Source:")?;
                for d in &host.source {
                    writeln!(
                        out,
                        "Comment: {}, Start: {}, End: {}",
                        d.comment,
                        format_timestamp(d.start_time),
                        format_timestamp(d.end_time)
                    )?;
                }
            }
            if !host.target.is_empty() {
                writeln!(out, "Target:")?;
                for d in &host.target {
                    let ts = |key: &str| {
                        d.attr(&[key])
                            .and_then(Value::as_f64)
                            .map(|v| format_timestamp(v as i64))
                            .unwrap_or_default()
                    };
                    writeln!(
                        out,
                        "Comment: {}, Start: {}, End: {}",
                        d.attr_str("comment").unwrap_or_default(),
                        ts("start_time"),
                        ts("end_time")
                    )?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

impl PrettyReport for AcknowledgementListing {
    fn write_pretty(&self, out: &mut String) -> std::fmt::Result {
        for host in &self.hosts {
            writeln!(out, "{}", host.host.bold())?;
            if !host.source.is_empty() {
                writeln!(out, "Source:")?;
                for a in &host.source {
                    let scope = a.service_description.as_deref().unwrap_or("(host)");
                    writeln!(out, "  {scope}: {} - {}", a.author, a.comment)?;
                }
            }
            if !host.target.is_empty() {
                writeln!(out, "Target:")?;
                for a in &host.target {
                    let scope = a
                        .attr_str("service_name")
                        .filter(|s| !s.is_empty())
                        .unwrap_or("(host)");
                    writeln!(
                        out,
                        "  {scope}: {} - {}",
                        a.attr_str("author").unwrap_or_default(),
                        a.attr_str("text").unwrap_or_default()
                    )?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Raw service dump

#[derive(Debug, Default, Serialize)]
pub struct ServiceDump {
    pub hosts: Vec<HostServiceDump>,
}

#[derive(Debug, Serialize)]
pub struct HostServiceDump {
    pub host: String,
    pub source: Vec<DumpEntry>,
    pub target: Vec<DumpEntry>,
}

#[derive(Debug, Serialize)]
pub struct DumpEntry {
    pub check_command: String,
    pub record: Value,
}

pub fn dump_services(source: &SourceIndex, target: &TargetIndex, host: Option<&str>) -> crate::error::Result<ServiceDump> {
    let hosts: BTreeSet<&str> = source
        .service_host_names()
        .filter(|h| host_selected(host, h))
        .collect();
    let mut dump = ServiceDump::default();
    for name in hosts {
        let source_entries = source
            .services(name)
            .iter()
            .map(|s| {
                Ok(DumpEntry {
                    check_command: s.extracted.clone(),
                    record: serde_json::to_value(&s.record)?,
                })
            })
            .collect::<crate::error::Result<Vec<_>>>()?;
        let target_entries = target
            .services(name)
            .iter()
            .map(|t| {
                Ok(DumpEntry {
                    check_command: t.extracted.clone(),
                    record: serde_json::to_value(&t.record)?,
                })
            })
            .collect::<crate::error::Result<Vec<_>>>()?;
        dump.hosts.push(HostServiceDump {
            host: name.to_string(),
            source: source_entries,
            target: target_entries,
        });
    }
    Ok(dump)
}

impl PrettyReport for ServiceDump {
    fn write_pretty(&self, out: &mut String) -> std::fmt::Result {
        for host in &self.hosts {
            writeln!(out, "{}", host.host)?;
            for (label, entries) in [("Source", &host.source), ("Target", &host.target)] {
                writeln!(out, "  {label}:")?;
                for entry in entries {
                    writeln!(out, "    {}:", entry.check_command)?;
                    let yaml = serde_yaml::to_string(&entry.record).unwrap_or_default();
                    for line in yaml.lines() {
                        writeln!(out, "      {line}")?;
                    }
                }
            }
        }
        Ok(())
    }
}
