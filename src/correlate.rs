//! Pairing Source services with Target services on the same host.
//!
//! The two systems share no service identifiers, so pairing keys on the
//! extracted check command, with the target's `vars.comment` alias as a
//! secondary key. Anything that cannot be paired unambiguously is reported,
//! never guessed.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::normalize::{SourceService, TargetService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    Command,
    Alias,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityReason {
    /// Several Source services on the host extract to the same command.
    DuplicateSourceCommand,
    /// Several Target services match the Source service.
    DuplicateTargetCommand,
    /// The command and the alias point at different Target services.
    AliasDisagreement,
    /// The only candidate is also the only candidate of another Source service.
    SharedTarget,
}

impl std::fmt::Display for AmbiguityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::DuplicateSourceCommand => "duplicate_source_command",
            Self::DuplicateTargetCommand => "duplicate_target_command",
            Self::AliasDisagreement => "alias_disagreement",
            Self::SharedTarget => "shared_target",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Correlation<'a> {
    Pair {
        source: &'a SourceService,
        target: &'a TargetService,
        basis: MatchBasis,
    },
    Ambiguous {
        source: &'a SourceService,
        candidates: Vec<&'a TargetService>,
        reason: AmbiguityReason,
    },
    MissingInTarget {
        source: &'a SourceService,
    },
    MissingInSource {
        target: &'a TargetService,
    },
}

impl<'a> Correlation<'a> {
    pub fn source(&self) -> Option<&'a SourceService> {
        match self {
            Self::Pair { source, .. }
            | Self::Ambiguous { source, .. }
            | Self::MissingInTarget { source } => Some(*source),
            Self::MissingInSource { .. } => None,
        }
    }
}

/// Counts per classification, for report summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationSummary {
    pub paired: usize,
    pub ambiguous: usize,
    pub missing_in_target: usize,
    pub missing_in_source: usize,
}

impl CorrelationSummary {
    pub fn of(correlations: &[Correlation<'_>]) -> Self {
        let mut summary = Self::default();
        for c in correlations {
            match c {
                Correlation::Pair { .. } => summary.paired += 1,
                Correlation::Ambiguous { .. } => summary.ambiguous += 1,
                Correlation::MissingInTarget { .. } => summary.missing_in_target += 1,
                Correlation::MissingInSource { .. } => summary.missing_in_source += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone)]
pub struct Correlator {
    health_check_service: String,
}

impl Correlator {
    pub fn new(health_check_service: impl Into<String>) -> Self {
        Self {
            health_check_service: health_check_service.into(),
        }
    }

    /// Classify every service of one host.
    ///
    /// Each Source service yields exactly one entry, in input order. Target
    /// services that no Source service names follow as `MissingInSource`.
    /// The health check service never takes part.
    pub fn correlate<'a>(
        &self,
        source: &'a [SourceService],
        target: &'a [TargetService],
    ) -> Vec<Correlation<'a>> {
        let target: Vec<&TargetService> = target
            .iter()
            .filter(|t| t.name != self.health_check_service)
            .collect();

        let mut per_command: HashMap<&str, usize> = HashMap::new();
        for s in source {
            *per_command.entry(s.extracted.as_str()).or_default() += 1;
        }

        let mut claimed: HashSet<usize> = HashSet::new();
        let mut sole_claims: HashMap<usize, usize> = HashMap::new();
        let mut out = Vec::with_capacity(source.len() + target.len());

        for s in source {
            let by_command: Vec<usize> = (0..target.len())
                .filter(|&i| target[i].extracted == s.extracted)
                .collect();
            let by_alias: Vec<usize> = (0..target.len())
                .filter(|&i| {
                    target[i]
                        .alias
                        .as_deref()
                        .is_some_and(|alias| alias == s.check_command || alias == s.extracted)
                })
                .collect();
            let mut candidates: Vec<usize> = by_command.iter().chain(&by_alias).copied().collect();
            candidates.sort_unstable();
            candidates.dedup();
            claimed.extend(&candidates);

            let listed = || candidates.iter().map(|&i| target[i]).collect::<Vec<_>>();

            if per_command[s.extracted.as_str()] > 1 {
                out.push(Correlation::Ambiguous {
                    source: s,
                    candidates: listed(),
                    reason: AmbiguityReason::DuplicateSourceCommand,
                });
                continue;
            }

            match candidates.as_slice() {
                [] => out.push(Correlation::MissingInTarget { source: s }),
                [only] => {
                    let basis = match (by_command.contains(only), by_alias.contains(only)) {
                        (true, true) => MatchBasis::Both,
                        (false, true) => MatchBasis::Alias,
                        _ => MatchBasis::Command,
                    };
                    *sole_claims.entry(*only).or_default() += 1;
                    out.push(Correlation::Pair {
                        source: s,
                        target: target[*only],
                        basis,
                    });
                }
                _ => {
                    let disjoint = !by_command.is_empty()
                        && !by_alias.is_empty()
                        && by_command.len() == 1
                        && by_command.iter().all(|i| !by_alias.contains(i));
                    out.push(Correlation::Ambiguous {
                        source: s,
                        candidates: listed(),
                        reason: if disjoint {
                            AmbiguityReason::AliasDisagreement
                        } else {
                            AmbiguityReason::DuplicateTargetCommand
                        },
                    });
                }
            }
        }

        // A target can be the sole match of only one Source service.
        for entry in out.iter_mut() {
            if let Correlation::Pair { source, target: t, .. } = *entry {
                let index = target
                    .iter()
                    .position(|candidate| std::ptr::eq(*candidate, t));
                if index.is_some_and(|i| sole_claims.get(&i).copied().unwrap_or(0) > 1) {
                    *entry = Correlation::Ambiguous {
                        source,
                        candidates: vec![t],
                        reason: AmbiguityReason::SharedTarget,
                    };
                }
            }
        }

        out.extend(
            target
                .iter()
                .enumerate()
                .filter(|(i, _)| !claimed.contains(i))
                .map(|(_, t)| Correlation::MissingInSource { target: t }),
        );
        out
    }

    /// The correlation entry for one Source service, if it is on this host.
    pub fn resolve<'c, 'a>(
        correlations: &'c [Correlation<'a>],
        source: &SourceService,
    ) -> Option<&'c Correlation<'a>> {
        correlations
            .iter()
            .find(|c| c.source().is_some_and(|s| std::ptr::eq(s, source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourceRecord, TargetRecord, kinds};
    use crate::normalize::Normalizer;
    use serde_json::json;

    fn src(description: &str, command: &str) -> SourceService {
        let record = SourceRecord::new(kinds::SERVICE)
            .with("host_name", "web1")
            .with("service_description", description)
            .with("check_command", command);
        Normalizer::default().source_service(&record).unwrap()
    }

    fn tgt(name: &str, command: &str, alias: Option<&str>) -> TargetService {
        let mut attrs = json!({"host_name": "web1", "name": name, "check_command": command});
        if let Some(alias) = alias {
            attrs["vars"] = json!({"comment": alias});
        }
        let record = TargetRecord::new("Service", &format!("web1!{name}"), attrs);
        Normalizer::default().target_service(&record).unwrap()
    }

    fn correlator() -> Correlator {
        Correlator::new("nrpe-health")
    }

    #[test]
    fn pairs_on_extracted_command_and_skips_health_check() {
        let source = vec![src("PING", "check_ping_4!100.0,20%!500.0,60%")];
        let target = vec![tgt("ping", "ping", None), tgt("nrpe-health", "nrpe", None)];

        let result = correlator().correlate(&source, &target);
        assert_eq!(result.len(), 1);
        assert!(matches!(
            result[0],
            Correlation::Pair { basis: MatchBasis::Command, .. }
        ));
    }

    #[test]
    fn duplicate_source_commands_are_ambiguous() {
        let source = vec![src("x one", "x!1"), src("x two", "x!2")];
        let target = vec![tgt("x", "x", None)];

        let result = correlator().correlate(&source, &target);
        assert_eq!(result.len(), 2);
        for entry in &result {
            match entry {
                Correlation::Ambiguous {
                    reason, candidates, ..
                } => {
                    assert_eq!(*reason, AmbiguityReason::DuplicateSourceCommand);
                    assert_eq!(candidates.len(), 1);
                }
                other => panic!("expected ambiguous, got {other:?}"),
            }
        }
    }

    #[test]
    fn duplicate_target_commands_are_ambiguous() {
        let source = vec![src("load", "check_load")];
        let target = vec![
            tgt("load-a", "check_load", None),
            tgt("load-b", "check_load", None),
        ];

        let result = correlator().correlate(&source, &target);
        assert_eq!(result.len(), 1);
        assert!(matches!(
            &result[0],
            Correlation::Ambiguous { reason: AmbiguityReason::DuplicateTargetCommand, candidates, .. }
                if candidates.len() == 2
        ));
    }

    #[test]
    fn alias_matches_raw_or_extracted_command() {
        let source = vec![
            src("disk", "check_nrpe_disk!/var"),
            src("mail", "check_smtp"),
        ];
        let target = vec![
            tgt("disk", "disk", Some("check_nrpe_disk!/var")),
            tgt("smtp", "smtp", Some("check_smtp")),
        ];

        let result = correlator().correlate(&source, &target);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|c| matches!(
            c,
            Correlation::Pair { basis: MatchBasis::Alias, .. }
        )));
    }

    #[test]
    fn alias_disagreement_is_reported() {
        let source = vec![src("load", "check_load")];
        let target = vec![
            tgt("load", "check_load", None),
            tgt("legacy-load", "load", Some("check_load")),
        ];

        let result = correlator().correlate(&source, &target);
        assert!(matches!(
            &result[0],
            Correlation::Ambiguous { reason: AmbiguityReason::AliasDisagreement, .. }
        ));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn shared_sole_target_is_ambiguous() {
        let source = vec![src("a", "check_a"), src("b", "check_b")];
        let target = vec![tgt("ab", "check_a", Some("check_b"))];

        let result = correlator().correlate(&source, &target);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|c| matches!(
            c,
            Correlation::Ambiguous { reason: AmbiguityReason::SharedTarget, .. }
        )));
    }

    #[test]
    fn missing_sets_are_complements() {
        let source = vec![src("PING", "check_ping_4!1"), src("disk", "check_disk")];
        let target = vec![
            tgt("ping", "ping", None),
            tgt("http", "http", None),
            tgt("nrpe-health", "nrpe", None),
        ];

        let result = correlator().correlate(&source, &target);
        let summary = CorrelationSummary::of(&result);
        assert_eq!(summary.paired, 1);
        assert_eq!(summary.missing_in_target, 1);
        assert_eq!(summary.missing_in_source, 1);
        assert!(matches!(
            result.last(),
            Some(Correlation::MissingInSource { target }) if target.name == "http"
        ));
    }

    #[test]
    fn resolve_finds_entry_by_identity() {
        let source = vec![src("PING", "check_ping_4!1"), src("disk", "check_disk")];
        let target = vec![tgt("ping", "ping", None)];
        let result = correlator().correlate(&source, &target);

        let entry = Correlator::resolve(&result, &source[1]).unwrap();
        assert!(matches!(entry, Correlation::MissingInTarget { .. }));
    }
}
