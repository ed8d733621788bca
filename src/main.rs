use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use monmig::commands::{self, Context, migrate::Scopes};
use monmig::config::Settings;
use monmig::migrate::{DEFAULT_CHECKS_COMMENT, Mode};
use monmig::normalize::{HostAttribute, ServiceAttribute};
use monmig::output::Format;

#[derive(Parser)]
#[command(
    name = "monmig",
    version,
    about = "Compare and migrate monitoring configuration between a legacy and a successor system"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// Config file (default: $MONMIG_CONFIG, then ~/.monmig.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Write the report to this file instead of stdout
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,
    /// Directory of legacy record dumps (overrides source.snapshot_dir)
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,
    /// Offline target object dump (overrides target.snapshot)
    #[arg(long, global = true)]
    target_snapshot: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct RunMode {
    /// Only report what would change (default)
    #[arg(long, conflicts_with = "apply")]
    simulate: bool,
    /// Write changes to the target
    #[arg(long)]
    apply: bool,
}

impl RunMode {
    fn mode(self) -> Mode {
        if self.apply && !self.simulate {
            Mode::Apply
        } else {
            Mode::Simulate
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compare host attributes
    CompareHosts {
        /// Restrict to one host
        #[arg(long)]
        host: Option<String>,
        /// Attributes to compare (comma-separated; default: intervals, attempts, no-SLA)
        #[arg(long, value_enum, value_delimiter = ',')]
        attribute: Vec<HostAttribute>,
    },
    /// Correlate services and compare their attributes
    CompareServices {
        #[arg(long)]
        host: Option<String>,
        /// Attributes to compare (comma-separated; default: notifications, no-SLA, notes URL)
        #[arg(long, value_enum, value_delimiter = ',')]
        attribute: Vec<ServiceAttribute>,
    },
    /// List services that cannot be correlated automatically
    CompareDuplicates {
        #[arg(long)]
        host: Option<String>,
    },
    /// Compare contact email and pager with target users
    CompareContacts,
    /// Compare per-service notification recipients
    CompareServiceContacts {
        #[arg(long)]
        host: Option<String>,
    },
    /// List downtimes of both systems side by side
    CompareDowntimes {
        #[arg(long)]
        host: Option<String>,
    },
    /// List acknowledgements of both systems side by side
    CompareAcks {
        #[arg(long)]
        host: Option<String>,
    },
    /// Dump both systems' services per host
    ShowServices {
        #[arg(long)]
        host: Option<String>,
    },
    /// Replay legacy downtimes onto the target
    MigrateDowntimes {
        #[arg(long)]
        host: Option<String>,
        #[arg(long, value_enum, default_value = "all")]
        scope: Scopes,
        #[command(flatten)]
        run: RunMode,
    },
    /// Replay legacy acknowledgements onto the target
    MigrateAcks {
        #[arg(long)]
        host: Option<String>,
        #[arg(long, value_enum, default_value = "all")]
        scope: Scopes,
        #[command(flatten)]
        run: RunMode,
    },
    /// Carry runtime-disabled notifications over (hosts, then services)
    MigrateNotificationStates {
        #[arg(long)]
        host: Option<String>,
        #[command(flatten)]
        run: RunMode,
    },
    /// Remove every downtime created by a migration run
    CleanMigratedDowntimes {
        #[command(flatten)]
        run: RunMode,
    },
    /// Enable or disable active checks for a target host and its services
    SetActiveChecks {
        /// Target host
        host: String,
        #[arg(long, conflicts_with = "disable", required_unless_present = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Host comment added on disable and removed on enable
        #[arg(long, default_value = DEFAULT_CHECKS_COMMENT)]
        comment: String,
        /// Comment author (default: $USER)
        #[arg(long)]
        author: Option<String>,
        #[command(flatten)]
        run: RunMode,
    },
}

fn run(cli: Cli, format: Format) -> monmig::error::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = cli.source_dir {
        settings.source.snapshot_dir = dir;
    }
    if let Some(path) = cli.target_snapshot {
        settings.target.snapshot = Some(path);
    }
    monmig::telemetry::init(&settings.logging);
    tracing::debug!(config = ?settings, "config loaded");

    let ctx = Context::new(settings, format, cli.output)?;
    match cli.command {
        Commands::CompareHosts { host, attribute } => {
            commands::compare::hosts(&ctx, host.as_deref(), &attribute)
        }
        Commands::CompareServices { host, attribute } => {
            commands::compare::services(&ctx, host.as_deref(), &attribute)
        }
        Commands::CompareDuplicates { host } => commands::compare::duplicates(&ctx, host.as_deref()),
        Commands::CompareContacts => commands::compare::contacts(&ctx),
        Commands::CompareServiceContacts { host } => {
            commands::compare::service_contacts(&ctx, host.as_deref())
        }
        Commands::CompareDowntimes { host } => commands::compare::downtimes(&ctx, host.as_deref()),
        Commands::CompareAcks { host } => commands::compare::acks(&ctx, host.as_deref()),
        Commands::ShowServices { host } => commands::show::services(&ctx, host.as_deref()),
        Commands::MigrateDowntimes { host, scope, run } => {
            commands::migrate::downtimes(&ctx, scope, host.as_deref(), run.mode())
        }
        Commands::MigrateAcks { host, scope, run } => {
            commands::migrate::acks(&ctx, scope, host.as_deref(), run.mode())
        }
        Commands::MigrateNotificationStates { host, run } => {
            commands::migrate::notification_states(&ctx, host.as_deref(), run.mode())
        }
        Commands::CleanMigratedDowntimes { run } => {
            commands::maintenance::clean_migrated_downtimes(&ctx, run.mode())
        }
        Commands::SetActiveChecks {
            host,
            enable,
            disable: _,
            comment,
            author,
            run,
        } => {
            let author = author
                .or_else(|| std::env::var("USER").ok())
                .unwrap_or_else(|| "monmig".into());
            commands::maintenance::set_active_checks(&ctx, &host, enable, &comment, &author, run.mode())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_simulate_by_default() {
        let cli = Cli::try_parse_from(["monmig", "migrate-downtimes"]).unwrap();
        match cli.command {
            Commands::MigrateDowntimes { run, scope, .. } => {
                assert_eq!(run.mode(), Mode::Simulate);
                assert_eq!(scope, Scopes::All);
            }
            _ => panic!("wrong subcommand"),
        }

        let cli = Cli::try_parse_from(["monmig", "migrate-acks", "--apply", "--scope", "host"]).unwrap();
        match cli.command {
            Commands::MigrateAcks { run, scope, .. } => {
                assert_eq!(run.mode(), Mode::Apply);
                assert_eq!(scope, Scopes::Host);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn simulate_and_apply_conflict() {
        assert!(Cli::try_parse_from(["monmig", "clean-migrated-downtimes", "--simulate", "--apply"]).is_err());
    }

    #[test]
    fn active_checks_needs_a_direction() {
        assert!(Cli::try_parse_from(["monmig", "set-active-checks", "web1"]).is_err());
        let cli = Cli::try_parse_from(["monmig", "set-active-checks", "web1", "--disable"]).unwrap();
        assert!(matches!(cli.command, Commands::SetActiveChecks { enable: false, .. }));
    }

    #[test]
    fn attributes_parse_as_list() {
        let cli = Cli::try_parse_from([
            "monmig",
            "compare-hosts",
            "--attribute",
            "check-interval,no-sla",
        ])
        .unwrap();
        match cli.command {
            Commands::CompareHosts { attribute, .. } => {
                assert_eq!(attribute, vec![HostAttribute::CheckInterval, HostAttribute::NoSla]);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
