//! Run configuration, loaded from a TOML file.
//!
//! Lookup order: explicit `--config`, then `$MONMIG_CONFIG`, then
//! `~/.monmig.toml`. A missing default file yields the built-in defaults; a
//! missing explicit file is an error.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{MigrateError, Result};

pub const CONFIG_ENV: &str = "MONMIG_CONFIG";
const DEFAULT_FILE_NAME: &str = ".monmig.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub source: SourceSettings,
    pub target: TargetSettings,
    pub correlation: CorrelationSettings,
    pub compare: CompareSettings,
    pub migration: MigrationSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Directory of JSON record dumps, one file per monitoring source.
    pub snapshot_dir: PathBuf,
    /// Template for operator links to a legacy host; `{host}` is substituted.
    pub link_template: Option<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("~/.cache/monmig/source"),
            link_template: None,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    pub url: Option<String>,
    pub username: String,
    pub password: String,
    /// Extra attempts after the first on transport failures.
    pub retries: u32,
    pub timeout_secs: u64,
    pub verify_tls: bool,
    /// Offline JSON snapshot used instead of the live API.
    pub snapshot: Option<PathBuf>,
    pub link_template: Option<String>,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            url: None,
            username: "root".into(),
            password: String::new(),
            retries: 5,
            timeout_secs: 30,
            verify_tls: false,
            snapshot: None,
            link_template: None,
        }
    }
}

impl fmt::Debug for TargetSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("retries", &self.retries)
            .field("timeout_secs", &self.timeout_secs)
            .field("verify_tls", &self.verify_tls)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckCommandRule {
    pub pattern: String,
    pub name: String,
}

impl CheckCommandRule {
    pub fn defaults() -> Vec<Self> {
        vec![Self {
            pattern: "check_ping_.*".into(),
            name: "ping".into(),
        }]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorrelationSettings {
    /// Target-only service that exists on every host and never correlates.
    pub health_check_service: String,
    pub check_commands: Vec<CheckCommandRule>,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            health_check_service: "nrpe-health".into(),
            check_commands: CheckCommandRule::defaults(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompareSettings {
    /// Target users ignored when comparing service contacts.
    pub contact_excludes: Vec<String>,
    /// Glob restricting which target Notification objects count as contacts.
    pub notification_name_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Appended to every migrated comment so later runs can recognise them.
    pub provenance_suffix: String,
    /// Downtimes whose comment contains any of these are recurring and skipped.
    pub skip_downtime_keywords: Vec<String>,
    /// Note written to targets whose notifications were disabled by migration.
    pub notes_prefix: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            provenance_suffix: " [migrated]".into(),
            skip_downtime_keywords: vec!["daily".into(), "weekly".into()],
            notes_prefix: "Notifications disabled during migration".into(),
        }
    }
}

impl MigrationSettings {
    pub fn tagged(&self, comment: &str) -> String {
        format!("{comment}{}", self.provenance_suffix)
    }

    pub fn is_recurring(&self, comment: &str) -> bool {
        let lower = comment.to_lowercase();
        self.skip_downtime_keywords
            .iter()
            .any(|keyword| lower.contains(&keyword.to_lowercase()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn, error. `RUST_LOG` takes precedence.
    pub level: String,
    /// compact, pretty or json.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "compact".into(),
        }
    }
}

impl Settings {
    /// Resolve the config file location and load it.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV)
            && !path.is_empty()
        {
            return Self::from_file(Path::new(&path));
        }
        match home_dir().map(|home| home.join(DEFAULT_FILE_NAME)) {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                let mut settings = Self::default();
                settings.resolve_paths();
                settings.validate()?;
                Ok(settings)
            }
        }
    }

    /// Runs before logging is set up, so failures carry the path instead.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MigrateError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&raw).map_err(|e| match e {
            MigrateError::Toml(e) => {
                MigrateError::Config(format!("cannot parse {}: {e}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(raw)?;
        settings.resolve_paths();
        settings.validate()?;
        Ok(settings)
    }

    /// Expand a leading `~` in every configured path.
    pub fn resolve_paths(&mut self) {
        self.source.snapshot_dir = expand_home(&self.source.snapshot_dir);
        self.target.snapshot = self.target.snapshot.as_deref().map(expand_home);
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.target.url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(MigrateError::Config(format!(
                "target.url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.target.timeout_secs == 0 {
            return Err(MigrateError::Config(
                "target.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.correlation.health_check_service.is_empty() {
            return Err(MigrateError::Config(
                "correlation.health_check_service must not be empty".into(),
            ));
        }
        if self.migration.provenance_suffix.trim().is_empty() {
            return Err(MigrateError::Config(
                "migration.provenance_suffix must not be empty".into(),
            ));
        }
        for rule in &self.correlation.check_commands {
            regex::Regex::new(&rule.pattern)?;
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(MigrateError::Config(format!(
                "logging.level '{}' is not a valid filter",
                self.logging.level
            )));
        }
        if !matches!(self.logging.format.as_str(), "compact" | "pretty" | "json") {
            return Err(MigrateError::Config(format!(
                "logging.format must be compact, pretty or json, got '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
