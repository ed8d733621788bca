use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no source records found in '{0}'")]
    EmptySource(String),

    #[error("invalid {kind} record: missing or malformed '{key}'")]
    InvalidRecord { kind: &'static str, key: String },

    #[error("host '{0}' not found in target")]
    HostNotFound(String),

    #[error("target request failed after {attempts} attempt(s): {message}")]
    StoreExhausted { attempts: u32, message: String },

    #[error("target api returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl MigrateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::EmptySource(_) => "empty_source",
            Self::InvalidRecord { .. } => "invalid_record",
            Self::HostNotFound(_) => "host_not_found",
            Self::StoreExhausted { .. } => "store_exhausted",
            Self::Api { .. } => "api_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Yaml(_) => "yaml_error",
            Self::Toml(_) => "config_parse_error",
            Self::Http(_) => "http_error",
            Self::Pattern(_) => "pattern_error",
        }
    }

    /// Dataset-level failures abort a run before any comparison starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::EmptySource(_) | Self::Toml(_) | Self::Pattern(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_snake_case() {
        let err = MigrateError::StoreExhausted {
            attempts: 6,
            message: "connection reset".into(),
        };
        assert_eq!(err.code(), "store_exhausted");
        assert!(err.to_string().contains("6 attempt(s)"));
    }

    #[test]
    fn empty_source_is_a_configuration_error() {
        assert!(MigrateError::EmptySource("/tmp/x".into()).is_configuration());
        assert!(!MigrateError::HostNotFound("web1".into()).is_configuration());
    }
}
