use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Base URL of the Mastodon instance, e.g. "https://example.social".
    mastodon_instance: String,
    /// Bearer token for the bot account.
    mastodon_token: String,
    /// Meeting URL announced when the horn sounds.
    jitsi_link: String,
    /// Directory for the state file and logs. Defaults to current directory.
    storage_dir: Option<String>,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,
    /// Minimum seconds between horn soundings.
    #[serde(default = "default_horn_window_secs")]
    horn_window_secs: u64,
    #[serde(default)]
    dry_run: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_horn_window_secs() -> u64 {
    1800
}

pub struct Config {
    /// Instance base URL without a trailing slash.
    pub mastodon_instance: String,
    pub mastodon_token: String,
    pub jitsi_link: String,
    /// Directory for state files and logs.
    pub storage_dir: PathBuf,
    pub log_level: String,
    pub poll_interval: Duration,
    pub horn_window: Duration,
    pub dry_run: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        // Validate required fields
        if file.mastodon_instance.is_empty() {
            return Err(ConfigError::Validation("mastodon_instance is required".into()));
        }
        if !file.mastodon_instance.starts_with("http://")
            && !file.mastodon_instance.starts_with("https://")
        {
            return Err(ConfigError::Validation(
                "mastodon_instance must be a base URL (expected https://instance.example)".into(),
            ));
        }
        if file.mastodon_token.is_empty() {
            return Err(ConfigError::Validation("mastodon_token is required".into()));
        }
        if file.jitsi_link.is_empty() {
            return Err(ConfigError::Validation("jitsi_link is required".into()));
        }
        if file.poll_interval_secs == 0 {
            return Err(ConfigError::Validation("poll_interval_secs must be nonzero".into()));
        }

        let mut mastodon_instance = file.mastodon_instance;
        while mastodon_instance.ends_with('/') {
            mastodon_instance.pop();
        }

        let storage_dir = file
            .storage_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            mastodon_instance,
            mastodon_token: file.mastodon_token,
            jitsi_link: file.jitsi_link,
            storage_dir,
            log_level: file.log_level,
            poll_interval: Duration::from_secs(file.poll_interval_secs),
            horn_window: Duration::from_secs(file.horn_window_secs),
            dry_run: file.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config() {
        let file = write_config(
            r#"{
            "mastodon_instance": "https://example.social",
            "mastodon_token": "token123",
            "jitsi_link": "https://meet.example.org/room"
        }"#,
        );
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.mastodon_instance, "https://example.social");
        assert_eq!(config.jitsi_link, "https://meet.example.org/room");
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.horn_window, Duration::from_secs(1800));
        assert_eq!(config.storage_dir, PathBuf::from("."));
        assert!(!config.dry_run);
    }

    #[test]
    fn test_trailing_slash_stripped() {
        let file = write_config(
            r#"{
            "mastodon_instance": "https://example.social/",
            "mastodon_token": "token123",
            "jitsi_link": "https://meet.example.org/room"
        }"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.mastodon_instance, "https://example.social");
    }

    #[test]
    fn test_overrides() {
        let file = write_config(
            r#"{
            "mastodon_instance": "https://example.social",
            "mastodon_token": "token123",
            "jitsi_link": "https://meet.example.org/room",
            "storage_dir": "/var/lib/hornbot",
            "poll_interval_secs": 30,
            "horn_window_secs": 600,
            "dry_run": true
        }"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/hornbot"));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.horn_window, Duration::from_secs(600));
        assert!(config.dry_run);
    }

    #[test]
    fn test_empty_instance() {
        let file = write_config(
            r#"{
            "mastodon_instance": "",
            "mastodon_token": "token123",
            "jitsi_link": "https://meet.example.org/room"
        }"#,
        );
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("mastodon_instance"));
    }

    #[test]
    fn test_instance_must_be_url() {
        let file = write_config(
            r#"{
            "mastodon_instance": "example.social",
            "mastodon_token": "token123",
            "jitsi_link": "https://meet.example.org/room"
        }"#,
        );
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_missing_token_field() {
        let file = write_config(
            r#"{
            "mastodon_instance": "https://example.social",
            "jitsi_link": "https://meet.example.org/room"
        }"#,
        );
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }

    #[test]
    fn test_empty_jitsi_link() {
        let file = write_config(
            r#"{
            "mastodon_instance": "https://example.social",
            "mastodon_token": "token123",
            "jitsi_link": ""
        }"#,
        );
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("jitsi_link"));
    }

    #[test]
    fn test_zero_poll_interval() {
        let file = write_config(
            r#"{
            "mastodon_instance": "https://example.social",
            "mastodon_token": "token123",
            "jitsi_link": "https://meet.example.org/room",
            "poll_interval_secs": 0
        }"#,
        );
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
