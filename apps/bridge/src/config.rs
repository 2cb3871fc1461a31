//! Bridge configuration.
//!
//! A single TOML file, by default `~/.config/hmip-bridge/bridge.toml`.
//! Every field has a default so a partial file loads; [`BridgeConfig::validate`]
//! then reports everything still missing in one error.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hmip_hub_connection::{ReconnectConfig, SessionConfig, TlsPolicy};

/// Errors loading, validating or saving the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("cannot determine config directory (set --config or HOME)")]
    NoConfigDir,
}

/// TLS verification of the hub certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// Hubs use self-signed certificates, so this is off by default.
    pub verify: bool,
    /// PEM CA bundle used when `verify` is on. Without it the system trust
    /// store is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub delay_secs: u64,
    /// Give up after this many consecutive failed attempts. Unset retries
    /// forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_secs: 5,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub listen: String,
    /// Basic auth is enforced when both `username` and `password` are set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            username: None,
            password: None,
        }
    }
}

impl HttpSettings {
    /// Configured credentials, if basic auth is enabled.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Hostname or IP of the hub.
    pub hub_host: String,
    /// Token obtained through `hmip-bridge activate`.
    pub auth_token: String,
    pub plugin_id: String,
    /// Name shown in the hub's plugin list.
    pub friendly_name: String,
    pub log_level: String,
    /// Also log to this file, rotated at midnight with a week of history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Keepalive ping interval; 0 disables pings.
    pub keepalive_secs: u64,
    /// Drop the session when the hub is silent this long. Unset waits
    /// forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
    /// Ask for the full system state after every connect.
    pub request_state_on_connect: bool,
    /// Mirror the latest device snapshot to this JSON file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
    pub tls: TlsSettings,
    pub reconnect: ReconnectSettings,
    pub http: HttpSettings,
}

fn default_friendly_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "HmIP Bridge".into())
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            hub_host: String::new(),
            auth_token: String::new(),
            plugin_id: String::new(),
            friendly_name: default_friendly_name(),
            log_level: "info".into(),
            log_file: None,
            keepalive_secs: 30,
            read_timeout_secs: None,
            request_state_on_connect: true,
            snapshot_path: None,
            tls: TlsSettings::default(),
            reconnect: ReconnectSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

/// What a command needs from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Hub session: host, plugin id and token.
    Session,
    /// Token activation: host and plugin id.
    Activation,
}

impl BridgeConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the configuration with owner-only permissions; it holds the
    /// auth token.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        write_private(path, content.as_bytes()).map_err(io_err)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Checks everything `requirement` needs, reporting all missing fields
    /// at once.
    pub fn validate(&self, requirement: Requirement) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.hub_host.trim().is_empty() {
            missing.push("hub_host");
        }
        if self.plugin_id.trim().is_empty() {
            missing.push("plugin_id");
        }
        if requirement == Requirement::Session && self.auth_token.trim().is_empty() {
            missing.push("auth_token");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        if self.reconnect.delay_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "reconnect.delay_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.reconnect.max_attempts == Some(0) {
            return Err(ConfigError::Invalid {
                field: "reconnect.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.http.username.is_some() != self.http.password.is_some() {
            return Err(ConfigError::Invalid {
                field: "http",
                reason: "username and password must be set together".into(),
            });
        }
        self.http_listen()?;
        Ok(())
    }

    pub fn http_listen(&self) -> Result<SocketAddr, ConfigError> {
        self.http
            .listen
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                field: "http.listen",
                reason: e.to_string(),
            })
    }

    pub fn tls_policy(&self) -> TlsPolicy {
        TlsPolicy::from_settings(self.tls.verify, self.tls.ca_cert_path.clone())
    }

    /// Session parameters for the hub connection.
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::for_hub(
            self.hub_host.trim(),
            self.auth_token.trim(),
            self.plugin_id.trim(),
            self.friendly_name.clone(),
        );
        config.tls = self.tls_policy();
        config.reconnect = ReconnectConfig {
            delay: Duration::from_secs(self.reconnect.delay_secs),
            max_attempts: self.reconnect.max_attempts,
        };
        config.keepalive = (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs));
        config.read_timeout = self.read_timeout_secs.map(Duration::from_secs);
        config
    }
}

/// Writes `content` to a file only the owner can read.
///
/// New files are created with mode 0600; an existing file is narrowed to
/// 0600 before anything is written to it.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content)?;
    file.sync_all()
}

/// `~/.config/hmip-bridge/bridge.toml`, honouring `XDG_CONFIG_HOME`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    config_base_dir()
        .map(|d| d.join("hmip-bridge").join("bridge.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

fn config_base_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> BridgeConfig {
        BridgeConfig {
            hub_host: "192.168.1.20".into(),
            auth_token: "ABCDEF0123".into(),
            plugin_id: "de.example.bridge".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.keepalive_secs, 30);
        assert_eq!(cfg.reconnect.delay_secs, 5);
        assert!(cfg.request_state_on_connect);
        assert!(!cfg.tls.verify);
        assert_eq!(cfg.http.listen, "0.0.0.0:8080");
        assert!(!cfg.friendly_name.is_empty());
    }

    #[test]
    fn validate_lists_every_missing_field() {
        let err = BridgeConfig::default()
            .validate(Requirement::Session)
            .unwrap_err();
        match err {
            ConfigError::Missing(fields) => {
                assert_eq!(fields, vec!["hub_host", "plugin_id", "auth_token"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn activation_does_not_need_token() {
        let mut cfg = complete();
        cfg.auth_token.clear();
        assert!(cfg.validate(Requirement::Activation).is_ok());
        assert!(cfg.validate(Requirement::Session).is_err());
    }

    #[test]
    fn half_configured_basic_auth_is_rejected() {
        let mut cfg = complete();
        cfg.http.username = Some("admin".into());
        assert!(matches!(
            cfg.validate(Requirement::Session),
            Err(ConfigError::Invalid { field: "http", .. })
        ));
        cfg.http.password = Some("secret".into());
        assert!(cfg.validate(Requirement::Session).is_ok());
        assert_eq!(cfg.http.credentials(), Some(("admin", "secret")));
    }

    #[test]
    fn zero_reconnect_delay_is_rejected() {
        let mut cfg = complete();
        cfg.reconnect.delay_secs = 0;
        assert!(matches!(
            cfg.validate(Requirement::Session),
            Err(ConfigError::Invalid {
                field: "reconnect.delay_secs",
                ..
            })
        ));
        cfg.reconnect.delay_secs = 1;
        assert!(cfg.validate(Requirement::Session).is_ok());
    }

    #[test]
    fn log_file_is_optional() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bridge.toml");
        std::fs::write(
            &path,
            "hub_host = \"hcu.local\"\nlog_file = \"/var/log/hmip-bridge/bridge.log\"\n",
        )
        .unwrap();
        let cfg = BridgeConfig::load(&path).unwrap();
        assert_eq!(
            cfg.log_file,
            Some(PathBuf::from("/var/log/hmip-bridge/bridge.log"))
        );
        assert!(BridgeConfig::default().log_file.is_none());
        assert!(!toml::to_string(&BridgeConfig::default()).unwrap().contains("log_file"));
    }

    #[test]
    fn bad_listen_address_is_rejected() {
        let mut cfg = complete();
        cfg.http.listen = "not-an-address".into();
        assert!(matches!(
            cfg.validate(Requirement::Session),
            Err(ConfigError::Invalid {
                field: "http.listen",
                ..
            })
        ));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bridge.toml");
        std::fs::write(
            &path,
            r#"
hub_host = "hcu.local"
plugin_id = "de.example.bridge"
keepalive_secs = 0

[tls]
verify = true
ca_cert_path = "/etc/hmip/ca.pem"

[reconnect]
max_attempts = 3
"#,
        )
        .unwrap();

        let cfg = BridgeConfig::load(&path).unwrap();
        assert_eq!(cfg.hub_host, "hcu.local");
        assert_eq!(cfg.reconnect.delay_secs, 5);
        assert_eq!(cfg.reconnect.max_attempts, Some(3));
        assert_eq!(
            cfg.tls_policy(),
            TlsPolicy::CustomCa(PathBuf::from("/etc/hmip/ca.pem"))
        );

        let session = cfg.session_config();
        assert_eq!(session.url, "wss://hcu.local:9001");
        assert!(session.keepalive.is_none());
        assert_eq!(session.reconnect.max_attempts, Some(3));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = BridgeConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bridge.toml");
        std::fs::write(&path, "hub_host = [").unwrap();
        assert!(matches!(
            BridgeConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("bridge.toml");
        let mut cfg = complete();
        cfg.snapshot_path = Some(tmp.path().join("snapshot.json"));
        cfg.save(&path).unwrap();

        let loaded = BridgeConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[test]
    fn save_narrows_existing_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bridge.toml");
        std::fs::write(&path, "").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        complete().save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(BridgeConfig::load(&path).unwrap(), complete());
    }

    #[test]
    fn save_into_missing_directory_reports_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        assert!(matches!(
            complete().save(&blocker.join("bridge.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
