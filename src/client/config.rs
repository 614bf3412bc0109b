//! Client configuration loading and validation.
//!
//! Reads a YAML file (by default `<config_dir>/wps-client/config.yaml`) and
//! resolves environment variables, so credentials can stay out of the file:
//!
//! ```yaml
//! url: https://pavics.ouranos.ca/twitcher/ows/proxy/raven/wps
//! processes: [hello, wordcounter]
//! progress: true
//! cancel_on_ctrl_c: true
//! credentials:
//!   username: ${WPS_USER}
//!   password: ${WPS_PASSWORD:-}
//! transport:
//!   verify: false
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use super::errors::WpsError;
use super::monitor::Presentation;
use crate::protocol::{HttpOptions, DEFAULT_VERSION};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "WPS_CLIENT_CONFIG";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Basic-auth credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Verify TLS certificates.
    #[serde(default = "default_true")]
    pub verify: bool,
    /// Total request timeout. Synchronous executions hold the request open
    /// for the whole computation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            verify: true,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Everything needed to connect a client to one WPS endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub url: String,
    /// Processes to bind; a single name or a list. `None` binds all.
    #[serde(default, deserialize_with = "one_or_many")]
    pub processes: Option<Vec<String>>,
    #[serde(default = "default_version")]
    pub version: String,
    /// Run processes asynchronously with progress reporting when they
    /// support it.
    #[serde(default)]
    pub progress: bool,
    /// Convert reference-only outputs with the registered converters.
    #[serde(default)]
    pub convert_objects: bool,
    /// Cancel monitored executions on Ctrl-C. Installing the listener takes
    /// over SIGINT for the rest of the process, so it is off by default.
    #[serde(default)]
    pub cancel_on_ctrl_c: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub presentation: Presentation,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_true() -> bool {
    true
}
fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}
fn default_poll_interval_secs() -> u64 {
    3
}
fn default_timeout_secs() -> u64 {
    600
}
fn default_connect_timeout_secs() -> u64 {
    10
}

/// Accept `processes: hello` as well as `processes: [hello, inout]`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => None,
        Some(OneOrMany::One(name)) => Some(vec![name]),
        Some(OneOrMany::Many(names)) => Some(names),
    })
}

impl ClientConfig {
    /// Configuration for `url` with every other setting at its default.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            processes: None,
            version: default_version(),
            progress: false,
            convert_objects: false,
            cancel_on_ctrl_c: false,
            poll_interval_secs: default_poll_interval_secs(),
            presentation: Presentation::default(),
            credentials: None,
            headers: HashMap::new(),
            transport: TransportConfig::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), WpsError> {
        Url::parse(&self.url).map_err(|e| WpsError::Config {
            reason: format!("invalid url '{}': {e}", self.url),
        })?;
        if self.poll_interval_secs == 0 {
            return Err(WpsError::Config {
                reason: "poll_interval_secs must be at least 1".into(),
            });
        }
        if self.transport.timeout_secs == 0 || self.transport.connect_timeout_secs == 0 {
            return Err(WpsError::Config {
                reason: "transport timeouts must be at least 1 second".into(),
            });
        }
        if matches!(&self.processes, Some(names) if names.is_empty()) {
            return Err(WpsError::Config {
                reason: "processes must not be empty; omit it to bind every process".into(),
            });
        }
        Ok(())
    }

    /// Transport options for `HttpWpsService`.
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            username: self.credentials.as_ref().map(|c| c.username.clone()),
            password: self
                .credentials
                .as_ref()
                .and_then(|c| c.password.clone())
                .filter(|p| !p.is_empty()),
            headers: self.headers.clone(),
            verify: self.transport.verify,
            timeout: Duration::from_secs(self.transport.timeout_secs),
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Default config location: `$WPS_CLIENT_CONFIG`, else
/// `<config_dir>/wps-client/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(expand_tilde(&path)));
        }
    }
    dirs::config_dir().map(|dir| dir.join("wps-client").join("config.yaml"))
}

/// Load, interpolate and validate a client configuration file.
///
/// `${VAR}` and `${VAR:-default}` are replaced before parsing.
pub fn load_client_config(path: &Path) -> Result<ClientConfig, WpsError> {
    let raw = std::fs::read_to_string(path).map_err(|e| WpsError::Config {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let config: ClientConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| WpsError::Config {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;

    config.validate()?;
    tracing::debug!(path = %path.display(), url = %config.url, "loaded client config");
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset variables without default are empty.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, contents).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_defaults() {
        let config: ClientConfig = serde_yaml::from_str("url: http://localhost:5000/wps").unwrap();
        assert_eq!(config, ClientConfig::new("http://localhost:5000/wps"));
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert!(config.transport.verify);
        assert!(!config.progress);
        assert!(!config.cancel_on_ctrl_c);
    }

    #[test]
    fn test_cancel_on_ctrl_c_opt_in() {
        let config: ClientConfig =
            serde_yaml::from_str("url: http://x/wps\nprogress: true\ncancel_on_ctrl_c: true").unwrap();
        assert!(config.cancel_on_ctrl_c);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = ClientConfig::new("http://x/wps");
        config.transport.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(WpsError::Config { .. })));

        let mut config = ClientConfig::new("http://x/wps");
        config.transport.connect_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(WpsError::Config { .. })));
    }

    #[test]
    fn test_processes_one_or_many() {
        let one: ClientConfig =
            serde_yaml::from_str("url: http://x/wps\nprocesses: hello").unwrap();
        assert_eq!(one.processes, Some(vec!["hello".to_string()]));
        let many: ClientConfig =
            serde_yaml::from_str("url: http://x/wps\nprocesses: [hello, inout]").unwrap();
        assert_eq!(many.processes.unwrap().len(), 2);
    }

    #[test]
    fn test_load_with_interpolation() {
        std::env::set_var("__TEST_WPS_USER__", "alice");
        std::env::remove_var("__TEST_WPS_PASSWORD__");
        let (_tmp, path) = write_config(
            r#"
url: https://example.org/wps
progress: true
presentation: console
credentials:
  username: ${__TEST_WPS_USER__}
  password: ${__TEST_WPS_PASSWORD__:-}
headers:
  X-Request-Source: tests
transport:
  verify: false
  timeout_secs: 30
"#,
        );
        let config = load_client_config(&path).unwrap();
        std::env::remove_var("__TEST_WPS_USER__");

        assert!(config.progress);
        assert_eq!(config.presentation, Presentation::Console);
        let options = config.http_options();
        assert_eq!(options.username.as_deref(), Some("alice"));
        assert_eq!(options.password, None);
        assert!(!options.verify);
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.headers.get("X-Request-Source").map(String::as_str), Some("tests"));
    }

    #[test]
    fn test_load_invalid() {
        let (_tmp, path) = write_config("url: not a url");
        assert!(matches!(load_client_config(&path), Err(WpsError::Config { .. })));

        let (_tmp, path) = write_config("url: http://x/wps\npoll_interval_secs: 0");
        assert!(matches!(load_client_config(&path), Err(WpsError::Config { .. })));

        let (_tmp, path) = write_config("progress: [");
        assert!(matches!(load_client_config(&path), Err(WpsError::Config { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_client_config(Path::new("/nonexistent/wps-client.yaml"));
        assert!(matches!(result, Err(WpsError::Config { .. })));
    }

    #[test]
    fn test_interpolate_env_vars() {
        std::env::remove_var("__TEST_WPS_NONEXISTENT__");
        assert_eq!(
            interpolate_env_vars("${__TEST_WPS_NONEXISTENT__:-/fallback}"),
            "/fallback"
        );
        assert_eq!(interpolate_env_vars("${__TEST_WPS_NONEXISTENT__}"), "");
        assert_eq!(interpolate_env_vars("no variables"), "no variables");
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/wps");
        assert!(!result.starts_with('~'));
        assert!(result.ends_with("/wps"));
    }

    #[test]
    fn test_default_config_path_env() {
        std::env::set_var(CONFIG_PATH_ENV, "/etc/wps/config.yaml");
        assert_eq!(default_config_path(), Some(PathBuf::from("/etc/wps/config.yaml")));
        std::env::remove_var(CONFIG_PATH_ENV);
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("wps-client/config.yaml"));
        }
    }
}
