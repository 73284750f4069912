use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{FleetError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Declarative account list (JSON array of account records)
    #[serde(default = "default_accounts_file")]
    pub accounts_file: PathBuf,
    /// Interval between bridge re-polls in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Grace period before a stubborn worker is force-killed
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

fn default_accounts_file() -> PathBuf {
    PathBuf::from("accounts.json")
}

fn default_tick_interval() -> u64 {
    2
}

fn default_grace_period() -> u64 {
    5
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            accounts_file: default_accounts_file(),
            tick_interval_secs: default_tick_interval(),
            grace_period_secs: default_grace_period(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port for the control/read API
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8420
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Tracing filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info,termfleet=debug,sqlx=warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("termfleet")
    }

    /// Load configuration from a specific file stem
    pub fn load_from<P: AsRef<Path>>(config_file: P) -> std::result::Result<Self, ConfigError> {
        let builder = Config::builder()
            // Load config file if present
            .add_source(File::from(config_file.as_ref().to_path_buf()).required(false))
            // Override with environment variables (TERMFLEET_SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("TERMFLEET")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

/// One account entry from the declarative source.
///
/// `login` is the unique key; exactly one worker instance exists per login.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub login: i64,
    pub password: String,
    pub server: String,
    pub terminal_path: PathBuf,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_update_interval() -> u64 {
    5
}

impl AccountConfig {
    /// Display name, falling back to the login when none is configured
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Account {}", self.login))
    }
}

// Keep the password out of logs
impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("name", &self.name)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("server", &self.server)
            .field("terminal_path", &self.terminal_path)
            .field("enabled", &self.enabled)
            .field("update_interval", &self.update_interval)
            .finish()
    }
}

/// Load the declarative account list.
///
/// Any parse failure or duplicate login aborts the whole load; the caller's
/// previous instance set is left untouched.
pub fn load_accounts(path: &Path) -> Result<Vec<AccountConfig>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        FleetError::AccountList(format!("cannot read {}: {e}", path.display()))
    })?;

    let accounts: Vec<AccountConfig> = serde_json::from_str(&raw)
        .map_err(|e| FleetError::AccountList(format!("malformed {}: {e}", path.display())))?;

    let mut seen = std::collections::BTreeSet::new();
    for account in &accounts {
        if !seen.insert(account.login) {
            return Err(FleetError::AccountList(format!(
                "duplicate login {}",
                account.login
            )));
        }
    }

    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_accounts(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_account_defaults() {
        let file = write_accounts(
            r#"[{"login": 111, "password": "pw", "server": "Demo", "terminal_path": "/opt/terminal"}]"#,
        );
        let accounts = load_accounts(file.path()).unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(accounts[0].enabled);
        assert_eq!(accounts[0].update_interval, 5);
        assert_eq!(accounts[0].display_name(), "Account 111");
    }

    #[test]
    fn test_duplicate_login_rejected() {
        let file = write_accounts(
            r#"[
                {"login": 111, "password": "a", "server": "Demo", "terminal_path": "/x"},
                {"login": 111, "password": "b", "server": "Demo", "terminal_path": "/y"}
            ]"#,
        );
        assert!(load_accounts(file.path()).is_err());
    }

    #[test]
    fn test_malformed_list_rejected() {
        let file = write_accounts("{not json");
        assert!(load_accounts(file.path()).is_err());
    }

    #[test]
    fn test_password_redacted_in_debug() {
        let account = AccountConfig {
            name: None,
            login: 1,
            password: "hunter2".into(),
            server: "Demo".into(),
            terminal_path: "/x".into(),
            enabled: true,
            update_interval: 5,
        };
        let debug = format!("{account:?}");
        assert!(!debug.contains("hunter2"));
    }
}
