//! Supervisor configuration loading from file and environment variables.

use crate::process::ProcessSpec;
use crate::unit::ReadyCheck;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Name of the default unit running the voice session handler.
pub const SESSION_HANDLER_UNIT: &str = "session-handler";

/// Name of the default unit running the token service.
pub const TOKEN_SERVICE_UNIT: &str = "token-service";

const SERVER_BINARY: &str = "voicegate-server";

/// Top-level supervisor configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Group-wide settings.
    #[serde(default)]
    pub supervisor: SupervisorSettings,

    /// Units to run, in launch order. Empty means the default pair.
    #[serde(default)]
    pub units: Vec<UnitConfig>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Group-wide supervision settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSettings {
    /// Seconds a unit gets to exit after terminate before it is killed.
    #[serde(default = "default_grace_period_seconds")]
    pub grace_period_seconds: u64,
}

/// One supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// URL that must answer 2xx before the unit counts as running.
    #[serde(default)]
    pub ready_url: Option<String>,
    #[serde(default = "default_ready_timeout_seconds")]
    pub ready_timeout_seconds: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "voicegate_supervisor=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_grace_period_seconds() -> u64 {
    10
}

fn default_ready_timeout_seconds() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_period_seconds: default_grace_period_seconds(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The grace period is zero.
    #[error("supervisor.grace_period_seconds must be greater than zero")]
    InvalidGracePeriod,

    /// No units are configured.
    #[error("at least one unit must be configured")]
    NoUnits,

    /// Two units share a name.
    #[error("duplicate unit name: {0}")]
    DuplicateUnit(String),

    /// A unit entry is incomplete.
    #[error("invalid unit {unit:?}: {reason}")]
    InvalidUnit { unit: String, reason: &'static str },

    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

impl UnitConfig {
    /// Builds the launch description for this unit.
    pub fn to_spec(&self) -> ProcessSpec {
        let mut spec = ProcessSpec::new(&self.name, &self.command).args(self.args.iter().cloned());
        for (key, value) in &self.env {
            spec = spec.env(key, value);
        }
        if let Some(url) = &self.ready_url {
            spec = spec.ready_check(ReadyCheck {
                url: url.clone(),
                timeout: Duration::from_secs(self.ready_timeout_seconds),
            });
        }
        spec
    }
}

impl Config {
    /// Grace period as a duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.supervisor.grace_period_seconds)
    }

    /// Launch descriptions for every configured unit, in order.
    pub fn process_specs(&self) -> Vec<ProcessSpec> {
        self.units.iter().map(UnitConfig::to_spec).collect()
    }

    /// Checks the unit list and timings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for a zero grace period, an empty unit list, a
    /// unit without name or command, a zero readiness timeout, or duplicate
    /// unit names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supervisor.grace_period_seconds == 0 {
            return Err(ConfigError::InvalidGracePeriod);
        }
        if self.units.is_empty() {
            return Err(ConfigError::NoUnits);
        }

        let mut seen = HashSet::new();
        for unit in &self.units {
            if unit.name.trim().is_empty() {
                return Err(ConfigError::InvalidUnit {
                    unit: unit.name.clone(),
                    reason: "name must not be empty",
                });
            }
            if unit.command.trim().is_empty() {
                return Err(ConfigError::InvalidUnit {
                    unit: unit.name.clone(),
                    reason: "command must not be empty",
                });
            }
            if unit.ready_url.is_some() && unit.ready_timeout_seconds == 0 {
                return Err(ConfigError::InvalidUnit {
                    unit: unit.name.clone(),
                    reason: "ready_timeout_seconds must be greater than zero",
                });
            }
            if !seen.insert(unit.name.as_str()) {
                return Err(ConfigError::DuplicateUnit(unit.name.clone()));
            }
        }
        Ok(())
    }
}

/// The session handler plus the token service, launched in that order.
pub fn default_units(server_program: &str) -> Vec<UnitConfig> {
    vec![
        UnitConfig {
            name: SESSION_HANDLER_UNIT.to_string(),
            command: "python3".to_string(),
            args: vec![
                "-m".to_string(),
                "opti.agent".to_string(),
                "start".to_string(),
            ],
            env: BTreeMap::new(),
            ready_url: None,
            ready_timeout_seconds: default_ready_timeout_seconds(),
        },
        UnitConfig {
            name: TOKEN_SERVICE_UNIT.to_string(),
            command: server_program.to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            ready_url: Some("http://127.0.0.1:5001/health".to_string()),
            ready_timeout_seconds: default_ready_timeout_seconds(),
        },
    ]
}

/// Path of the token service binary installed next to the running supervisor,
/// or the bare name for a `PATH` lookup.
pub fn server_program() -> String {
    let file_name = format!("{SERVER_BINARY}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
        .filter(|candidate: &PathBuf| candidate.is_file())
        .map_or(file_name, |candidate| candidate.to_string_lossy().into_owned())
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// When no `[[units]]` are configured the default session handler and token
/// service are used.
///
/// Environment variable overrides:
/// - `VOICEGATE_GRACE_PERIOD_SECONDS` overrides `supervisor.grace_period_seconds`
/// - `VOICEGATE_SESSION_COMMAND` replaces the `session-handler` command line
///   (split on whitespace)
/// - `VOICEGATE_LOG_LEVEL` overrides `logging.level`
/// - `VOICEGATE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if an override does not parse.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Like [`load_config`], reading environment variables through `lookup`.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env<F>(path: Option<&str>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if config.units.is_empty() {
        config.units = default_units(&server_program());
    }

    apply_env_overrides(config, lookup)
}

/// Applies environment overrides using `lookup` to read variables.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnv`] when the grace period override is not
/// a whole number of seconds.
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(grace) = lookup("VOICEGATE_GRACE_PERIOD_SECONDS") {
        config.supervisor.grace_period_seconds =
            grace.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "VOICEGATE_GRACE_PERIOD_SECONDS",
                value: grace.clone(),
            })?;
    }
    if let Some(command_line) = lookup("VOICEGATE_SESSION_COMMAND") {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        if let Some(command) = parts.next() {
            if let Some(unit) = config
                .units
                .iter_mut()
                .find(|unit| unit.name == SESSION_HANDLER_UNIT)
            {
                unit.command = command;
                unit.args = parts.collect();
            }
        }
    }
    if let Some(level) = lookup("VOICEGATE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("VOICEGATE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Launch;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn with_defaults() -> Config {
        Config {
            units: default_units("voicegate-server"),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_run_session_handler_then_token_service() {
        let config = with_defaults();
        assert_eq!(config.grace_period(), Duration::from_secs(10));
        assert!(config.validate().is_ok());

        let names: Vec<&str> = config.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, [SESSION_HANDLER_UNIT, TOKEN_SERVICE_UNIT]);

        let session = &config.units[0];
        assert_eq!(session.command, "python3");
        assert_eq!(session.args, ["-m", "opti.agent", "start"]);
        assert!(session.ready_url.is_none());

        let specs = config.process_specs();
        let ready = Launch::ready_check(&specs[1]).unwrap();
        assert_eq!(ready.url, "http://127.0.0.1:5001/health");
        assert_eq!(ready.timeout, Duration::from_secs(30));
    }

    #[test]
    fn session_command_override_is_split_on_whitespace() {
        let config = apply_env_overrides(
            with_defaults(),
            env(&[
                ("VOICEGATE_SESSION_COMMAND", "  uv run  agent.py   dev "),
                ("VOICEGATE_GRACE_PERIOD_SECONDS", "3"),
                ("VOICEGATE_LOG_LEVEL", "debug"),
            ]),
        )
        .unwrap();

        let session = &config.units[0];
        assert_eq!(session.command, "uv");
        assert_eq!(session.args, ["run", "agent.py", "dev"]);
        assert_eq!(config.supervisor.grace_period_seconds, 3);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn blank_session_command_is_ignored() {
        let config = apply_env_overrides(
            with_defaults(),
            env(&[("VOICEGATE_SESSION_COMMAND", "   ")]),
        )
        .unwrap();
        assert_eq!(config.units[0].command, "python3");
    }

    #[test]
    fn unparseable_grace_period_is_an_error() {
        for value in ["ten", "-1", "2.5", ""] {
            let err = apply_env_overrides(
                with_defaults(),
                env(&[("VOICEGATE_GRACE_PERIOD_SECONDS", value)]),
            )
            .unwrap_err();
            match err {
                ConfigError::InvalidEnv { var, value: v } => {
                    assert_eq!(var, "VOICEGATE_GRACE_PERIOD_SECONDS");
                    assert_eq!(v, value);
                }
                other => panic!("unexpected error for {value:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn validation_rejects_bad_unit_lists() {
        let mut zero_grace = with_defaults();
        zero_grace.supervisor.grace_period_seconds = 0;
        assert!(matches!(
            zero_grace.validate(),
            Err(ConfigError::InvalidGracePeriod)
        ));

        assert!(matches!(
            Config::default().validate(),
            Err(ConfigError::NoUnits)
        ));

        let mut duplicate = with_defaults();
        duplicate.units[1].name = SESSION_HANDLER_UNIT.to_string();
        assert!(matches!(
            duplicate.validate(),
            Err(ConfigError::DuplicateUnit(name)) if name == SESSION_HANDLER_UNIT
        ));

        let mut no_command = with_defaults();
        no_command.units[0].command = " ".to_string();
        assert!(matches!(
            no_command.validate(),
            Err(ConfigError::InvalidUnit { .. })
        ));

        let mut no_name = with_defaults();
        no_name.units[0].name = String::new();
        assert!(matches!(
            no_name.validate(),
            Err(ConfigError::InvalidUnit { .. })
        ));
    }

    #[test]
    fn loads_units_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[supervisor]
grace_period_seconds = 4

[[units]]
name = "agent"
command = "python3"
args = ["-m", "opti.agent", "dev"]
env = {{ LOG_LEVEL = "debug" }}

[[units]]
name = "tokens"
command = "/usr/local/bin/voicegate-server"
ready_url = "http://127.0.0.1:5101/health"
ready_timeout_seconds = 5

[logging]
json = true
"#
        )
        .unwrap();

        let config = load_config_with_env(file.path().to_str(), |_| None).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.grace_period(), Duration::from_secs(4));
        assert_eq!(config.units.len(), 2);
        assert_eq!(config.units[0].env["LOG_LEVEL"], "debug");
        assert!(config.logging.json);

        let specs = config.process_specs();
        assert_eq!(specs[0].env, [("LOG_LEVEL".to_string(), "debug".to_string())]);
        assert_eq!(
            Launch::ready_check(&specs[1]).unwrap().timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn missing_file_falls_back_to_default_units() {
        let config = load_config_with_env(Some("/nonexistent/voicegate.toml"), |_| None).unwrap();
        assert_eq!(config.units.len(), 2);
        assert!(config.units[1].command.contains(SERVER_BINARY));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[units]]\nname = 3").unwrap();
        assert!(matches!(
            load_config_with_env(file.path().to_str(), |_| None),
            Err(ConfigError::Parse(_))
        ));
    }
}
