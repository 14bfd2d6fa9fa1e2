use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;

const ENV_PREFIX: &str = "TELEMETRY_PROBE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    #[default]
    Disabled,
    Permissive,
    Strict,
}

impl std::str::FromStr for SecurityMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" => Ok(SecurityMode::Disabled),
            "permissive" => Ok(SecurityMode::Permissive),
            "strict" => Ok(SecurityMode::Strict),
            other => Err(anyhow::anyhow!("Unknown security mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ports {
    pub master_admin_router: u16,
    pub agent_admin_router: u16,
    pub prometheus: u16,
    pub mesos_master: u16,
    pub mesos_agent: u16,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            master_admin_router: 80,
            agent_admin_router: 61001,
            prometheus: 61091,
            mesos_master: 5050,
            mesos_agent: 5051,
        }
    }
}

impl Ports {
    /// Every service on one port; used when a single mock server stands in for the cluster.
    pub fn all(port: u16) -> Self {
        Self {
            master_admin_router: port,
            agent_admin_router: port,
            prometheus: port,
            mesos_master: port,
            mesos_agent: port,
        }
    }
}

/// Polling budgets, in milliseconds.
///
/// Collectors publish on a two minute cycle, so metric waits are several cycles long.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub metrics_wait_ms: u64,
    pub metrics_interval_ms: u64,
    pub std_wait_ms: u64,
    pub std_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            metrics_wait_ms: 5 * 60 * 1000,
            metrics_interval_ms: 2 * 1000,
            std_wait_ms: 15 * 60 * 1000,
            std_interval_ms: 5 * 1000,
        }
    }
}

impl Timeouts {
    pub fn metrics_wait(&self) -> Duration {
        Duration::from_millis(self.metrics_wait_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    pub fn std_wait(&self) -> Duration {
        Duration::from_millis(self.std_wait_ms)
    }

    pub fn std_interval(&self) -> Duration {
        Duration::from_millis(self.std_interval_ms)
    }

    /// Metrics API polling: short interval, metrics budget.
    pub fn metrics_poll<R, E>(&self) -> RetryPolicy<R, E> {
        RetryPolicy::fixed(self.metrics_interval(), self.metrics_wait())
    }

    /// Waiting for telemetry to show up after a workload changed.
    pub fn convergence<R, E>(&self) -> RetryPolicy<R, E> {
        RetryPolicy::fixed(self.std_interval(), self.metrics_wait())
    }

    /// Waiting for a framework to disappear after uninstalling it.
    pub fn teardown<R, E>(&self) -> RetryPolicy<R, E> {
        RetryPolicy::fixed(self.std_interval(), self.std_wait())
    }

    /// Back-to-back polling within the metrics budget.
    pub fn tight<R, E>(&self) -> RetryPolicy<R, E> {
        RetryPolicy::tight(self.metrics_wait())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub masters: Vec<String>,
    pub agents: Vec<String>,
    pub public_agents: Vec<String>,
    pub scheme: String,
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
    pub security: SecurityMode,
    pub ports: Ports,
    pub timeouts: Timeouts,
    pub log_level: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            masters: vec!["127.0.0.1".to_string()],
            agents: vec![],
            public_agents: vec![],
            scheme: "http".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
            security: SecurityMode::Disabled,
            ports: Ports::default(),
            timeouts: Timeouts::default(),
            log_level: Some("info".to_string()),
        }
    }
}

fn split_hosts(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(String::from)
        .collect()
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.masters.is_empty() {
            return Err(anyhow::anyhow!("At least one master address is required"));
        }

        if self.scheme != "http" && self.scheme != "https" {
            return Err(anyhow::anyhow!(
                "scheme must be http or https, got {}",
                self.scheme
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "request_timeout_secs must be greater than 0"
            ));
        }

        if self.timeouts.metrics_wait_ms == 0 || self.timeouts.std_wait_ms == 0 {
            return Err(anyhow::anyhow!("wait budgets must be greater than 0"));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn apply_cli_overrides(&mut self, matches: &ArgMatches) -> Result<()> {
        if let Some(masters) = matches.get_one::<String>("masters") {
            self.masters = split_hosts(masters);
        }

        if let Some(agents) = matches.get_one::<String>("agents") {
            self.agents = split_hosts(agents);
        }

        if let Some(public_agents) = matches.get_one::<String>("public-agents") {
            self.public_agents = split_hosts(public_agents);
        }

        if let Some(scheme) = matches.get_one::<String>("scheme") {
            self.scheme = scheme.clone();
        }

        if let Some(token) = matches.get_one::<String>("auth-token") {
            self.auth_token = Some(token.clone());
        }

        if let Some(security) = matches.get_one::<String>("security") {
            self.security = security.parse().context("Invalid --security")?;
        }

        if let Some(log_level) = matches.get_one::<String>("log-level") {
            self.log_level = Some(log_level.clone());
        }

        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let var = |name: &str| std::env::var(format!("{ENV_PREFIX}_{name}"));

        if let Ok(masters) = var("MASTERS") {
            self.masters = split_hosts(&masters);
        }

        if let Ok(agents) = var("AGENTS") {
            self.agents = split_hosts(&agents);
        }

        if let Ok(public_agents) = var("PUBLIC_AGENTS") {
            self.public_agents = split_hosts(&public_agents);
        }

        if let Ok(scheme) = var("SCHEME") {
            self.scheme = scheme;
        }

        if let Ok(token) = var("AUTH_TOKEN") {
            self.auth_token = Some(token);
        }

        if let Ok(security) = var("SECURITY") {
            self.security = security
                .parse()
                .with_context(|| format!("Invalid {ENV_PREFIX}_SECURITY"))?;
        }

        if let Ok(timeout_str) = var("REQUEST_TIMEOUT") {
            if let Ok(timeout_secs) = timeout_str.parse::<u64>() {
                self.request_timeout_secs = timeout_secs;
            }
        }

        if let Ok(log_level) = var("LOG_LEVEL") {
            self.log_level = Some(log_level);
        }

        Ok(())
    }
}

/// Reads and parses a TOML config file.
pub fn read_config_file(path: &Path) -> Result<ProbeConfig> {
    let file_content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&file_content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration: CLI args > env vars > config file > defaults
pub fn load_config(config_path: Option<&str>, matches: &ArgMatches) -> Result<ProbeConfig> {
    let mut config = ProbeConfig::default();

    if let Some(path) = config_path {
        let path = Path::new(path);
        if path.exists() {
            config = read_config_file(path)?;
            log::info!("Loaded configuration from file: {}", path.display());
        } else {
            log::info!("Config file not found: {}, using defaults", path.display());
        }
    }

    config.apply_env_overrides()?;
    config.apply_cli_overrides(matches)?;

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;

    log::debug!("Final config: {config:?}");

    Ok(config)
}

/// Create a sample configuration file
pub fn create_sample_config(path: &str) -> Result<()> {
    let config = ProbeConfig::default();
    let toml_content =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    fs::write(path, toml_content)
        .with_context(|| format!("Failed to write sample config to: {path}"))?;

    println!("Sample configuration written to: {path}");
    Ok(())
}
