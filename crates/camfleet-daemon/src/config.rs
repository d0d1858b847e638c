//! Configuration loading and validation

use anyhow::{bail, Context, Result};
use camfleet_core::{IdRule, KindRules, NameRule};
use camfleet_registry::photo::DEFAULT_SCHEDULE_SECS;
use camfleet_registry::{GroupCredentials, GroupRouter, GroupRule, PollSchedule, DEFAULT_BASE_URL};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub photo: PhotoConfig,
    #[serde(default)]
    pub kinds: KindsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the REST API
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Devices per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

/// One device group and where its API token comes from.
/// Tokens never live in this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: u64,
    /// Environment variable holding the token
    #[serde(default)]
    pub token_env: Option<String>,
    /// File holding the token
    #[serde(default)]
    pub token_file: Option<String>,
    /// Devices matching no rule go here
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub match_device_names: Vec<String>,
    #[serde(default)]
    pub match_act_names: Vec<String>,
}

impl GroupConfig {
    pub fn resolve_token(&self) -> Result<String> {
        let token = if let Some(var) = &self.token_env {
            std::env::var(var)
                .with_context(|| format!("Group {}: environment variable {} not set", self.id, var))?
        } else if let Some(path) = &self.token_file {
            std::fs::read_to_string(path)
                .with_context(|| format!("Group {}: failed to read token file {}", self.id, path))?
        } else {
            bail!("Group {}: set token_env or token_file", self.id);
        };

        let token = token.trim().to_string();
        if token.is_empty() {
            bail!("Group {}: API token is empty", self.id);
        }
        Ok(token)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    /// Delay before each poll attempt
    #[serde(default = "default_schedule")]
    pub schedule_secs: Vec<u64>,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            schedule_secs: default_schedule(),
        }
    }
}

fn default_schedule() -> Vec<u64> {
    DEFAULT_SCHEDULE_SECS.to_vec()
}

/// Classification rules checked ahead of the built-in ones
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KindsConfig {
    #[serde(default)]
    pub ids: Vec<IdRule>,
    #[serde(default)]
    pub names: Vec<NameRule>,
}

impl Config {
    /// The group marked `default`, or the first group
    pub fn default_group(&self) -> Result<u64> {
        let defaults: Vec<u64> = self.groups.iter().filter(|g| g.default).map(|g| g.id).collect();
        match (defaults.as_slice(), self.groups.first()) {
            ([], Some(first)) => Ok(first.id),
            ([id], _) => Ok(*id),
            ([], None) => bail!("No device groups configured"),
            (many, _) => bail!("Only one group may be the default, got {:?}", many),
        }
    }

    pub fn group_credentials(&self) -> Result<Vec<GroupCredentials>> {
        self.groups
            .iter()
            .map(|g| {
                Ok(GroupCredentials {
                    group_id: g.id,
                    token: g.resolve_token()?,
                })
            })
            .collect()
    }

    pub fn group_router(&self) -> Result<GroupRouter> {
        let rules = self
            .groups
            .iter()
            .filter(|g| !g.match_device_names.is_empty() || !g.match_act_names.is_empty())
            .map(|g| GroupRule {
                group_id: g.id,
                device_names: g.match_device_names.clone(),
                act_names: g.match_act_names.clone(),
            })
            .collect();
        Ok(GroupRouter::new(self.default_group()?, rules))
    }

    /// Built-in rules with the configured ones in front, in file order
    pub fn kind_rules(&self) -> KindRules {
        let rules = self
            .kinds
            .ids
            .iter()
            .rev()
            .fold(KindRules::builtin(), |rules, r| rules.with_id(r.id, r.kind));
        self.kinds
            .names
            .iter()
            .rev()
            .fold(rules, |rules, r| rules.with_name(r.contains.clone(), r.kind))
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        if self.photo.schedule_secs.is_empty() {
            warn!("Empty photo schedule configured, using the default");
            return PollSchedule::default();
        }
        PollSchedule::from_secs(&self.photo.schedule_secs)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), groups = config.groups.len(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Configuration written by `--write-default-config`
pub fn default_template() -> Config {
    Config {
        groups: vec![
            GroupConfig {
                id: 2581,
                token_env: Some("CAMFLEET_TOKEN_2581".to_string()),
                token_file: None,
                default: true,
                match_device_names: Vec::new(),
                match_act_names: Vec::new(),
            },
            GroupConfig {
                id: 2236,
                token_env: Some("CAMFLEET_TOKEN_2236".to_string()),
                token_file: None,
                default: false,
                match_device_names: vec!["キラリナ".to_string(), "Lindt".to_string()],
                match_act_names: vec!["Viewer Analysis".to_string(), "WalkerInsight".to_string()],
            },
        ],
        ..Config::default()
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&default_template())?;
    std::fs::write(path, content)?;
    Ok(())
}
