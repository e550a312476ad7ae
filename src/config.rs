//! Runtime configuration
//!
//! Resolution order: built-in defaults, then an optional YAML file, then the
//! `PODSWARM_ENDPOINT` / `PODSWARM_SECRET` environment variables, then CLI flags
//! (applied by the caller).

use crate::{Result, SwarmError};
use podswarm_common::{Endpoint, DEFAULT_AUTH_SECRET, FRAME_SENTINEL};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_ENDPOINT: &str = "PODSWARM_ENDPOINT";
pub const ENV_SECRET: &str = "PODSWARM_SECRET";

/// How strictly the reply to the authentication frame is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Reply must contain the `auth_success` marker
    Strict,
    /// Reply is read and discarded
    #[default]
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub endpoint: String,
    pub auth_secret: String,
    pub sentinel: String,
    pub dial_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub auth_mode: AuthMode,
    pub scan: ScanConfig,
    pub nuke: NukeConfig,
    pub fleet: FleetConfig,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default().to_string(),
            auth_secret: DEFAULT_AUTH_SECRET.to_string(),
            sentinel: FRAME_SENTINEL.to_string(),
            dial_timeout_ms: 10_000,
            read_timeout_ms: 3_000,
            auth_mode: AuthMode::Lenient,
            scan: ScanConfig::default(),
            nuke: NukeConfig::default(),
            fleet: FleetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub hosts: Vec<String>,
    pub start_port: u16,
    pub port_step: u16,
    pub pods_per_host: u16,
    pub probe_timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            hosts: vec![podswarm_common::DEFAULT_HOST.to_string()],
            start_port: 10002,
            port_step: 3,
            pods_per_host: 10,
            probe_timeout_ms: 10_000,
        }
    }
}

impl ScanConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Highest port the scan reaches, or `None` when it runs past 65535
    pub fn last_port(&self) -> Option<u16> {
        let steps = u32::from(self.pods_per_host.saturating_sub(1)) * u32::from(self.port_step);
        u16::try_from(u32::from(self.start_port) + steps).ok()
    }

    /// Every (host, port) candidate, `start_port + i * port_step` for each host
    pub fn candidates(&self) -> Vec<Endpoint> {
        self.hosts
            .iter()
            .flat_map(|host| {
                (0..self.pods_per_host).filter_map(move |i| {
                    let port = u32::from(self.start_port) + u32::from(i) * u32::from(self.port_step);
                    u16::try_from(port).ok().map(|p| Endpoint::new(host.clone(), p))
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NukeConfig {
    pub max_passes: u32,
    pub pass_delay_ms: u64,
}

impl NukeConfig {
    pub fn pass_delay(&self) -> Duration {
        Duration::from_millis(self.pass_delay_ms)
    }
}

impl Default for NukeConfig {
    fn default() -> Self {
        Self {
            max_passes: 5,
            pass_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub despawn_delay_ms: u64,
    pub hold_ms: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            despawn_delay_ms: 500,
            hold_ms: 0,
        }
    }
}

impl SwarmConfig {
    /// Load defaults, the optional YAML file and environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SwarmError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply `PODSWARM_*` overrides through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(secret) = lookup(ENV_SECRET) {
            self.auth_secret = secret;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sentinel.is_empty() {
            return Err(SwarmError::Config("sentinel must not be empty".into()));
        }
        if self.scan.pods_per_host == 0 {
            return Err(SwarmError::Config("scan.pods_per_host must be at least 1".into()));
        }
        if self.scan.last_port().is_none() {
            return Err(SwarmError::Config(format!(
                "scan of {} pods from port {} in steps of {} runs past port {}",
                self.scan.pods_per_host,
                self.scan.start_port,
                self.scan.port_step,
                u16::MAX
            )));
        }
        if self.nuke.max_passes == 0 {
            return Err(SwarmError::Config("nuke.max_passes must be at least 1".into()));
        }
        self.endpoint()?;
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.endpoint)
            .ok_or_else(|| SwarmError::Config(format!("invalid endpoint: {}", self.endpoint)))
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn despawn_delay(&self) -> Duration {
        Duration::from_millis(self.fleet.despawn_delay_ms)
    }
}
