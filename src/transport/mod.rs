//! Framed command transport to a single pod
//!
//! Two usage patterns are supported:
//! - per-command: [`Transport::execute`] / [`Transport::request`] dial, authenticate,
//!   exchange one command and close
//! - shared: [`Transport::open`] returns an authenticated [`Connection`] the caller
//!   reuses for many sequential commands
//!
//! Nothing here retries; retry policy belongs to the caller.

pub mod connection;

pub use connection::{Connection, Reply};

use crate::config::{AuthMode, SwarmConfig};
use crate::Result;
use podswarm_common::Endpoint;
use podswarm_proto::Command;
use std::sync::Arc;
use std::time::Duration;

/// Static protocol settings shared by every connection
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub secret: String,
    pub sentinel: String,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
}

impl TransportSettings {
    pub fn from_config(config: &SwarmConfig) -> Self {
        Self {
            secret: config.auth_secret.clone(),
            sentinel: config.sentinel.clone(),
            dial_timeout: config.dial_timeout(),
            read_timeout: config.read_timeout(),
        }
    }
}

/// Cheap-to-clone handle for issuing commands to one endpoint
#[derive(Debug, Clone)]
pub struct Transport {
    endpoint: Endpoint,
    settings: Arc<TransportSettings>,
    auth_mode: AuthMode,
}

impl Transport {
    pub fn new(endpoint: Endpoint, settings: TransportSettings, auth_mode: AuthMode) -> Self {
        Self {
            endpoint,
            settings: Arc::new(settings),
            auth_mode,
        }
    }

    /// Handle sharing settings already held elsewhere
    pub fn shared(endpoint: Endpoint, settings: Arc<TransportSettings>, auth_mode: AuthMode) -> Self {
        Self {
            endpoint,
            settings,
            auth_mode,
        }
    }

    pub fn from_config(config: &SwarmConfig) -> Result<Self> {
        Ok(Self::new(
            config.endpoint()?,
            TransportSettings::from_config(config),
            config.auth_mode,
        ))
    }

    /// Same settings, different pod
    pub fn for_endpoint(&self, endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            settings: Arc::clone(&self.settings),
            auth_mode: self.auth_mode,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Dial and authenticate with the configured strictness
    pub async fn open(&self) -> Result<Connection> {
        self.open_with(self.auth_mode).await
    }

    pub async fn open_with(&self, mode: AuthMode) -> Result<Connection> {
        let mut conn = Connection::dial(&self.endpoint, Arc::clone(&self.settings)).await?;
        conn.authenticate(mode).await?;
        Ok(conn)
    }

    /// One command on its own connection, reading a reply only if the host sends one
    pub async fn execute(&self, command: &Command) -> Result<Option<Reply>> {
        let mut conn = self.open().await?;
        let reply = conn.execute(command).await?;
        conn.close().await;
        Ok(reply)
    }

    /// One request/reply exchange on its own connection
    pub async fn request(&self, command: &Command) -> Result<Reply> {
        let mut conn = self.open().await?;
        let reply = conn.request(command).await?;
        conn.close().await;
        Ok(reply)
    }

    pub async fn cube_list(&self) -> Result<Vec<String>> {
        let mut conn = self.open().await?;
        let cubes = conn.cube_list().await;
        conn.close().await;
        cubes
    }

    pub async fn joints_for_cube(&self, cube: &str) -> Result<Vec<String>> {
        let mut conn = self.open().await?;
        let joints = conn.joints_for_cube(cube).await;
        conn.close().await;
        joints
    }
}
