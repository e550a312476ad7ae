//! Pod discovery and inventory
//!
//! A probe walks `pending -> connected -> authenticated -> inventoried` and ends
//! either successful or failed with a reason. Probes never retry. Bulk scans run
//! one task per candidate and funnel results through a bounded channel that is
//! drained once every probe has finished; successful results are then merged
//! into the planet and cube maps (last writer wins).

mod inventory;

pub use inventory::{
    CubeConnection, JointPeer, PlanetLocation, PodInventory, ProbeStage, ScanSummary,
};

use crate::config::{AuthMode, ScanConfig, SwarmConfig};
use crate::registry::Registry;
use crate::transport::{Connection, Transport, TransportSettings};
use crate::{Result, SwarmError};
use futures::stream::{self, StreamExt};
use podswarm_common::{Endpoint, Vec3};
use podswarm_proto::Planet;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Upper bound on concurrent joint lookups
const MAX_JOINT_LOOKUPS: usize = 10;

pub struct PodScanner {
    settings: Arc<TransportSettings>,
    lookup_auth: AuthMode,
    results: Vec<PodInventory>,
    planets: BTreeMap<String, PlanetLocation>,
    cubes: BTreeMap<String, Endpoint>,
}

impl PodScanner {
    pub fn new(settings: TransportSettings, lookup_auth: AuthMode) -> Self {
        Self {
            settings: Arc::new(settings),
            lookup_auth,
            results: Vec::new(),
            planets: BTreeMap::new(),
            cubes: BTreeMap::new(),
        }
    }

    /// Probes dial and read with the scan's probe timeout
    pub fn from_config(config: &SwarmConfig) -> Self {
        let mut settings = TransportSettings::from_config(config);
        settings.dial_timeout = config.scan.probe_timeout();
        settings.read_timeout = config.scan.probe_timeout();
        Self::new(settings, config.auth_mode)
    }

    /// Probe every candidate of `scan` concurrently and merge the results
    ///
    /// Returns the results of this scan only, in completion order.
    pub async fn scan_all(&mut self, scan: &ScanConfig) -> &[PodInventory] {
        let candidates = scan.candidates();
        let start = self.results.len();
        if candidates.is_empty() {
            return &self.results[start..];
        }

        info!(
            hosts = scan.hosts.len(),
            pods = candidates.len(),
            "Scanning pods"
        );

        let (tx, mut rx) = mpsc::channel(candidates.len());
        let mut join_set = JoinSet::new();
        for endpoint in candidates {
            let tx = tx.clone();
            let settings = Arc::clone(&self.settings);
            join_set.spawn(async move {
                let inventory = probe(endpoint, settings).await;
                let _ = tx.send(inventory).await;
            });
        }
        drop(tx);

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Probe task did not complete");
            }
        }
        while let Some(inventory) = rx.recv().await {
            self.add_result(inventory);
        }

        let scanned = &self.results[start..];
        info!(
            reachable = scanned.iter().filter(|r| r.success).count(),
            attempted = scanned.len(),
            "Scan complete"
        );
        scanned
    }

    /// Probe a single pod without touching the aggregate state
    pub async fn scan_one(&self, endpoint: &Endpoint) -> PodInventory {
        probe(endpoint.clone(), Arc::clone(&self.settings)).await
    }

    /// Append a probe result and merge it into the maps if it succeeded
    pub fn add_result(&mut self, inventory: PodInventory) {
        if inventory.success {
            for planet in &inventory.planets {
                self.planets.insert(
                    planet.name.clone(),
                    PlanetLocation {
                        name: planet.name.clone(),
                        coordinates: planet.position.into(),
                        endpoint: inventory.endpoint.clone(),
                    },
                );
            }
            for cube in &inventory.cubes {
                self.cubes.insert(cube.clone(), inventory.endpoint.clone());
            }
        }
        self.results.push(inventory);
    }

    pub fn results(&self) -> &[PodInventory] {
        &self.results
    }

    pub fn reachable(&self) -> impl Iterator<Item = &PodInventory> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn planets(&self) -> &BTreeMap<String, PlanetLocation> {
        &self.planets
    }

    pub fn cubes(&self) -> &BTreeMap<String, Endpoint> {
        &self.cubes
    }

    pub fn summary(&self) -> ScanSummary {
        let reachable: Vec<&PodInventory> = self.reachable().collect();
        ScanSummary {
            attempted: self.results.len(),
            reachable: reachable.len(),
            total_cubes: reachable.iter().map(|r| r.cubes.len()).sum(),
            total_planets: reachable.iter().map(|r| r.planets.len()).sum(),
            unique_planets: self.planets.len(),
        }
    }

    /// Coordinates of every mapped planet, ordered by planet name
    pub fn planet_centers(&self) -> Vec<Vec3> {
        self.planets.values().map(|p| p.coordinates).collect()
    }

    /// Mapped cube names starting with `prefix`, sorted
    pub fn cubes_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.cubes
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Ask each owning pod for the joints of every mapped cube under `prefix`
    ///
    /// Counterparts are resolved through the registry's link records. A failed
    /// lookup is logged and yields a cube with no joints.
    pub async fn connections_for_prefix(
        &self,
        prefix: &str,
        registry: &Registry,
    ) -> Result<Vec<CubeConnection>> {
        let targets: Vec<(String, Endpoint)> = self
            .cubes
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, endpoint)| (name.clone(), endpoint.clone()))
            .collect();
        if targets.is_empty() {
            return Err(SwarmError::Validation(format!(
                "no cubes found with prefix {:?}",
                prefix
            )));
        }

        let mut connections: Vec<CubeConnection> = stream::iter(targets)
            .map(|(cube, endpoint)| {
                let transport =
                    Transport::shared(endpoint.clone(), Arc::clone(&self.settings), self.lookup_auth);
                let registry = registry.clone();
                async move {
                    let names = match transport.joints_for_cube(&cube).await {
                        Ok(names) => names,
                        Err(e) => {
                            warn!(cube = %cube, endpoint = %endpoint, error = %e, "Joint lookup failed");
                            Vec::new()
                        }
                    };
                    let joints = names
                        .into_iter()
                        .map(|joint_name| {
                            let connected_cube = registry.counterpart(&joint_name, &cube);
                            JointPeer {
                                joint_name,
                                connected_cube,
                            }
                        })
                        .collect();
                    CubeConnection {
                        cube_name: cube,
                        endpoint,
                        joints,
                    }
                }
            })
            .buffer_unordered(MAX_JOINT_LOOKUPS)
            .collect()
            .await;

        connections.sort_by(|a, b| a.cube_name.cmp(&b.cube_name));
        Ok(connections)
    }
}

async fn probe(endpoint: Endpoint, settings: Arc<TransportSettings>) -> PodInventory {
    let mut stage = ProbeStage::Pending;
    match take_inventory(&endpoint, settings, &mut stage).await {
        Ok((cubes, planets)) => {
            debug!(
                endpoint = %endpoint,
                cubes = cubes.len(),
                planets = planets.len(),
                "Pod inventoried"
            );
            PodInventory::reachable(endpoint, cubes, planets)
        }
        Err(e) => {
            debug!(endpoint = %endpoint, stage = %stage, error = %e, "Probe failed");
            PodInventory::failed(endpoint, stage, e.to_string())
        }
    }
}

async fn take_inventory(
    endpoint: &Endpoint,
    settings: Arc<TransportSettings>,
    stage: &mut ProbeStage,
) -> Result<(Vec<String>, Vec<Planet>)> {
    let mut conn = Connection::dial(endpoint, settings).await?;
    *stage = ProbeStage::Connected;

    conn.authenticate(AuthMode::Strict).await?;
    *stage = ProbeStage::Authenticated;

    let cubes = conn.cube_list().await?;
    let planets = conn.planets().await?;
    *stage = ProbeStage::Inventoried;

    conn.close().await;
    Ok((cubes, planets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use podswarm_proto::Coords;
    use std::time::Duration;

    fn scanner() -> PodScanner {
        PodScanner::new(
            TransportSettings {
                secret: "pw".into(),
                sentinel: "<END>".into(),
                dial_timeout: Duration::from_millis(200),
                read_timeout: Duration::from_millis(200),
            },
            AuthMode::Lenient,
        )
    }

    fn planet(name: &str, x: f64) -> Planet {
        Planet {
            name: name.into(),
            position: Coords { x, y: 0.0, z: 0.0 },
            ..Default::default()
        }
    }

    #[test]
    fn test_failed_results_are_not_merged() {
        let mut scanner = scanner();
        scanner.add_result(PodInventory::reachable(
            Endpoint::new("10.0.0.1", 10002),
            vec!["a_BASE".into(), "b_BASE".into()],
            vec![planet("Terra", 5.0)],
        ));
        scanner.add_result(PodInventory::failed(
            Endpoint::new("10.0.0.1", 10005),
            ProbeStage::Pending,
            "refused",
        ));

        let summary = scanner.summary();
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.reachable, 1);
        assert_eq!(summary.total_cubes, 2);
        assert_eq!(summary.unique_planets, 1);
        assert!(scanner
            .cubes()
            .values()
            .all(|e| *e == Endpoint::new("10.0.0.1", 10002)));
    }

    #[test]
    fn test_later_result_overwrites_key() {
        let mut scanner = scanner();
        let first = Endpoint::new("h", 1);
        let second = Endpoint::new("h", 2);
        scanner.add_result(PodInventory::reachable(
            first,
            vec!["shared_BASE".into()],
            vec![planet("Terra", 1.0)],
        ));
        scanner.add_result(PodInventory::reachable(
            second.clone(),
            vec!["shared_BASE".into()],
            vec![planet("Terra", 9.0)],
        ));

        assert_eq!(scanner.cubes()["shared_BASE"], second);
        assert_eq!(scanner.planets()["Terra"].coordinates.x, 9.0);
        assert_eq!(scanner.summary().total_planets, 2);
        assert_eq!(scanner.summary().unique_planets, 1);
    }

    #[test]
    fn test_cubes_with_prefix_sorted() {
        let mut scanner = scanner();
        scanner.add_result(PodInventory::reachable(
            Endpoint::new("h", 1),
            vec!["u1_z_BASE".into(), "u2_a_BASE".into(), "u1_a_BASE".into()],
            Vec::new(),
        ));
        assert_eq!(scanner.cubes_with_prefix("u1_"), vec!["u1_a_BASE", "u1_z_BASE"]);
    }

    #[tokio::test]
    async fn test_connections_require_matching_cubes() {
        let scanner = scanner();
        let err = scanner
            .connections_for_prefix("nobody_", &Registry::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_unreachable_pod_fails_with_reason() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let scanner = scanner();
        let result = scanner.scan_one(&Endpoint::new("127.0.0.1", port)).await;
        assert!(!result.success);
        assert_eq!(result.stage, ProbeStage::Pending);
        assert!(!result.error.unwrap_or_default().is_empty());
        assert!(scanner.results().is_empty());
    }
}
