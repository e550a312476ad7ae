use podswarm_common::{Endpoint, Vec3};
use podswarm_proto::Planet;
use std::fmt;

/// Furthest point a probe reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProbeStage {
    Pending,
    Connected,
    Authenticated,
    Inventoried,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeStage::Pending => "pending",
            ProbeStage::Connected => "connected",
            ProbeStage::Authenticated => "authenticated",
            ProbeStage::Inventoried => "inventoried",
        };
        f.write_str(s)
    }
}

/// Snapshot of one pod taken by a single probe
#[derive(Debug, Clone, PartialEq)]
pub struct PodInventory {
    pub endpoint: Endpoint,
    pub success: bool,
    pub stage: ProbeStage,
    pub error: Option<String>,
    pub cubes: Vec<String>,
    pub planets: Vec<Planet>,
}

impl PodInventory {
    pub fn reachable(endpoint: Endpoint, cubes: Vec<String>, planets: Vec<Planet>) -> Self {
        Self {
            endpoint,
            success: true,
            stage: ProbeStage::Inventoried,
            error: None,
            cubes,
            planets,
        }
    }

    pub fn failed(endpoint: Endpoint, stage: ProbeStage, reason: impl Into<String>) -> Self {
        Self {
            endpoint,
            success: false,
            stage,
            error: Some(reason.into()),
            cubes: Vec::new(),
            planets: Vec::new(),
        }
    }

    /// Planet coordinates, in report order
    pub fn planet_centers(&self) -> Vec<Vec3> {
        self.planets.iter().map(|p| p.position.into()).collect()
    }
}

/// Where a planet was seen
#[derive(Debug, Clone, PartialEq)]
pub struct PlanetLocation {
    pub name: String,
    pub coordinates: Vec3,
    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub attempted: usize,
    pub reachable: usize,
    pub total_cubes: usize,
    pub total_planets: usize,
    pub unique_planets: usize,
}

/// A cube and the counterparts of its joints
#[derive(Debug, Clone, PartialEq)]
pub struct CubeConnection {
    pub cube_name: String,
    pub endpoint: Endpoint,
    pub joints: Vec<JointPeer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointPeer {
    pub joint_name: String,
    /// Other end according to the local link records, if known
    pub connected_cube: Option<String>,
}
