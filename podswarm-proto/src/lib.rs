//! Wire protocol definitions for podswarm
//!
//! Defines:
//! - `Command` - one variant per command `type` the remote host understands
//! - Reply payloads (`CubeList`, `JointsForCube`, planet groups)
//! - Frame encoding: JSON body followed by the sentinel, no length prefix
//!
//! Nothing in here touches a socket; the transport layer owns I/O.

use podswarm_common::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Numeric joint parameters, ordered by name
pub type JointParams = BTreeMap<String, f64>;

/// A command sent to the remote host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SpawnCube {
        cube_name: String,
        position: [f64; 3],
        rotation: [f64; 3],
        is_base: bool,
    },
    DespawnCube {
        cube_name: String,
    },
    LinkCubeChains {
        chains: Vec<Vec<String>>,
        joint_type: String,
        joint_params: JointParams,
    },
    CreateJoint {
        cube1: String,
        cube2: String,
        joint_type: String,
        joint_name: String,
    },
    SetJointParam {
        joint_name: String,
        param_name: String,
        value: f64,
    },
    SetJointParams {
        joint_name: String,
        params: JointParams,
    },
    FreezeCube {
        cube_name: String,
        freeze: bool,
    },
    GetCubeList,
    GetJointsForCube {
        cube_name: String,
    },
    GetPlanets,
    SetColor {
        cube_name: String,
        hex: String,
    },
    ApplyForce {
        rotate: [f64; 3],
        target: String,
    },
}

impl Command {
    /// Spawn a part anchor at `position` with zero rotation
    pub fn spawn_base(cube_name: impl Into<String>, position: Vec3) -> Self {
        Command::SpawnCube {
            cube_name: cube_name.into(),
            position: position.to_array(),
            rotation: [0.0; 3],
            is_base: true,
        }
    }

    /// The `type` tag as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Command::SpawnCube { .. } => "spawn_cube",
            Command::DespawnCube { .. } => "despawn_cube",
            Command::LinkCubeChains { .. } => "link_cube_chains",
            Command::CreateJoint { .. } => "create_joint",
            Command::SetJointParam { .. } => "set_joint_param",
            Command::SetJointParams { .. } => "set_joint_params",
            Command::FreezeCube { .. } => "freeze_cube",
            Command::GetCubeList => "get_cube_list",
            Command::GetJointsForCube { .. } => "get_joints_for_cube",
            Command::GetPlanets => "get_planets",
            Command::SetColor { .. } => "set_color",
            Command::ApplyForce { .. } => "apply_force",
        }
    }

    /// Whether the remote host answers this command with a framed reply
    ///
    /// Spawn, despawn, freeze, create_joint and set_color are fire-and-forget;
    /// reading after them would consume the reply of the next request.
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            Command::LinkCubeChains { .. }
                | Command::SetJointParam { .. }
                | Command::SetJointParams { .. }
                | Command::GetCubeList
                | Command::GetJointsForCube { .. }
                | Command::GetPlanets
                | Command::ApplyForce { .. }
        )
    }
}

/// Serialize `command` and append the sentinel
pub fn encode_frame(command: &Command, sentinel: &str) -> serde_json::Result<Vec<u8>> {
    let mut data = serde_json::to_vec(command)?;
    data.extend_from_slice(sentinel.as_bytes());
    Ok(data)
}

/// The authentication frame: bare secret followed by the sentinel
pub fn encode_auth(secret: &str, sentinel: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(secret.len() + sentinel.len());
    data.extend_from_slice(secret.as_bytes());
    data.extend_from_slice(sentinel.as_bytes());
    data
}

/// Byte offset of the first occurrence of `sentinel` in `buf`
pub fn find_sentinel(buf: &[u8], sentinel: &[u8]) -> Option<usize> {
    if sentinel.is_empty() || buf.len() < sentinel.len() {
        return None;
    }
    buf.windows(sentinel.len()).position(|w| w == sentinel)
}

/// Reply to `get_cube_list`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CubeList {
    pub cubes: Vec<String>,
}

impl CubeList {
    /// Parse a reply object; non-string entries in `cubes` are dropped
    pub fn parse(payload: &str) -> serde_json::Result<Self> {
        let object: serde_json::Map<String, Value> = serde_json::from_str(payload)?;
        let cubes = object
            .get("cubes")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self { cubes })
    }
}

/// Reply to `get_joints_for_cube`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointsForCube {
    #[serde(rename = "type")]
    pub kind: String,
    pub cube_name: String,
    pub joints: Vec<String>,
}

/// `{x, y, z}` object used for planet positions and marker lists
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Coords {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Coords> for Vec3 {
    fn from(c: Coords) -> Self {
        Vec3::new(c.x, c.y, c.z)
    }
}

/// A planet as reported by the remote host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Planet {
    pub name: String,
    pub position: Coords,
    pub seed: i64,
    pub biome_type: i64,
    pub resource_locations: Vec<Coords>,
    pub tree_locations: Vec<Coords>,
}

/// Parse a `get_planets` reply: an object whose values are planet arrays, flattened
pub fn parse_planets(payload: &str) -> serde_json::Result<Vec<Planet>> {
    let groups: BTreeMap<String, Vec<Planet>> = serde_json::from_str(payload)?;
    Ok(groups.into_values().flatten().collect())
}
