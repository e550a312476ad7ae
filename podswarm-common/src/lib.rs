//! Shared types between the podswarm transport, scanner and construct manager
//!
//! This crate defines values that every layer agrees on:
//! - `Vec3` positions in the remote world
//! - `Endpoint` host/port pairs identifying one pod
//! - `UnitId` naming for construct instances
//! - Protocol constants that must match the remote host exactly

use std::fmt;
use std::ops::{Add, Sub};

/// Frame terminator appended to every message on the wire
pub const FRAME_SENTINEL: &str = "<???DONE???---";

/// Shared secret the remote host expects as the first frame on a connection
pub const DEFAULT_AUTH_SECRET: &str = "my_secure_password";

/// Substring the remote host includes in an accepted authentication reply
pub const AUTH_SUCCESS_MARKER: &str = "auth_success";

/// Suffix the remote host gives to the physical anchor of a spawned part
pub const BASE_SUFFIX: &str = "_BASE";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 14000;

/// A point or offset in the remote world
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Vec3) -> f64 {
        (self - other).length()
    }

    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// True when no component is NaN or infinite
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Arithmetic mean of `points`, or the origin for an empty slice
    pub fn centroid(points: &[Vec3]) -> Vec3 {
        if points.is_empty() {
            return Vec3::ZERO;
        }
        let sum = points.iter().fold(Vec3::ZERO, |acc, p| acc + *p);
        sum.scale(1.0 / points.len() as f64)
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        v.to_array()
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// One remote simulation pod
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`
    pub fn parse(s: &str) -> Option<Self> {
        let (host, port) = s.trim().rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port = port.parse().ok()?;
        Some(Self::new(host, port))
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Identifier prefixed onto every part and chain name of one construct instance
///
/// Formatted as `[ROLE]-TAG-gen<generation>-v<version>` where `TAG` is the
/// upper-cased first letter of each dot-separated label of the domain, so
/// `("ARC", "openfluke.com", 1, 10)` becomes `[ARC]-OC-gen1-v10`. Uniqueness
/// comes from callers picking disjoint (generation, version) ranges.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(role: &str, domain: &str, generation: u32, version: u32) -> Self {
        let tag: String = domain
            .split('.')
            .filter_map(|label| label.chars().next())
            .flat_map(char::to_uppercase)
            .collect();
        Self(format!("[{}]-{}-gen{}-v{}", role, tag, generation, version))
    }

    /// Id of the `index`-th member of a fleet, advancing the generation every 100 members
    pub fn for_member(
        role: &str,
        domain: &str,
        start_generation: u32,
        start_version: u32,
        index: u32,
    ) -> Self {
        Self::new(
            role,
            domain,
            start_generation + index / 100,
            start_version + index % 100,
        )
    }

    /// Wrap an identifier produced elsewhere (e.g. typed on the command line)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix carried by every remote name belonging to this unit
    pub fn prefix(&self) -> String {
        format!("{}_", self.0)
    }

    pub fn owns(&self, name: &str) -> bool {
        name.strip_prefix(self.0.as_str())
            .map(|rest| rest.starts_with('_'))
            .unwrap_or(false)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote name of a part's physical anchor
pub fn base_name(part: &str) -> String {
    format!("{}{}", part, BASE_SUFFIX)
}

/// Deterministic joint name for a link between two anchors
pub fn joint_name(joint_type: &str, cube_a: &str, cube_b: &str) -> String {
    format!("joint_{}_{}_{}", joint_type, cube_a, cube_b)
}

const _: () = {
    assert!(!FRAME_SENTINEL.is_empty(), "frame sentinel must not be empty");
    assert!(!BASE_SUFFIX.is_empty(), "base suffix must not be empty");
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_format() {
        let id = UnitId::new("ARC", "openfluke.com", 1, 10);
        assert_eq!(id.as_str(), "[ARC]-OC-gen1-v10");
    }

    #[test]
    fn test_unit_id_member_rollover() {
        let id = UnitId::for_member("ARC", "openfluke.com", 1, 1, 150);
        assert_eq!(id.as_str(), "[ARC]-OC-gen2-v51");
    }

    #[test]
    fn test_unit_id_owns_only_exact_prefix() {
        let id = UnitId::new("ARC", "openfluke.com", 1, 1);
        assert!(id.owns("[ARC]-OC-gen1-v1_head_BASE"));
        assert!(!id.owns("[ARC]-OC-gen1-v10_head_BASE"));
        assert!(!id.owns("[ARC]-OC-gen1-v1"));
    }

    #[test]
    fn test_centroid() {
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(1.0, 3.0, -3.0),
        ];
        assert_eq!(Vec3::centroid(&points), Vec3::new(1.0, 1.0, -1.0));
        assert_eq!(Vec3::centroid(&[]), Vec3::ZERO);
    }

    #[test]
    fn test_vec3_finite() {
        assert!(Vec3::new(1.0, 2.0, 3.0).is_finite());
        assert!(!Vec3::new(f64::NAN, 0.0, 0.0).is_finite());
        assert!(!Vec3::new(0.0, f64::INFINITY, 0.0).is_finite());
    }

    #[test]
    fn test_endpoint_parse() {
        let ep = Endpoint::parse("192.168.0.227:10002").expect("valid endpoint");
        assert_eq!(ep.host, "192.168.0.227");
        assert_eq!(ep.port, 10002);
        assert_eq!(ep.to_string(), "192.168.0.227:10002");
        assert!(Endpoint::parse("nohost").is_none());
        assert!(Endpoint::parse(":14000").is_none());
        assert!(Endpoint::parse("host:notaport").is_none());
    }

    #[test]
    fn test_joint_name() {
        assert_eq!(
            joint_name("hinge", "a_BASE", "b_BASE"),
            "joint_hinge_a_BASE_b_BASE"
        );
    }
}
