//! Construct templates and their unit-bound instances

use crate::registry::JointLink;
use crate::{Result, SwarmError};
use podswarm_common::{base_name, Endpoint, UnitId, Vec3};
use podswarm_proto::JointParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One named part at a position relative to the template's own frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSpec {
    pub name: String,
    pub position: [f64; 3],
}

impl PartSpec {
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }
}

/// Parts, chain topology and the joint settings applied to every link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructTemplate {
    pub cubes: Vec<PartSpec>,
    pub chains: Vec<Vec<String>>,
    pub joint_type: String,
    pub joint_params: JointParams,
}

/// Where a template is read from
#[derive(Debug, Clone)]
pub enum TemplateSource {
    Inline(String),
    File(PathBuf),
}

impl TemplateSource {
    pub fn read(&self) -> Result<ConstructTemplate> {
        match self {
            TemplateSource::Inline(text) => ConstructTemplate::from_json(text),
            TemplateSource::File(path) => ConstructTemplate::from_file(path),
        }
    }
}

impl ConstructTemplate {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| SwarmError::Validation(format!("invalid construct template: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Prefix every part name and chain member with the unit id
    ///
    /// Chain members are rewritten whether or not they name a declared part.
    pub fn prefixed(mut self, unit: &UnitId) -> Self {
        let prefix = unit.prefix();
        for part in &mut self.cubes {
            part.name.insert_str(0, &prefix);
        }
        for member in self.chains.iter_mut().flatten() {
            member.insert_str(0, &prefix);
        }
        self
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.cubes.iter().map(PartSpec::position).collect()
    }

    pub fn centroid(&self) -> Vec3 {
        Vec3::centroid(&self.positions())
    }

    /// Largest centroid-to-part distance
    pub fn bounding_radius(&self) -> f64 {
        let centroid = self.centroid();
        self.positions()
            .into_iter()
            .map(|p| p.distance(centroid))
            .fold(0.0, f64::max)
    }

    /// Absolute part positions with the centroid moved onto `placement`
    pub fn placed_at(&self, placement: Vec3) -> Vec<(String, Vec3)> {
        let shift = placement - self.centroid();
        self.cubes
            .iter()
            .map(|part| (part.name.clone(), part.position() + shift))
            .collect()
    }

    /// Chains that contribute at least one pair, in anchor form
    pub fn anchor_chains(&self) -> Vec<Vec<String>> {
        self.chains
            .iter()
            .filter(|chain| chain.len() >= 2)
            .map(|chain| chain.iter().map(|m| base_name(m)).collect())
            .collect()
    }

    /// One link per consecutive pair of every chain, between anchors
    pub fn links(&self) -> Vec<JointLink> {
        self.anchor_chains()
            .iter()
            .flat_map(|chain| {
                chain
                    .windows(2)
                    .map(|pair| JointLink::new(&self.joint_type, &pair[0], &pair[1]))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

/// A template bound to a unit id and a target pod
#[derive(Debug, Clone)]
pub struct ConstructInstance {
    pub unit: UnitId,
    pub endpoint: Endpoint,
    pub template: ConstructTemplate,
}

impl ConstructInstance {
    /// Read the template and prefix its names with `unit`
    pub fn load(source: &TemplateSource, unit: UnitId, endpoint: Endpoint) -> Result<Self> {
        let template = source.read()?;
        Ok(Self::bind(template, unit, endpoint))
    }

    /// Bind an unprefixed template
    pub fn bind(template: ConstructTemplate, unit: UnitId, endpoint: Endpoint) -> Self {
        let template = template.prefixed(&unit);
        Self {
            unit,
            endpoint,
            template,
        }
    }
}
