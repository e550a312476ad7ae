//! Construct templates, their tabular views and their remote lifecycle
//!
//! A construct moves through `loaded -> spawned -> linked -> (un)frozen* -> despawned`.
//! Remote names of parts carry the unit prefix and, once spawned, the `_BASE`
//! anchor suffix; every link and freeze operation works on the anchor names.

mod manager;
mod tables;
mod template;

pub use manager::{stiff_joint_params, ConstructManager, DespawnReport, NukeReport};
pub use template::{ConstructInstance, ConstructTemplate, PartSpec, TemplateSource};
