//! Remote lifecycle of constructs on one pod

use super::template::ConstructInstance;
use crate::config::NukeConfig;
use crate::fanout::{fan_out, FanOutReport};
use crate::registry::{JointLink, PurgeSummary, Registry};
use crate::transport::{Reply, Transport};
use crate::{Result, SwarmError};
use podswarm_common::{base_name, Endpoint, UnitId, Vec3};
use podswarm_proto::{Command, JointParams};
use tracing::{debug, info, warn};

/// Parameters that lock a joint in place
pub fn stiff_joint_params() -> JointParams {
    [
        ("limit_upper", 0.0),
        ("limit_lower", 0.0),
        ("motor_enable", 1.0),
        ("motor_target_velocity", 0.0),
        ("motor_max_impulse", 1000.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Outcome of an unconditional wipe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NukeReport {
    pub passes: u32,
    pub despawned: usize,
    pub cleared: bool,
}

/// Outcome of a despawn, including what was dropped from the registry
#[derive(Debug, Default)]
pub struct DespawnReport {
    pub commands: FanOutReport,
    pub purged: PurgeSummary,
}

/// Spawns, links, freezes and removes constructs on the transport's pod
#[derive(Clone)]
pub struct ConstructManager {
    transport: Transport,
    registry: Registry,
    nuke: NukeConfig,
}

impl ConstructManager {
    pub fn new(transport: Transport, registry: Registry, nuke: NukeConfig) -> Self {
        Self {
            transport,
            registry,
            nuke,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Spawn every part with the template centroid moved onto `placement`
    ///
    /// One task per part. Parts with non-finite coordinates are reported as
    /// failed without being sent. Only delivered parts are recorded.
    pub async fn spawn(&self, instance: &ConstructInstance, placement: Vec3) -> FanOutReport {
        let parts = instance.template.placed_at(placement);
        let mut rejected = FanOutReport::default();
        let mut positions = Vec::with_capacity(parts.len());
        for (name, position) in parts {
            if position.is_finite() {
                positions.push((name, position));
            } else {
                warn!(unit = %instance.unit, cube = %name, "Rejecting part with non-finite position");
                rejected.failed.push((
                    name,
                    SwarmError::Validation(format!("non-finite position {}", position)),
                ));
            }
        }

        self.registry.claim_slot(placement, instance.unit.clone());

        let unit = instance.unit.clone();
        let transport = self.transport.clone();
        let mut report = fan_out(positions, |(name, position)| {
            let transport = transport.clone();
            let unit = unit.clone();
            async move {
                let outcome = transport
                    .execute(&Command::spawn_base(name.clone(), position))
                    .await
                    .map(|_| ());
                if let Err(e) = &outcome {
                    warn!(unit = %unit, endpoint = %transport.endpoint(), cube = %name, error = %e, "Spawn failed");
                }
                (name, outcome)
            }
        })
        .await;

        self.registry
            .record_cubes(report.succeeded.iter().map(|name| base_name(name)));
        report.merge(rejected);

        info!(
            unit = %instance.unit,
            endpoint = %self.endpoint(),
            spawned = report.succeeded.len(),
            failed = report.failed.len(),
            "Construct spawned"
        );
        report
    }

    /// Link every chain of the instance with a single batched command
    ///
    /// Every consecutive pair is recorded as a link; pairs already recorded
    /// under the same joint name are not duplicated.
    pub async fn link(&self, instance: &ConstructInstance) -> Result<Vec<JointLink>> {
        let template = &instance.template;
        let chains = template.anchor_chains();
        if chains.is_empty() {
            debug!(unit = %instance.unit, "No chains to link");
            return Ok(Vec::new());
        }

        let command = Command::LinkCubeChains {
            chains,
            joint_type: template.joint_type.clone(),
            joint_params: template.joint_params.clone(),
        };
        let reply = self.transport.request(&command).await?;
        if !reply.is_complete() {
            warn!(unit = %instance.unit, endpoint = %self.endpoint(), reply = ?reply, "Link acknowledgement incomplete");
        }

        let links = template.links();
        for link in &links {
            self.registry.record_link(link.clone());
        }
        info!(unit = %instance.unit, links = links.len(), "Construct linked");
        Ok(links)
    }

    /// Explicit joint between two existing anchors
    pub async fn create_joint(&self, cube_a: &str, cube_b: &str, joint_type: &str) -> Result<JointLink> {
        let link = JointLink::new(joint_type, cube_a, cube_b);
        let command = Command::CreateJoint {
            cube1: link.cube_a.clone(),
            cube2: link.cube_b.clone(),
            joint_type: link.joint_type.clone(),
            joint_name: link.joint_name.clone(),
        };
        self.transport.execute(&command).await?;
        self.registry.record_link(link.clone());
        Ok(link)
    }

    pub async fn unfreeze(&self, unit: &UnitId) -> FanOutReport {
        self.set_frozen(unit, false).await
    }

    pub async fn refreeze(&self, unit: &UnitId) -> FanOutReport {
        self.set_frozen(unit, true).await
    }

    /// Toggle the freeze flag of every registered cube of `unit`
    pub async fn set_frozen(&self, unit: &UnitId, freeze: bool) -> FanOutReport {
        let cubes = self.registry.cubes_for_unit(unit);
        let transport = self.transport.clone();
        let report = fan_out(cubes, |cube| {
            let transport = transport.clone();
            async move {
                let command = Command::FreezeCube {
                    cube_name: cube.clone(),
                    freeze,
                };
                let outcome = transport.execute(&command).await.map(|_| ());
                if let Err(e) = &outcome {
                    warn!(endpoint = %transport.endpoint(), cube = %cube, freeze, error = %e, "Freeze toggle failed");
                }
                (cube, outcome)
            }
        })
        .await;
        debug!(unit = %unit, freeze, cubes = report.total(), "Freeze flag toggled");
        report
    }

    /// Remove every registered cube of `unit`, then purge what was delivered
    pub async fn despawn(&self, unit: &UnitId) -> DespawnReport {
        let cubes = self.registry.cubes_for_unit(unit);
        let commands = self.despawn_cubes(cubes).await;

        let mut purged = PurgeSummary {
            links: self.registry.remove_links_touching(&commands.succeeded),
            cubes: self.registry.remove_cubes(&commands.succeeded),
            slots: 0,
        };
        if self.registry.cubes_for_unit(unit).is_empty() {
            purged.slots = self.registry.release_slots(unit);
        }

        info!(
            unit = %unit,
            endpoint = %self.endpoint(),
            despawned = commands.succeeded.len(),
            failed = commands.failed.len(),
            "Construct despawned"
        );
        DespawnReport { commands, purged }
    }

    /// Despawn every registered cube regardless of owner
    pub async fn despawn_all(&self) -> DespawnReport {
        let commands = self.despawn_cubes(self.registry.cubes()).await;
        let mut purged = PurgeSummary {
            links: self.registry.remove_links_touching(&commands.succeeded),
            cubes: self.registry.remove_cubes(&commands.succeeded),
            slots: 0,
        };
        if self.registry.cube_count() == 0 {
            purged.slots = self.registry.slot_count();
            self.registry.clear_slots();
        }
        DespawnReport { commands, purged }
    }

    async fn despawn_cubes(&self, cubes: Vec<String>) -> FanOutReport {
        let transport = self.transport.clone();
        fan_out(cubes, |cube| {
            let transport = transport.clone();
            async move {
                let command = Command::DespawnCube {
                    cube_name: cube.clone(),
                };
                let outcome = transport.execute(&command).await.map(|_| ());
                if let Err(e) = &outcome {
                    warn!(endpoint = %transport.endpoint(), cube = %cube, error = %e, "Despawn failed");
                }
                (cube, outcome)
            }
        })
        .await
    }

    /// Despawn whatever the pod reports, pass after pass, until it reports nothing
    ///
    /// Uses one connection for every pass. Cubes removed this way are also
    /// dropped from the registry.
    pub async fn nuke(&self) -> Result<NukeReport> {
        let mut conn = self.transport.open().await?;
        let mut report = NukeReport::default();
        let delay = self.nuke.pass_delay();

        for pass in 1..=self.nuke.max_passes {
            report.passes = pass;
            let cubes = conn.cube_list().await?;
            if cubes.is_empty() {
                report.cleared = true;
                break;
            }

            info!(endpoint = %self.endpoint(), pass, cubes = cubes.len(), "Nuking cubes");
            for cube in &cubes {
                let command = Command::DespawnCube {
                    cube_name: cube.clone(),
                };
                conn.send(&command).await?;
            }
            report.despawned += cubes.len();
            self.registry.remove_links_touching(&cubes);
            self.registry.remove_cubes(&cubes);

            tokio::time::sleep(delay).await;
        }

        if !report.cleared {
            warn!(endpoint = %self.endpoint(), passes = report.passes, "Pod still reports cubes after nuke");
        }
        conn.close().await;
        Ok(report)
    }

    pub async fn joints_for_cube(&self, cube: &str) -> Result<Vec<String>> {
        self.transport.joints_for_cube(cube).await
    }

    /// Send `set_joint_params` for every link over one shared connection
    ///
    /// A joint whose acknowledgement does not arrive is reported as failed and
    /// the rest continue. A broken connection aborts the batch.
    pub async fn set_joint_params_bulk(
        &self,
        links: &[JointLink],
        params: &JointParams,
    ) -> Result<FanOutReport> {
        let mut report = FanOutReport::default();
        if links.is_empty() {
            return Ok(report);
        }

        let mut conn = self.transport.open().await?;
        for link in links {
            let command = Command::SetJointParams {
                joint_name: link.joint_name.clone(),
                params: params.clone(),
            };
            let outcome = conn
                .request(&command)
                .await?
                .into_complete(self.endpoint(), "joint parameter acknowledgement")
                .map(|_| ());
            if let Err(e) = &outcome {
                warn!(endpoint = %self.endpoint(), joint = %link.joint_name, error = %e, "Joint update failed");
            }
            report.record(link.joint_name.clone(), outcome);
        }
        conn.close().await;
        Ok(report)
    }

    /// Lock every registered joint of `unit`
    pub async fn stiffen(&self, unit: &UnitId) -> Result<FanOutReport> {
        let links = self.registry.links_for_unit(unit);
        debug!(unit = %unit, joints = links.len(), "Stiffening joints");
        self.set_joint_params_bulk(&links, &stiff_joint_params()).await
    }

    pub async fn set_joint_param(&self, joint_name: &str, param_name: &str, value: f64) -> Result<Reply> {
        let command = Command::SetJointParam {
            joint_name: joint_name.to_string(),
            param_name: param_name.to_string(),
            value,
        };
        self.transport.request(&command).await
    }

    pub async fn set_color(&self, cube: &str, hex: &str) -> Result<()> {
        let command = Command::SetColor {
            cube_name: cube.to_string(),
            hex: hex.to_string(),
        };
        self.transport.execute(&command).await.map(|_| ())
    }

    pub async fn apply_force(&self, target: &str, rotate: Vec3) -> Result<Reply> {
        let command = Command::ApplyForce {
            rotate: rotate.to_array(),
            target: target.to_string(),
        };
        self.transport.request(&command).await
    }

    /// Register cubes the pod reports under `unit`'s prefix
    ///
    /// Lets a fresh process despawn constructs it did not spawn. Returns how
    /// many new names were recorded.
    pub async fn adopt_remote(&self, unit: &UnitId) -> Result<usize> {
        let remote = self.transport.cube_list().await?;
        let adopted: Vec<String> = remote
            .into_iter()
            .filter(|name| unit.owns(name) && !self.registry.contains_cube(name))
            .collect();
        let count = adopted.len();
        self.registry.record_cubes(adopted);
        debug!(unit = %unit, adopted = count, "Adopted remote cubes");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, SwarmConfig};
    use crate::construct::{ConstructTemplate, PartSpec};
    use crate::transport::TransportSettings;
    use crate::ErrorKind;

    fn offline_manager(registry: &Registry) -> ConstructManager {
        let config = SwarmConfig::default();
        let transport = Transport::new(
            Endpoint::new("127.0.0.1", 9),
            TransportSettings::from_config(&config),
            AuthMode::Lenient,
        );
        ConstructManager::new(transport, registry.clone(), NukeConfig::default())
    }

    #[tokio::test]
    async fn test_non_finite_parts_are_never_sent() {
        let registry = Registry::new();
        let manager = offline_manager(&registry);
        let template = ConstructTemplate {
            cubes: vec![
                PartSpec {
                    name: "a".into(),
                    position: [f64::NAN, 0.0, 0.0],
                },
                PartSpec {
                    name: "b".into(),
                    position: [1.0, 0.0, 0.0],
                },
            ],
            ..Default::default()
        };
        let unit = UnitId::from_raw("u1");
        let instance = ConstructInstance::bind(template, unit.clone(), manager.endpoint().clone());

        let report = manager.spawn(&instance, Vec3::ZERO).await;
        assert_eq!(report.failed.len(), 2);
        assert!(report
            .failed
            .iter()
            .all(|(_, e)| e.kind() == ErrorKind::Validation));
        assert!(registry.cubes_for_unit(&unit).is_empty());
    }

    #[tokio::test]
    async fn test_empty_operations_skip_the_network() {
        let registry = Registry::new();
        let manager = offline_manager(&registry);
        let unit = UnitId::from_raw("u2");

        assert_eq!(manager.unfreeze(&unit).await.total(), 0);
        assert_eq!(manager.despawn(&unit).await.commands.total(), 0);
        assert_eq!(manager.stiffen(&unit).await.unwrap().total(), 0);

        let instance = ConstructInstance::bind(
            ConstructTemplate::default(),
            unit,
            manager.endpoint().clone(),
        );
        assert!(manager.link(&instance).await.unwrap().is_empty());
    }

    #[test]
    fn test_stiff_params() {
        let params = stiff_joint_params();
        assert_eq!(params.len(), 5);
        assert_eq!(params["motor_enable"], 1.0);
        assert_eq!(params["motor_max_impulse"], 1000.0);
        assert_eq!(params["limit_upper"], 0.0);
    }
}
