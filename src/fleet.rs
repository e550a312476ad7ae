//! Fleet orchestration across placements and pods
//!
//! Placement is planned up front for every member so capacity problems abort
//! before anything is spawned. Members are then built concurrently (spawn,
//! link, unfreeze) and torn down one at a time with a pause in between.

use crate::config::{ScanConfig, SwarmConfig};
use crate::construct::{ConstructInstance, ConstructManager, ConstructTemplate, TemplateSource};
use crate::fanout::FanOutReport;
use crate::placement::{plan_slots, FleetGeometry, Slot};
use crate::registry::Registry;
use crate::scanner::{PodInventory, PodScanner};
use crate::transport::Transport;
use crate::Result;
use futures::future::join_all;
use podswarm_common::{Endpoint, UnitId, Vec3};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// What to build and how to name it
#[derive(Debug, Clone)]
pub struct FleetSpec {
    pub template: TemplateSource,
    /// Constructs per reference center
    pub count: usize,
    pub role: String,
    pub domain: String,
    pub start_generation: u32,
    pub start_version: u32,
    /// Reference centers; the origin when empty
    pub centers: Vec<Vec3>,
    pub offset: Vec3,
}

impl FleetSpec {
    pub fn new(template: TemplateSource, count: usize) -> Self {
        Self {
            template,
            count,
            role: "ARC".to_string(),
            domain: "openfluke.com".to_string(),
            start_generation: 1,
            start_version: 1,
            centers: Vec::new(),
            offset: Vec3::ZERO,
        }
    }

    fn centers_or_origin(&self) -> Vec<Vec3> {
        if self.centers.is_empty() {
            vec![Vec3::ZERO]
        } else {
            self.centers.clone()
        }
    }
}

/// Outcome of building one member
#[derive(Debug, Clone)]
pub struct FleetMember {
    pub unit: UnitId,
    pub slot: Slot,
    pub spawned: usize,
    pub failed_parts: usize,
    pub links: usize,
    pub error: Option<String>,
}

/// Members built on one pod, in member order
#[derive(Debug, Clone)]
pub struct Fleet {
    pub endpoint: Endpoint,
    pub geometry: FleetGeometry,
    pub members: Vec<FleetMember>,
}

impl Fleet {
    pub fn units(&self) -> Vec<UnitId> {
        self.members.iter().map(|m| m.unit.clone()).collect()
    }

    pub fn is_healthy(&self) -> bool {
        self.members
            .iter()
            .all(|m| m.error.is_none() && m.failed_parts == 0)
    }
}

/// A full spawn, hold and teardown
#[derive(Debug)]
pub struct FleetCycle {
    pub fleet: Fleet,
    pub teardown: FanOutReport,
}

/// Placement decided, nothing sent yet
#[derive(Debug, Clone)]
pub struct FleetPlan {
    pub endpoint: Endpoint,
    pub geometry: FleetGeometry,
    pub template: ConstructTemplate,
    pub assignments: Vec<(UnitId, Slot)>,
}

pub struct FleetDriver {
    config: SwarmConfig,
    transport: Transport,
    registry: Registry,
}

impl FleetDriver {
    pub fn new(config: SwarmConfig, registry: Registry) -> Result<Self> {
        let transport = Transport::from_config(&config)?;
        Ok(Self {
            config,
            transport,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Manager for the configured endpoint
    pub fn manager(&self) -> ConstructManager {
        self.manager_for(self.transport.endpoint())
    }

    pub fn manager_for(&self, endpoint: &Endpoint) -> ConstructManager {
        ConstructManager::new(
            self.transport.for_endpoint(endpoint.clone()),
            self.registry.clone(),
            self.config.nuke.clone(),
        )
    }

    /// Scan and keep the pods that answered
    pub async fn discover(&self, scan: &ScanConfig) -> Vec<PodInventory> {
        let mut scanner = PodScanner::from_config(&self.config);
        scanner
            .scan_all(scan)
            .await
            .iter()
            .filter(|r| r.success)
            .cloned()
            .collect()
    }

    /// Measure the template and assign a slot and unit id to every member
    ///
    /// Slots already claimed in the registry are kept clear. `first_index`
    /// continues member numbering from earlier plans so unit ids stay
    /// disjoint across pods.
    pub fn plan(&self, endpoint: Endpoint, spec: &FleetSpec, first_index: u32) -> Result<FleetPlan> {
        let template = spec.template.read()?;
        let geometry = FleetGeometry::new(template.bounding_radius(), spec.offset);
        let occupied: Vec<Vec3> = self.registry.slots().iter().map(|s| s.position).collect();
        let slots = plan_slots(&spec.centers_or_origin(), spec.count, &geometry, &occupied)?;

        let assignments = slots
            .into_iter()
            .zip(first_index..)
            .map(|(slot, index)| {
                let unit = UnitId::for_member(
                    &spec.role,
                    &spec.domain,
                    spec.start_generation,
                    spec.start_version,
                    index,
                );
                (unit, slot)
            })
            .collect();

        Ok(FleetPlan {
            endpoint,
            geometry,
            template,
            assignments,
        })
    }

    /// Spawn, link and unfreeze a fleet on the configured endpoint
    pub async fn spawn_fleet(&self, spec: &FleetSpec) -> Result<Fleet> {
        let plan = self.plan(self.transport.endpoint().clone(), spec, 0)?;
        Ok(self.execute(plan).await)
    }

    /// Build every member of `plan` concurrently
    pub async fn execute(&self, plan: FleetPlan) -> Fleet {
        info!(
            endpoint = %plan.endpoint,
            members = plan.assignments.len(),
            orbit_radius = plan.geometry.orbit_radius,
            min_separation = plan.geometry.min_separation,
            "Spawning fleet"
        );

        let mut join_set = JoinSet::new();
        for (index, (unit, slot)) in plan.assignments.into_iter().enumerate() {
            let manager = self.manager_for(&plan.endpoint);
            let instance = ConstructInstance::bind(plan.template.clone(), unit, plan.endpoint.clone());
            join_set.spawn(async move { (index, build_member(manager, instance, slot).await) });
        }

        let mut members = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(member) => members.push(member),
                Err(e) => error!(endpoint = %plan.endpoint, error = %e, "Member task did not complete"),
            }
        }
        members.sort_by_key(|(index, _)| *index);

        Fleet {
            endpoint: plan.endpoint,
            geometry: plan.geometry,
            members: members.into_iter().map(|(_, m)| m).collect(),
        }
    }

    /// Despawn members one after another, pausing between them
    pub async fn teardown(&self, fleet: &Fleet) -> FanOutReport {
        let manager = self.manager_for(&fleet.endpoint);
        let delay = self.config.despawn_delay();
        let mut report = FanOutReport::default();

        for (i, member) in fleet.members.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let despawned = manager.despawn(&member.unit).await;
            report.merge(despawned.commands);
        }

        info!(
            endpoint = %fleet.endpoint,
            despawned = report.succeeded.len(),
            failed = report.failed.len(),
            "Fleet torn down"
        );
        report
    }

    /// Spawn a fleet, hold it for the configured time, then tear it down
    pub async fn run_cycle(&self, spec: &FleetSpec) -> Result<FleetCycle> {
        self.registry.clear_slots();
        let fleet = self.spawn_fleet(spec).await?;

        let hold = Duration::from_millis(self.config.fleet.hold_ms);
        if !hold.is_zero() {
            info!(hold_ms = self.config.fleet.hold_ms, "Holding fleet");
            tokio::time::sleep(hold).await;
        }

        let teardown = self.teardown(&fleet).await;
        Ok(FleetCycle { fleet, teardown })
    }

    /// One fleet per reachable pod, centered on that pod's planets
    ///
    /// Every pod is planned before any member is spawned.
    pub async fn spawn_across(&self, inventories: &[PodInventory], spec: &FleetSpec) -> Result<Vec<Fleet>> {
        let mut plans = Vec::new();
        let mut next_index = 0u32;
        for inventory in inventories.iter().filter(|i| i.success) {
            let mut pod_spec = spec.clone();
            pod_spec.centers = inventory.planet_centers();
            let plan = self.plan(inventory.endpoint.clone(), &pod_spec, next_index)?;
            next_index += plan.assignments.len() as u32;
            plans.push(plan);
        }

        if plans.is_empty() {
            warn!("No reachable pods to spawn on");
        }
        Ok(join_all(plans.into_iter().map(|plan| self.execute(plan))).await)
    }
}

async fn build_member(manager: ConstructManager, instance: ConstructInstance, slot: Slot) -> FleetMember {
    let spawned = manager.spawn(&instance, slot.position).await;
    let mut member = FleetMember {
        unit: instance.unit.clone(),
        slot,
        spawned: spawned.succeeded.len(),
        failed_parts: spawned.failed.len(),
        links: 0,
        error: None,
    };
    if spawned.succeeded.is_empty() && !instance.template.cubes.is_empty() {
        member.error = Some("no parts spawned".to_string());
        return member;
    }

    match manager.link(&instance).await {
        Ok(links) => member.links = links.len(),
        Err(e) => {
            warn!(unit = %instance.unit, endpoint = %manager.endpoint(), error = %e, "Link failed");
            member.error = Some(e.to_string());
            return member;
        }
    }

    let unfrozen = manager.unfreeze(&instance.unit).await;
    if !unfrozen.is_clean() {
        member.error = Some(format!("{} cubes failed to unfreeze", unfrozen.failed.len()));
    }
    member
}
