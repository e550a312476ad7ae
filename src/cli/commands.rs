use crate::cli::Commands;
use crate::config::SwarmConfig;
use crate::construct::{ConstructInstance, TemplateSource};
use crate::export;
use crate::fleet::{Fleet, FleetDriver, FleetSpec};
use crate::registry::Registry;
use crate::scanner::{PodInventory, PodScanner};
use anyhow::{Context, Result};
use podswarm_common::{Endpoint, UnitId, Vec3};
use std::path::PathBuf;
use tracing::info;

pub async fn handle_command(command: Commands, mut config: SwarmConfig) -> Result<()> {
    match command {
        Commands::Scan {
            hosts,
            start_port,
            port_step,
            count,
        } => {
            if !hosts.is_empty() {
                config.scan.hosts = hosts;
            }
            if let Some(p) = start_port {
                config.scan.start_port = p;
            }
            if let Some(s) = port_step {
                config.scan.port_step = s;
            }
            if let Some(c) = count {
                config.scan.pods_per_host = c;
            }
            config.validate()?;
            handle_scan(&config).await
        }
        Commands::Probe { target } => handle_probe(&config, target).await,
        Commands::Spawn {
            template,
            count,
            role,
            domain,
            start_generation,
            start_version,
            centers,
            offset,
            hold,
            keep,
            across,
        } => {
            if let Some(h) = hold {
                config.fleet.hold_ms = parse_duration(&h)?;
            }
            let mut spec = FleetSpec::new(TemplateSource::File(template), count);
            spec.role = role;
            spec.domain = domain;
            spec.start_generation = start_generation;
            spec.start_version = start_version;
            spec.centers = centers;
            spec.offset = offset.unwrap_or(Vec3::ZERO);
            handle_spawn(config, spec, keep, across).await
        }
        Commands::Despawn { unit } => handle_despawn(config, UnitId::from_raw(unit)).await,
        Commands::Nuke => handle_nuke(config).await,
        Commands::Tables {
            template,
            unit,
            cubes_csv,
            joints_csv,
        } => handle_tables(&config, template, unit, cubes_csv, joints_csv),
        Commands::Joints { prefix } => handle_joints(&config, &prefix).await,
    }
}

async fn handle_scan(config: &SwarmConfig) -> Result<()> {
    let mut scanner = PodScanner::from_config(config);
    let mut results = scanner.scan_all(&config.scan).await.to_vec();
    results.sort_by(|a, b| a.endpoint.to_string().cmp(&b.endpoint.to_string()));

    print_inventory_header();
    for result in &results {
        print_inventory_row(result);
    }

    let summary = scanner.summary();
    println!();
    println!("Pods reachable:   {}/{}", summary.reachable, summary.attempted);
    println!("Cubes:            {}", summary.total_cubes);
    println!("Planets:          {} ({} unique)", summary.total_planets, summary.unique_planets);

    if !scanner.planets().is_empty() {
        println!();
        println!("{:<24} {:>30} {:>21}", "PLANET", "POSITION", "POD");
        println!("{}", "-".repeat(77));
        for location in scanner.planets().values() {
            println!(
                "{:<24} {:>30} {:>21}",
                truncate(&location.name, 24),
                location.coordinates.to_string(),
                location.endpoint.to_string()
            );
        }
    }
    Ok(())
}

async fn handle_probe(config: &SwarmConfig, target: Option<String>) -> Result<()> {
    let endpoint = match target {
        Some(t) => Endpoint::parse(&t).with_context(|| format!("Invalid endpoint: {}", t))?,
        None => config.endpoint()?,
    };
    let scanner = PodScanner::from_config(config);
    let result = scanner.scan_one(&endpoint).await;

    print_inventory_header();
    print_inventory_row(&result);
    if result.success {
        println!();
        for cube in &result.cubes {
            println!("  {}", cube);
        }
        for planet in &result.planets {
            println!(
                "  planet {} at {} (biome {}, seed {})",
                planet.name,
                Vec3::from(planet.position),
                planet.biome_type,
                planet.seed
            );
        }
    }
    Ok(())
}

async fn handle_spawn(config: SwarmConfig, spec: FleetSpec, keep: bool, across: bool) -> Result<()> {
    let scan = config.scan.clone();
    let driver = FleetDriver::new(config, Registry::new())?;

    let fleets = if across {
        let pods = driver.discover(&scan).await;
        if pods.is_empty() {
            anyhow::bail!("No reachable pods found");
        }
        driver
            .spawn_across(&pods, &spec)
            .await
            .context("Failed to plan fleet")?
    } else if keep {
        vec![driver.spawn_fleet(&spec).await.context("Failed to plan fleet")?]
    } else {
        let cycle = driver.run_cycle(&spec).await.context("Failed to plan fleet")?;
        print_fleet(&cycle.fleet);
        println!(
            "Torn down: {} cubes despawned, {} failed",
            cycle.teardown.succeeded.len(),
            cycle.teardown.failed.len()
        );
        return Ok(());
    };

    for fleet in &fleets {
        print_fleet(fleet);
    }
    if !keep {
        for fleet in &fleets {
            let report = driver.teardown(fleet).await;
            println!(
                "Torn down {}: {} cubes despawned, {} failed",
                fleet.endpoint,
                report.succeeded.len(),
                report.failed.len()
            );
        }
    }
    Ok(())
}

async fn handle_despawn(config: SwarmConfig, unit: UnitId) -> Result<()> {
    let driver = FleetDriver::new(config, Registry::new())?;
    let manager = driver.manager();
    let adopted = manager
        .adopt_remote(&unit)
        .await
        .context("Failed to fetch cube list")?;
    if adopted == 0 {
        println!("No cubes found for {}", unit);
        return Ok(());
    }

    let report = manager.despawn(&unit).await;
    println!(
        "Despawned {} of {} cubes for {}",
        report.commands.succeeded.len(),
        report.commands.total(),
        unit
    );
    for (cube, error) in &report.commands.failed {
        println!("  {}: {}", cube, error);
    }
    Ok(())
}

async fn handle_nuke(config: SwarmConfig) -> Result<()> {
    let driver = FleetDriver::new(config, Registry::new())?;
    let manager = driver.manager();
    let report = manager.nuke().await.context("Nuke failed")?;
    println!(
        "Despawned {} cubes on {} in {} passes{}",
        report.despawned,
        manager.endpoint(),
        report.passes,
        if report.cleared { "" } else { " (pod still reports cubes)" }
    );
    Ok(())
}

fn handle_tables(
    config: &SwarmConfig,
    template: PathBuf,
    unit: String,
    cubes_csv: Option<PathBuf>,
    joints_csv: Option<PathBuf>,
) -> Result<()> {
    let instance = ConstructInstance::load(
        &TemplateSource::File(template.clone()),
        UnitId::from_raw(unit),
        config.endpoint()?,
    )
    .with_context(|| format!("Failed to load template {}", template.display()))?;

    let cubes = instance.template.cube_table();
    let joints = instance.template.joint_table();

    match cubes_csv {
        Some(path) => export::write_csv(&cubes, &path)?,
        None => print!("{}", export::render_csv(&cubes)),
    }
    match joints_csv {
        Some(path) => export::write_csv(&joints, &path)?,
        None => print!("{}", export::render_csv(&joints)),
    }
    Ok(())
}

async fn handle_joints(config: &SwarmConfig, prefix: &str) -> Result<()> {
    let endpoint = config.endpoint()?;
    let mut scanner = PodScanner::from_config(config);
    let inventory = scanner.scan_one(&endpoint).await;
    if let Some(reason) = &inventory.error {
        anyhow::bail!("Failed to scan {}: {}", endpoint, reason);
    }
    scanner.add_result(inventory);

    let registry = Registry::new();
    let connections = scanner.connections_for_prefix(prefix, &registry).await?;
    info!(cubes = connections.len(), "Joint lookup complete");

    println!("{:<40} {:<50} {:<30}", "CUBE", "JOINT", "CONNECTED TO");
    println!("{}", "-".repeat(120));
    for connection in connections {
        if connection.joints.is_empty() {
            println!("{:<40} {:<50} {:<30}", truncate(&connection.cube_name, 40), "-", "-");
        }
        for joint in connection.joints {
            println!(
                "{:<40} {:<50} {:<30}",
                truncate(&connection.cube_name, 40),
                truncate(&joint.joint_name, 50),
                joint.connected_cube.as_deref().unwrap_or("?")
            );
        }
    }
    Ok(())
}

fn print_inventory_header() {
    println!(
        "{:<21} {:<6} {:>6} {:>8}  {:<40}",
        "POD", "STATUS", "CUBES", "PLANETS", "DETAIL"
    );
    println!("{}", "-".repeat(85));
}

fn print_inventory_row(result: &PodInventory) {
    let (status, detail) = if result.success {
        ("OK", String::new())
    } else {
        (
            "FAILED",
            format!("{}: {}", result.stage, result.error.as_deref().unwrap_or("")),
        )
    };
    println!(
        "{:<21} {:<6} {:>6} {:>8}  {:<40}",
        result.endpoint.to_string(),
        status,
        result.cubes.len(),
        result.planets.len(),
        truncate(&detail, 40)
    );
}

fn print_fleet(fleet: &Fleet) {
    println!(
        "Fleet on {} (orbit {:.1}, separation {:.1})",
        fleet.endpoint, fleet.geometry.orbit_radius, fleet.geometry.min_separation
    );
    println!(
        "{:<24} {:>30} {:>7} {:>6} {:>6}  {:<20}",
        "UNIT", "POSITION", "CUBES", "FAILED", "LINKS", "ERROR"
    );
    println!("{}", "-".repeat(100));
    for member in &fleet.members {
        println!(
            "{:<24} {:>30} {:>7} {:>6} {:>6}  {:<20}",
            truncate(member.unit.as_str(), 24),
            member.slot.position.to_string(),
            member.spawned,
            member.failed_parts,
            member.links,
            member.error.as_deref().unwrap_or("")
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// `500ms`, `30s`, `5m` or `1h`, in milliseconds
fn parse_duration(s: &str) -> Result<u64> {
    let s = s.trim();
    let (num, unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1u64)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000u64)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000u64)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000u64)
    } else {
        anyhow::bail!("Invalid duration format. Use: 30s, 5m, 1h, 500ms");
    };

    let value: u64 = num.parse().context("Invalid duration number")?;
    value
        .checked_mul(unit)
        .with_context(|| format!("Duration too large: {}", s))
}
