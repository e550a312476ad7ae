pub mod commands;

use clap::{Parser, Subcommand};
use podswarm_common::Vec3;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "podswarm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Discover simulation pods and orchestrate construct fleets on them", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "YAML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Pod endpoint (host:port)")]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Probe every configured pod and print an inventory")]
    Scan {
        #[arg(long = "host", help = "Host to scan (repeatable)")]
        hosts: Vec<String>,

        #[arg(long, help = "First port probed on each host")]
        start_port: Option<u16>,

        #[arg(long, help = "Distance between probed ports")]
        port_step: Option<u16>,

        #[arg(long, help = "Ports probed per host")]
        count: Option<u16>,
    },
    #[command(about = "Probe a single pod")]
    Probe {
        #[arg(help = "Pod to probe (host:port); defaults to --endpoint")]
        target: Option<String>,
    },
    #[command(about = "Spawn a fleet of constructs, then tear it down unless --keep is given")]
    Spawn {
        #[arg(short, long, help = "Construct template (JSON)")]
        template: PathBuf,

        #[arg(short = 'n', long, default_value = "1", help = "Constructs per center")]
        count: usize,

        #[arg(long, default_value = "ARC", help = "Role part of the unit ids")]
        role: String,

        #[arg(long, default_value = "openfluke.com", help = "Domain part of the unit ids")]
        domain: String,

        #[arg(long, default_value = "1")]
        start_generation: u32,

        #[arg(long, default_value = "1")]
        start_version: u32,

        #[arg(long = "center", value_parser = parse_vec3, help = "Reference center x,y,z (repeatable)")]
        centers: Vec<Vec3>,

        #[arg(long, value_parser = parse_vec3, help = "Offset from each center x,y,z")]
        offset: Option<Vec3>,

        #[arg(long, help = "How long to hold the fleet before teardown (e.g. 5s, 500ms)")]
        hold: Option<String>,

        #[arg(long, help = "Leave the fleet in place")]
        keep: bool,

        #[arg(long, help = "Scan first and spawn on every reachable pod around its planets")]
        across: bool,
    },
    #[command(about = "Despawn every cube of a unit")]
    Despawn {
        #[arg(help = "Unit id, e.g. [ARC]-OC-gen1-v1")]
        unit: String,
    },
    #[command(about = "Despawn everything a pod reports")]
    Nuke,
    #[command(about = "Print or export the cube and joint tables of a template")]
    Tables {
        #[arg(short, long, help = "Construct template (JSON)")]
        template: PathBuf,

        #[arg(short, long, help = "Unit id used to prefix names")]
        unit: String,

        #[arg(long, help = "Write the cube table to this CSV file")]
        cubes_csv: Option<PathBuf>,

        #[arg(long, help = "Write the joint table to this CSV file")]
        joints_csv: Option<PathBuf>,
    },
    #[command(about = "List joints of every cube whose name starts with a prefix")]
    Joints {
        #[arg(help = "Cube name prefix")]
        prefix: String,
    },
}

/// `x,y,z`
pub fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,z but got {:?}", s));
    }
    let mut coords = [0.0; 3];
    for (slot, part) in coords.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate {:?}: {}", part, e))?;
    }
    Ok(Vec3::from(coords))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3("1, -2.5,3").unwrap(), Vec3::new(1.0, -2.5, 3.0));
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("a,b,c").is_err());
    }

    #[test]
    fn test_cli_parses_spawn() {
        let cli = Cli::try_parse_from([
            "podswarm", "--endpoint", "10.0.0.2:10002", "spawn", "-t", "worm.json", "-n", "4",
            "--center", "0,0,0", "--center", "100,0,0", "--keep",
        ])
        .unwrap();
        assert_eq!(cli.endpoint.as_deref(), Some("10.0.0.2:10002"));
        match cli.command {
            Some(Commands::Spawn {
                count, centers, keep, ..
            }) => {
                assert_eq!(count, 4);
                assert_eq!(centers.len(), 2);
                assert!(keep);
            }
            _ => panic!("expected spawn"),
        }
    }
}
