//! In-process pod speaking the framed protocol over TCP

#![allow(dead_code)]

use parking_lot::{Mutex, MutexGuard};
use podswarm::SwarmConfig;
use podswarm_common::{Endpoint, FRAME_SENTINEL};
use podswarm_proto::find_sentinel;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const SECRET: &str = "test-secret";

pub const WORM: &str = r#"{
    "cubes": [
        {"name": "head", "position": [0, 0, 0]},
        {"name": "body", "position": [2, 0, 0]},
        {"name": "tail", "position": [4, 0, 0]}
    ],
    "chains": [["head", "body", "tail"]],
    "joint_type": "hinge",
    "joint_params": {"x": 1}
}"#;

#[derive(Default)]
pub struct PodState {
    pub cubes: Vec<String>,
    pub planets: Value,
    /// (joint name, cube a, cube b)
    pub joints: Vec<(String, String, String)>,
    pub received: Vec<Value>,
    /// Joint whose parameter updates are never acknowledged
    pub silent_joint: Option<String>,
}

pub struct MockPod {
    pub endpoint: Endpoint,
    state: Arc<Mutex<PodState>>,
    task: JoinHandle<()>,
}

impl MockPod {
    pub async fn start(cubes: &[&str], planets: Value) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(PodState {
            cubes: cubes.iter().map(|c| c.to_string()).collect(),
            planets,
            ..Default::default()
        }));

        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&shared)));
            }
        });

        Self {
            endpoint: Endpoint::new("127.0.0.1", port),
            state,
            task,
        }
    }

    pub async fn empty() -> Self {
        Self::start(&[], json!({})).await
    }

    pub fn state(&self) -> MutexGuard<'_, PodState> {
        self.state.lock()
    }

    pub fn cubes(&self) -> Vec<String> {
        self.state.lock().cubes.clone()
    }

    pub fn received(&self, kind: &str) -> Vec<Value> {
        self.state
            .lock()
            .received
            .iter()
            .filter(|m| m["type"] == kind)
            .cloned()
            .collect()
    }

    /// Poll until `cond` holds; fire-and-forget commands land asynchronously
    pub async fn wait_until<F>(&self, cond: F) -> bool
    where
        F: Fn(&PodState) -> bool,
    {
        for _ in 0..300 {
            if cond(&self.state.lock()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for MockPod {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Settings tuned so timeouts in tests stay short
pub fn config_for(endpoint: &Endpoint) -> SwarmConfig {
    let mut config = SwarmConfig::default();
    config.endpoint = endpoint.to_string();
    config.auth_secret = SECRET.to_string();
    config.dial_timeout_ms = 500;
    config.read_timeout_ms = 500;
    config.scan.hosts = vec![endpoint.host.clone()];
    config.scan.start_port = endpoint.port;
    config.scan.port_step = 1;
    config.scan.pods_per_host = 1;
    config.scan.probe_timeout_ms = 500;
    config.nuke.pass_delay_ms = 20;
    config.fleet.despawn_delay_ms = 5;
    config
}

/// A port nothing listens on
pub async fn closed_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new("127.0.0.1", port)
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<PodState>>) {
    let sentinel = FRAME_SENTINEL.as_bytes();
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 1024];
    let mut authenticated = false;

    loop {
        while let Some(pos) = find_sentinel(&buf, sentinel) {
            let frame: Vec<u8> = buf.drain(..pos + sentinel.len()).take(pos).collect();
            let text = String::from_utf8_lossy(&frame).trim().to_string();

            let reply = if !authenticated {
                authenticated = true;
                if text == SECRET {
                    Some(json!({"status": "auth_success"}))
                } else {
                    Some(json!({"status": "auth_failed"}))
                }
            } else {
                handle(&text, &state)
            };

            if let Some(reply) = reply {
                let mut out = reply.to_string().into_bytes();
                out.extend_from_slice(sentinel);
                if stream.write_all(&out).await.is_err() {
                    return;
                }
            }
        }

        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn handle(text: &str, state: &Mutex<PodState>) -> Option<Value> {
    let msg: Value = serde_json::from_str(text).ok()?;
    let mut state = state.lock();
    state.received.push(msg.clone());
    let name = msg["cube_name"].as_str().unwrap_or_default().to_string();

    match msg["type"].as_str().unwrap_or_default() {
        "spawn_cube" => {
            state.cubes.push(format!("{}_BASE", name));
            None
        }
        "despawn_cube" => {
            state.cubes.retain(|c| *c != name);
            None
        }
        "create_joint" => {
            let joint = (
                msg["joint_name"].as_str().unwrap_or_default().to_string(),
                msg["cube1"].as_str().unwrap_or_default().to_string(),
                msg["cube2"].as_str().unwrap_or_default().to_string(),
            );
            state.joints.push(joint);
            None
        }
        "freeze_cube" | "set_color" => None,
        "get_cube_list" => Some(json!({ "cubes": state.cubes })),
        "get_planets" => Some(state.planets.clone()),
        "get_joints_for_cube" => {
            let joints: Vec<&str> = state
                .joints
                .iter()
                .filter(|(_, a, b)| *a == name || *b == name)
                .map(|(j, _, _)| j.as_str())
                .collect();
            Some(json!({"type": "joints_for_cube", "cube_name": name, "joints": joints}))
        }
        "link_cube_chains" => {
            let joint_type = msg["joint_type"].as_str().unwrap_or_default().to_string();
            let chains = msg["chains"].as_array().cloned().unwrap_or_default();
            for chain in chains {
                let members: Vec<String> = chain
                    .as_array()
                    .map(|c| c.iter().filter_map(|m| m.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                for pair in members.windows(2) {
                    let joint = format!("joint_{}_{}_{}", joint_type, pair[0], pair[1]);
                    state.joints.push((joint, pair[0].clone(), pair[1].clone()));
                }
            }
            Some(json!({"status": "ok"}))
        }
        "set_joint_param" | "set_joint_params" => {
            let joint = msg["joint_name"].as_str().unwrap_or_default();
            if state.silent_joint.as_deref() == Some(joint) {
                None
            } else {
                Some(json!({"status": "ok"}))
            }
        }
        "apply_force" => Some(json!({"status": "ok"})),
        _ => None,
    }
}
