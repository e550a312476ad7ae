use podswarm::error::{ErrorKind, Result, SwarmError};
use podswarm::SwarmConfig;

#[test]
fn test_error_types() {
    let err = SwarmError::connectivity("10.0.0.7:10002", "connection refused");
    assert!(err.to_string().contains("10.0.0.7:10002"));
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(err.kind(), ErrorKind::Connectivity);

    let err = SwarmError::Capacity {
        available: 7,
        requested: 10,
    };
    assert!(err.to_string().contains("got 7, need 10"));
    assert_eq!(err.kind(), ErrorKind::Capacity);
}

#[test]
fn test_foreign_errors_classify() {
    let json: Result<serde_json::Value> = serde_json::from_str("{").map_err(SwarmError::from);
    assert_eq!(json.unwrap_err().kind(), ErrorKind::Protocol);

    let yaml = SwarmConfig::from_yaml("endpoint: [unterminated").unwrap_err();
    assert_eq!(yaml.kind(), ErrorKind::Config);

    let io = SwarmError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "late"));
    assert_eq!(io.kind(), ErrorKind::Connectivity);
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("swarm.yaml");
    std::fs::write(&path, "endpoint: 192.168.0.229:10002\nnuke:\n  max_passes: 2\n").unwrap();

    let config = SwarmConfig::from_file(&path).unwrap();
    assert_eq!(config.endpoint().unwrap().to_string(), "192.168.0.229:10002");
    assert_eq!(config.nuke.max_passes, 2);
    assert_eq!(config.fleet.despawn_delay_ms, 500);

    let missing = SwarmConfig::from_file(&dir.path().join("absent.yaml")).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::Config);
}

#[test]
fn test_version_const() {
    assert!(!podswarm::VERSION.is_empty());
}
