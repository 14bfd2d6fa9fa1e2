use std::fs;

use telemetry_probe::cli::{build_cli, run};
use telemetry_probe::config::{load_config, read_config_file, ProbeConfig, SecurityMode};

#[test]
fn test_file_values_are_overridden_by_cli() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.toml");
    fs::write(
        &path,
        r#"
        masters = ["10.0.0.1"]
        agents = ["10.0.0.2", "10.0.0.3"]
        security = "permissive"

        [ports]
        prometheus = 9273
        "#,
    )
    .unwrap();
    let path = path.to_str().unwrap();

    let matches = build_cli()
        .try_get_matches_from(["telemetry-probe", "--config", path, "--security", "strict"])
        .unwrap();
    let config = load_config(Some(path), &matches).unwrap();

    assert_eq!(config.masters, vec!["10.0.0.1"]);
    assert_eq!(config.agents.len(), 2);
    assert_eq!(config.security, SecurityMode::Strict);
    assert_eq!(config.ports.prometheus, 9273);
    assert_eq!(config.ports.mesos_master, 5050);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let path = path.to_str().unwrap();

    let matches = build_cli().try_get_matches_from(["telemetry-probe"]).unwrap();
    let config = load_config(Some(path), &matches).unwrap();
    assert_eq!(config.ports, ProbeConfig::default().ports);
    assert_eq!(config.timeouts, ProbeConfig::default().timeouts);
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "masters = 7").unwrap();
    let path = path.to_str().unwrap();

    let matches = build_cli().try_get_matches_from(["telemetry-probe"]).unwrap();
    let err = load_config(Some(path), &matches).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_sample_config_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.toml");
    let path_str = path.to_str().unwrap();

    let matches = build_cli()
        .try_get_matches_from(["telemetry-probe", "--write-sample-config", path_str])
        .unwrap();
    assert!(run(&matches).unwrap());

    let written = read_config_file(&path).unwrap();
    assert_eq!(written, ProbeConfig::default());
}

#[test]
fn test_list_does_not_contact_cluster() {
    let matches = build_cli()
        .try_get_matches_from(["telemetry-probe", "--list", "--masters", "192.0.2.1"])
        .unwrap();
    assert!(run(&matches).unwrap());
}
