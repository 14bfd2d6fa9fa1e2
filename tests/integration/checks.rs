use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::MockCluster;
use telemetry_probe::checks::{self, CheckContext, Outcome};
use telemetry_probe::config::SecurityMode;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_node_checks_pass_against_healthy_cluster() {
    let mock = MockCluster::start();
    mock.get_json("/system/v1/metrics/v0/ping", 200, json!({"ok": true}));
    mock.get_json(
        "/system/v1/metrics/v0/node",
        200,
        json!({
            "datapoints": [
                {"name": "cpu.total", "value": 4, "unit": "count"},
                {"name": "filesystem.capacity.used", "value": 1, "tags": {"path": "/var/lib"}}
            ],
            "dimensions": {"cluster_id": "6c9e2b", "hostname": "127.0.0.1", "mesos_id": ""}
        }),
    );

    let session = mock.session();
    let ctx = CheckContext::new(&session, mock.config().timeouts, SecurityMode::Disabled);
    let selected = checks::select(&names(&["metrics_ping", "metrics_node"]), false).unwrap();
    let reports = checks::run_checks(&ctx, &selected);

    for report in &reports {
        assert_eq!(report.outcome, Outcome::Passed, "{}", report.name);
    }
    // leader, private agent and public agent
    assert_eq!(mock.hits("/system/v1/metrics/v0/ping"), 3);
}

#[test]
fn test_prometheus_check_waits_for_metric() {
    let mock = MockCluster::start();
    mock.mount(
        Mock::given(method("GET"))
            .and(path("/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_string("go_goroutines 12\n"))
            .up_to_n_times(2),
    );
    mock.get_text(
        "/metrics",
        200,
        "# TYPE mesos_master_uptime_secs gauge\nmesos_master_uptime_secs 381.2\n",
    );

    let session = mock.session();
    let ctx = CheckContext::new(&session, mock.config().timeouts, SecurityMode::Disabled);
    let report = checks::run_check(&ctx, checks::find("metrics_master_mesos").unwrap());

    assert_eq!(report.outcome, Outcome::Passed);
    assert_eq!(mock.hits("/metrics"), 3);
}

#[test]
fn test_failures_do_not_stop_the_run() {
    let mock = MockCluster::start();
    mock.get_text("/system/v1/metrics/v0/ping", 503, "unavailable");
    mock.get_text("/metrics", 200, "telegraf_up 1\n");

    let session = mock.session();
    let ctx = CheckContext::new(&session, mock.config().timeouts, SecurityMode::Disabled);
    let selected =
        checks::select(&names(&["metrics_ping", "metrics_agents_prom"]), false).unwrap();
    let reports = checks::run_checks(&ctx, &selected);

    assert_eq!(reports.len(), 2);
    match &reports[0].outcome {
        Outcome::Failed(message) => assert!(message.contains("503"), "{message}"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(reports[1].outcome, Outcome::Passed);
}

#[test]
fn test_strict_cluster_skips_without_traffic() {
    let mock = MockCluster::start();
    let session = mock.session();
    let ctx = CheckContext::new(&session, mock.config().timeouts, SecurityMode::Strict);

    let report = checks::run_check(&ctx, checks::find("standalone_container_metrics").unwrap());
    assert!(matches!(report.outcome, Outcome::Skipped(_)));
    assert!(!report.is_failure());
    assert!(mock.received().is_empty());
}
