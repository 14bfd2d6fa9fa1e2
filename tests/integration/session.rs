use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{MockCluster, HOST};
use telemetry_probe::cluster::{ClusterApi, HttpSession, Node, Role};
use telemetry_probe::config::{Ports, ProbeConfig};
use telemetry_probe::workload::Cosmos;
use telemetry_probe::ProbeError;

#[test]
fn test_auth_token_is_sent() {
    let mock = MockCluster::start();
    mock.mount(
        Mock::given(method("GET"))
            .and(path("/system/v1/metrics/v0/ping"))
            .and(header("authorization", "token=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true}))),
    );

    let config = ProbeConfig {
        auth_token: Some("secret".to_string()),
        ..mock.config()
    };
    let session = HttpSession::new(&config).unwrap();
    let route = session
        .cluster()
        .metrics(&Node::new(HOST, Role::Master), "/ping");

    let response = session.get(&route).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.json_value().unwrap()["ok"], true);
}

#[test]
fn test_error_status_is_returned_not_raised() {
    let mock = MockCluster::start();
    mock.get_text("/marathon/v2/apps/missing", 404, "no such app");

    let session = mock.session();
    let route = session.cluster().leader("/marathon/v2/apps/missing");
    let response = session.get(&route).unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.text(), "no such app");

    match response.expect_status(200) {
        Err(ProbeError::UnexpectedStatus { status, body, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such app");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_package_install_negotiates_vendor_media_types() {
    let mock = MockCluster::start();
    mock.mount(
        Mock::given(method("POST"))
            .and(path("/package/install"))
            .and(header(
                "content-type",
                "application/vnd.dcos.package.install-request+json;charset=utf-8;version=v1",
            ))
            .and(body_json(
                json!({"packageName": "hello-world", "packageVersion": "2.2.0-0.42.2"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"appId": "/hello-world"}))),
    );

    let session = mock.session();
    let app_id = Cosmos::new(&session)
        .install_package("hello-world", "2.2.0-0.42.2")
        .unwrap();
    assert_eq!(app_id, "/hello-world");
}

#[test]
fn test_unreachable_node_is_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind((HOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ProbeConfig {
        masters: vec![HOST.to_string()],
        request_timeout_secs: 2,
        ports: Ports::all(port),
        ..Default::default()
    };
    let session = HttpSession::new(&config).unwrap();

    let err = session.get(&session.cluster().leader("/")).unwrap_err();
    assert!(matches!(err, ProbeError::Transport(_)), "{err:?}");
}
