//! Workloads the checks deploy, as the JSON documents Marathon and the Mesos agent API expect.

use serde_json::{json, Value};

use crate::cluster::{Node, Role};

/// Executable that emits statsd metrics tagged `test_tag_key=test_tag_value`.
pub const STATSD_EMITTER_URI: &str =
    "https://downloads.mesosphere.com/dcos-metrics/1.11.0/statsd-emitter";

/// Host statsd port every agent listens on, independent of the task environment.
pub const STATIC_STATSD_UDP_PORT: u16 = 61825;

pub const STATSD_SENDER_TASK: &str = "test-metrics-statsd-app";
pub const STATSD_SENDER_PREFIX: &str = "test_metrics_statsd_app";

pub const STATSD_CONTAINERS_TASK: &str = "test-statsd-metrics-containers-app";
pub const STATSD_CONTAINERS_PREFIX: &str = "test_statsd_metrics_containers_app";

pub const PROM_CONTAINERS_TASK: &str = "test-prom-metrics-containers-app";
pub const PROM_CONTAINERS_PREFIX: &str = "test_prom_metrics_containers_app";

pub const NAN_TASK: &str = "test-metrics-containers-nan";
pub const NAN_METRIC: &str = "test_metrics_containers_nan";

pub const STATSD_EMITTER_TASK: &str = "statsd-emitter";
pub const STATSD_EMITTER_POD: &str = "/statsd-emitter-task-group";
pub const STATSD_EMITTER_POD_TASK: &str = "statsd-emitter-task";

/// A Universe package and the framework it registers once running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Package {
    pub name: &'static str,
    pub version: &'static str,
    pub framework: &'static str,
}

/// Marathon-on-Marathon.
pub const MARATHON_USER: Package = Package {
    name: "marathon",
    version: "1.6.535",
    framework: "marathon-user",
};

pub const HELLO_WORLD: Package = Package {
    name: "hello-world",
    version: "2.2.0-0.42.2",
    framework: "hello-world",
};

/// Shell that pushes each statsd `line` over UDP, then sleeps forever.
fn statsd_script(host_var: &str, port_var: &str, lines: &[String]) -> String {
    let mut script = vec![format!(
        "echo \"Sending metrics to ${host_var}:${port_var}\""
    )];
    for line in lines {
        script.push(format!(
            "echo \"{line}\" | nc -w 1 -u ${host_var} ${port_var}"
        ));
    }
    script.extend(
        [
            "echo \"Done. Sleeping forever.\"",
            "while true; do",
            "  sleep 1000",
            "done",
        ]
        .map(String::from),
    );
    script.join("\n")
}

fn alpine_app(task_name: &str, cmd: String) -> Value {
    json!({
        "id": format!("/{task_name}"),
        "instances": 1,
        "cpus": 0.1,
        "mem": 128,
        "cmd": cmd,
        "container": {
            "type": "MESOS",
            "docker": {"image": "library/alpine"}
        },
        "networks": [{"mode": "host"}]
    })
}

/// Sends one sample of each statsd type to the host-wide statsd port, pinned to `node`.
pub fn statsd_sender_app(node: &Node) -> Value {
    let pfx = STATSD_SENDER_PREFIX;
    let lines = [
        format!("{pfx}.gauge:100|g"),
        format!("{pfx}.count:1|c"),
        format!("{pfx}.timing:1|ms"),
        format!("{pfx}.histogram:1|h"),
    ];
    let mut app = alpine_app(
        STATSD_SENDER_TASK,
        statsd_script("STATIC_STATSD_UDP_HOST", "STATIC_STATSD_UDP_PORT", &lines),
    );
    app["env"] = json!({
        "STATIC_STATSD_UDP_PORT": STATIC_STATSD_UDP_PORT.to_string(),
        "STATIC_STATSD_UDP_HOST": "localhost"
    });
    app["constraints"] = json!([["hostname", "LIKE", node.host]]);
    if node.role == Role::PublicAgent {
        app["acceptedResourceRoles"] = json!(["slave_public"]);
    }
    app
}

/// Prometheus exposition lines the statsd sender produces on the node.
pub fn statsd_sender_expected_types() -> Vec<String> {
    let pfx = STATSD_SENDER_PREFIX;
    vec![
        format!("TYPE {pfx}_gauge gauge"),
        format!("TYPE {pfx}_count counter"),
        format!("TYPE {pfx}_timing_count untyped"),
        format!("TYPE {pfx}_histogram_count untyped"),
    ]
}

/// Sends statsd samples to the per-container statsd endpoint.
pub fn statsd_containers_app() -> Value {
    let pfx = STATSD_CONTAINERS_PREFIX;
    let lines = [
        format!("{pfx}.gauge:100|g"),
        format!("{pfx}.count:1|c"),
        format!("{pfx}.count:1|c"),
        format!("{pfx}.timing:1|ms"),
        format!("{pfx}.timing:2|ms"),
        format!("{pfx}.timing:3|ms"),
        format!("{pfx}.histogram:1|h"),
        format!("{pfx}.histogram:2|h"),
        format!("{pfx}.histogram:3|h"),
        format!("{pfx}.histogram:4|h"),
    ];
    alpine_app(
        STATSD_CONTAINERS_TASK,
        statsd_script("STATSD_UDP_HOST", "STATSD_UDP_PORT", &lines),
    )
}

/// App metric names and values the statsd containers app produces.
pub fn statsd_containers_expected() -> Vec<(String, Value)> {
    let pfx = STATSD_CONTAINERS_PREFIX;
    vec![
        (format!("{pfx}.gauge"), json!(100)),
        (format!("{pfx}.count"), json!(2)),
        (format!("{pfx}.timing.count"), json!(3)),
        (format!("{pfx}.histogram.count"), json!(4)),
    ]
}

/// Serves a static Prometheus file on a port labelled for scraping.
pub fn prometheus_containers_app() -> Value {
    let pfx = PROM_CONTAINERS_PREFIX;
    let cmd = [
        "echo \"Creating metrics file...\"".to_string(),
        "touch metrics".to_string(),
        format!("echo \"# TYPE {pfx}_gauge gauge\" >> metrics"),
        format!("echo \"{pfx}_gauge 100\" >> metrics"),
        format!("echo \"# TYPE {pfx}_count counter\" >> metrics"),
        format!("echo \"{pfx}_count 2\" >> metrics"),
        format!("echo \"# TYPE {pfx}_histogram histogram\" >> metrics"),
        format!("echo \"{pfx}_histogram_bucket{{le=\\\"+Inf\\\"}} 4\" >> metrics"),
        format!("echo \"{pfx}_histogram_sum 4\" >> metrics"),
        format!("echo \"{pfx}_histogram_seconds_count 4\" >> metrics"),
        "echo \"Serving prometheus metrics on http://localhost:$PORT0\"".to_string(),
        "python3 -m http.server $PORT0".to_string(),
    ]
    .join("\n");

    json!({
        "id": format!("/{PROM_CONTAINERS_TASK}"),
        "instances": 1,
        "cpus": 0.1,
        "mem": 128,
        "cmd": cmd,
        "container": {
            "type": "MESOS",
            "docker": {"image": "library/python:3"}
        },
        "portDefinitions": [{
            "protocol": "tcp",
            "port": 0,
            "labels": {"DCOS_METRICS_FORMAT": "prometheus"}
        }]
    })
}

pub fn prometheus_containers_expected() -> Vec<(String, Value)> {
    let pfx = PROM_CONTAINERS_PREFIX;
    vec![
        (format!("{pfx}_gauge.gauge"), json!(100)),
        (format!("{pfx}_count.counter"), json!(2)),
        (format!("{pfx}_histogram_seconds_count"), json!(4)),
    ]
}

/// Sends a single gauge whose value is `NaN`.
pub fn nan_gauge_app() -> Value {
    alpine_app(
        NAN_TASK,
        statsd_script(
            "STATSD_UDP_HOST",
            "STATSD_UDP_PORT",
            &[format!("{NAN_METRIC}:NaN|g")],
        ),
    )
}

pub fn statsd_emitter_app() -> Value {
    json!({
        "id": format!("/{STATSD_EMITTER_TASK}"),
        "cmd": "./statsd-emitter -debug",
        "fetch": [{"uri": STATSD_EMITTER_URI, "executable": true}],
        "cpus": 0.5,
        "mem": 128.0,
        "instances": 1
    })
}

pub fn statsd_emitter_pod() -> Value {
    json!({
        "id": STATSD_EMITTER_POD,
        "containers": [{
            "name": STATSD_EMITTER_POD_TASK,
            "resources": {"cpus": 0.5, "mem": 128.0, "disk": 1024.0},
            "image": {"kind": "DOCKER", "id": "alpine"},
            "exec": {"command": {"shell": "./statsd-emitter"}},
            "artifacts": [{"uri": STATSD_EMITTER_URI, "executable": true}]
        }],
        "scheduling": {"instances": 1}
    })
}

/// Agent operator call starting statsd-emitter outside of any framework.
pub fn launch_standalone_container(container_id: &str) -> Value {
    let scalar = |name: &str, value: f64| {
        json!({"name": name, "scalar": {"value": value}, "type": "SCALAR"})
    };
    json!({
        "type": "LAUNCH_CONTAINER",
        "launch_container": {
            "command": {
                "value": "./statsd-emitter",
                "uris": [{"value": STATSD_EMITTER_URI, "executable": true}]
            },
            "container_id": {"value": container_id},
            "resources": [scalar("cpus", 0.2), scalar("mem", 64.0), scalar("disk", 1024.0)],
            "container": {"type": "MESOS"}
        }
    })
}

pub fn kill_container(container_id: &str) -> Value {
    json!({
        "type": "KILL_CONTAINER",
        "kill_container": {"container_id": {"value": container_id}}
    })
}

pub fn get_containers() -> Value {
    json!({
        "type": "GET_CONTAINERS",
        "get_containers": {"show_nested": true, "show_standalone": true}
    })
}

/// Fresh ID for a standalone container.
pub fn standalone_container_id() -> String {
    format!("test-standalone-{}", uuid::Uuid::new_v4())
}
