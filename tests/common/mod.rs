use serde_json::Value;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use telemetry_probe::cluster::HttpSession;
use telemetry_probe::config::{Ports, ProbeConfig, SecurityMode, Timeouts};

pub const HOST: &str = "127.0.0.1";

/// Millisecond budgets so exhausted polls fail quickly.
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        metrics_wait_ms: 300,
        metrics_interval_ms: 5,
        std_wait_ms: 300,
        std_interval_ms: 5,
    }
}

/// A mock server standing in for every node and service of a cluster.
pub struct MockCluster {
    runtime: Runtime,
    server: MockServer,
}

impl MockCluster {
    pub fn start() -> Self {
        let runtime = Runtime::new().expect("Failed to build tokio runtime");
        let server = runtime.block_on(MockServer::start());
        Self { runtime, server }
    }

    pub fn port(&self) -> u16 {
        self.server.address().port()
    }

    /// One master, one private agent and one public agent, all served by the mock.
    pub fn config(&self) -> ProbeConfig {
        ProbeConfig {
            masters: vec![HOST.to_string()],
            agents: vec![HOST.to_string()],
            public_agents: vec![HOST.to_string()],
            request_timeout_secs: 5,
            security: SecurityMode::Disabled,
            ports: Ports::all(self.port()),
            timeouts: fast_timeouts(),
            ..Default::default()
        }
    }

    pub fn session(&self) -> HttpSession {
        HttpSession::new(&self.config()).expect("Failed to build HTTP session")
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub fn get_json(&self, route_path: &str, status: u16, body: Value) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(route_path))
                .respond_with(ResponseTemplate::new(status).set_body_json(body)),
        );
    }

    pub fn get_text(&self, route_path: &str, status: u16, body: &str) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(route_path))
                .respond_with(ResponseTemplate::new(status).set_body_string(body)),
        );
    }

    pub fn received(&self) -> Vec<wiremock::Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }

    pub fn hits(&self, route_path: &str) -> usize {
        self.received()
            .iter()
            .filter(|request| request.url.path() == route_path)
            .count()
    }
}
