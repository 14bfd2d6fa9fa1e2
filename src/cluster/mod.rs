//! Access to the cluster under test.
//!
//! Checks never hold ambient connection state: they receive a [`ClusterApi`] and address
//! every request through a [`Route`] built from the [`Cluster`] topology.

pub mod session;
pub mod state;

pub use session::HttpSession;
pub use state::{fetch_state, MesosState};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{Ports, ProbeConfig};
use crate::error::ProbeError;

/// Path prefix of the node-local metrics API behind Admin Router.
pub const METRICS_API_PREFIX: &str = "/system/v1/metrics/v0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Master,
    Agent,
    PublicAgent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub host: String,
    pub role: Role,
}

impl Node {
    pub fn new(host: impl Into<String>, role: Role) -> Self {
        Self {
            host: host.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// Content negotiation for services that want vendor media types instead of plain JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    pub content_type: &'static str,
    pub accept: &'static str,
}

impl MediaType {
    pub const JSON: MediaType = MediaType {
        content_type: "application/json",
        accept: "application/json",
    };
}

/// Fully resolved request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub media_type: MediaType,
}

impl Route {
    pub fn new(scheme: &str, host: &str, port: u16, path: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            path,
            media_type: MediaType::JSON,
        }
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

/// Topology and addressing of the cluster under test.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub masters: Vec<String>,
    pub agents: Vec<String>,
    pub public_agents: Vec<String>,
    pub scheme: String,
    pub ports: Ports,
}

impl Cluster {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            masters: config.masters.clone(),
            agents: config.agents.clone(),
            public_agents: config.public_agents.clone(),
            scheme: config.scheme.clone(),
            ports: config.ports.clone(),
        }
    }

    /// The master that serves leader-routed requests.
    pub fn leader_host(&self) -> &str {
        self.masters.first().map(String::as_str).unwrap_or("127.0.0.1")
    }

    pub fn role_of(&self, host: &str) -> Role {
        if self.masters.iter().any(|h| h == host) {
            Role::Master
        } else if self.public_agents.iter().any(|h| h == host) {
            Role::PublicAgent
        } else {
            Role::Agent
        }
    }

    pub fn node(&self, host: &str) -> Node {
        Node::new(host, self.role_of(host))
    }

    pub fn first_agent(&self) -> Option<Node> {
        self.agents.first().map(|h| Node::new(h.as_str(), Role::Agent))
    }

    pub fn first_public_agent(&self) -> Option<Node> {
        self.public_agents
            .first()
            .map(|h| Node::new(h.as_str(), Role::PublicAgent))
    }

    /// One agent of each kind that exists.
    pub fn sample_agents(&self) -> Vec<Node> {
        self.first_agent()
            .into_iter()
            .chain(self.first_public_agent())
            .collect()
    }

    /// The leader plus one agent of each kind that exists.
    pub fn sample_nodes(&self) -> Vec<Node> {
        let mut nodes = vec![Node::new(self.leader_host(), Role::Master)];
        nodes.extend(self.sample_agents());
        nodes
    }

    fn admin_router_port(&self, role: Role) -> u16 {
        match role {
            Role::Master => self.ports.master_admin_router,
            Role::Agent | Role::PublicAgent => self.ports.agent_admin_router,
        }
    }

    /// Admin Router on the leading master.
    pub fn leader(&self, path: &str) -> Route {
        Route::new(
            &self.scheme,
            self.leader_host(),
            self.ports.master_admin_router,
            path,
        )
    }

    /// Metrics API on a node, through that node's Admin Router.
    pub fn metrics(&self, node: &Node, path: &str) -> Route {
        Route::new(
            &self.scheme,
            &node.host,
            self.admin_router_port(node.role),
            &format!("{METRICS_API_PREFIX}{path}"),
        )
    }

    pub fn metrics_on_host(&self, host: &str, path: &str) -> Route {
        self.metrics(&self.node(host), path)
    }

    /// Telegraf's Prometheus output on a node.
    pub fn prometheus(&self, host: &str) -> Route {
        Route::new("http", host, self.ports.prometheus, "/metrics")
    }

    pub fn mesos_master(&self, path: &str) -> Route {
        Route::new("http", self.leader_host(), self.ports.mesos_master, path)
    }

    pub fn mesos_agent(&self, host: &str, path: &str) -> Route {
        Route::new("http", host, self.ports.mesos_agent, path)
    }
}

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProbeError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn json_value(&self) -> Result<Value, ProbeError> {
        self.json()
    }

    /// True for an empty body or an empty JSON document (`null`, `{}`, `[]`, `""`).
    pub fn is_empty_json(&self) -> bool {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return true;
        }
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(Value::Null) => true,
            Ok(Value::Object(map)) => map.is_empty(),
            Ok(Value::Array(items)) => items.is_empty(),
            Ok(Value::String(s)) => s.is_empty(),
            _ => false,
        }
    }

    fn unexpected(&self) -> ProbeError {
        ProbeError::UnexpectedStatus {
            url: self.url.clone(),
            status: self.status,
            body: self.text(),
        }
    }

    pub fn expect_status(&self, expected: u16) -> Result<&Self, ProbeError> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(self.unexpected())
        }
    }

    pub fn error_for_status(&self) -> Result<&Self, ProbeError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.unexpected())
        }
    }
}

/// Capability object for talking to the cluster.
pub trait ClusterApi {
    fn cluster(&self) -> &Cluster;

    fn send(
        &self,
        method: Method,
        route: &Route,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ProbeError>;

    fn get(&self, route: &Route) -> Result<ApiResponse, ProbeError> {
        self.send(Method::Get, route, None)
    }

    fn post(&self, route: &Route, body: &Value) -> Result<ApiResponse, ProbeError> {
        self.send(Method::Post, route, Some(body))
    }

    fn delete(&self, route: &Route) -> Result<ApiResponse, ProbeError> {
        self.send(Method::Delete, route, None)
    }
}
