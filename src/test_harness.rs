//! Scripted in-memory cluster for exercising checks without a live cluster.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use crate::cluster::{ApiResponse, Cluster, ClusterApi, Method, Route};
use crate::config::{ProbeConfig, Timeouts};
use crate::error::ProbeError;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Respond { status: u16, body: String },
    Fail(String),
}

impl FakeReply {
    pub fn json(status: u16, body: Value) -> Self {
        FakeReply::Respond {
            status,
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        FakeReply::Respond {
            status,
            body: body.into(),
        }
    }

    pub fn no_content() -> Self {
        Self::text(204, "")
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

/// Replies are consumed in order per (method, URL); the last one repeats forever.
pub struct FakeCluster {
    cluster: Cluster,
    replies: RefCell<HashMap<(Method, String), VecDeque<FakeReply>>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl FakeCluster {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            cluster: Cluster::from_config(config),
            replies: RefCell::new(HashMap::new()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Master `10.0.0.1`, agent `10.0.0.2`, public agent `10.0.0.3`.
    pub fn standard() -> Self {
        Self::new(&ProbeConfig {
            masters: vec!["10.0.0.1".into()],
            agents: vec!["10.0.0.2".into()],
            public_agents: vec!["10.0.0.3".into()],
            ..Default::default()
        })
    }

    pub fn on(&self, method: Method, route: &Route, replies: Vec<FakeReply>) -> &Self {
        self.replies
            .borrow_mut()
            .entry((method, route.url()))
            .or_default()
            .extend(replies);
        self
    }

    pub fn on_get(&self, route: &Route, replies: Vec<FakeReply>) -> &Self {
        self.on(Method::Get, route, replies)
    }

    pub fn on_post(&self, route: &Route, replies: Vec<FakeReply>) -> &Self {
        self.on(Method::Post, route, replies)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    pub fn count(&self, method: Method, route: &Route) -> usize {
        let url = route.url();
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }
}

impl ClusterApi for FakeCluster {
    fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    fn send(
        &self,
        method: Method,
        route: &Route,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ProbeError> {
        let url = route.url();
        self.requests.borrow_mut().push(RecordedRequest {
            method,
            url: url.clone(),
            body: body.cloned(),
        });

        let reply = {
            let mut replies = self.replies.borrow_mut();
            match replies.get_mut(&(method, url.clone())) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(FakeReply::Respond { status, body }) => Ok(ApiResponse::new(url, status, body)),
            Some(FakeReply::Fail(message)) => Err(ProbeError::assertion(format!(
                "connection to {url} failed: {message}"
            ))),
            None => Ok(ApiResponse::new(url, 404, "no scripted reply")),
        }
    }
}

/// Millisecond-scale budgets so failing paths finish quickly.
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        metrics_wait_ms: 60,
        metrics_interval_ms: 1,
        std_wait_ms: 60,
        std_interval_ms: 1,
    }
}
