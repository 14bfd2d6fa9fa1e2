use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;

use crate::cluster::{ClusterApi, Route};
use crate::config::Timeouts;
use crate::error::ProbeError;
use crate::retry::retry;
use crate::verify;

/// Where a task of an app can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppEnvelope {
    app: AppStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppStatus {
    pub id: String,
    pub instances: u64,
    pub tasks_running: u64,
    pub deployments: Vec<Value>,
    pub tasks: Vec<AppTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppTask {
    pub host: String,
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodStatus {
    pub id: String,
    pub status: String,
    pub instances: Vec<PodInstance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodInstance {
    pub id: String,
    pub agent_hostname: String,
    pub agent_id: String,
}

/// Extracts the `id` field every Marathon app and pod definition carries.
pub fn definition_id(definition: &Value) -> Result<String, ProbeError> {
    definition
        .get("id")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ProbeError::InvalidConfig(format!("definition without an id: {definition}")))
}

/// Marathon client over the leader's Admin Router.
pub struct Marathon<'a> {
    api: &'a dyn ClusterApi,
    timeouts: &'a Timeouts,
}

impl<'a> Marathon<'a> {
    pub fn new(api: &'a dyn ClusterApi, timeouts: &'a Timeouts) -> Self {
        Self { api, timeouts }
    }

    pub fn api(&self) -> &'a dyn ClusterApi {
        self.api
    }

    pub fn timeouts(&self) -> &'a Timeouts {
        self.timeouts
    }

    fn route(&self, path: &str) -> Route {
        self.api.cluster().leader(&format!("/marathon{path}"))
    }

    fn app_route(&self, id: &str) -> Route {
        self.route(&format!("/v2/apps/{}", id.trim_start_matches('/')))
    }

    fn pod_route(&self, id: &str, suffix: &str) -> Route {
        self.route(&format!("/v2/pods/{}{suffix}", id.trim_start_matches('/')))
    }

    pub fn get_app(&self, id: &str) -> Result<AppStatus, ProbeError> {
        let response = self.api.get(&self.app_route(id))?;
        response.expect_status(200)?;
        let envelope: AppEnvelope = response.json()?;
        Ok(envelope.app)
    }

    /// Posts the app and waits until its deployment finished with every instance running.
    /// Health checks are not awaited.
    pub fn deploy_app(&self, app: &Value) -> Result<(), ProbeError> {
        let id = definition_id(app)?;
        info!("Deploying Marathon app {id}");
        debug!("App definition: {app}");

        self.api.post(&self.route("/v2/apps"), app)?.error_for_status()?;

        let wanted = app.get("instances").and_then(Value::as_u64).unwrap_or(1);
        retry(&self.timeouts.convergence(), || -> Result<_, ProbeError> {
            let status = self.get_app(&id)?;
            verify!(
                status.deployments.is_empty(),
                "app {id} still has {} deployment(s) in progress",
                status.deployments.len()
            );
            verify!(
                status.tasks_running >= wanted,
                "app {id} has {} of {wanted} tasks running",
                status.tasks_running
            );
            Ok(())
        })?;

        info!("Marathon app {id} is running");
        Ok(())
    }

    /// One endpoint per running task of the app.
    pub fn app_service_endpoints(&self, id: &str) -> Result<Vec<Endpoint>, ProbeError> {
        let status = self.get_app(id)?;
        Ok(status
            .tasks
            .into_iter()
            .map(|task| Endpoint {
                port: task.ports.first().copied(),
                host: task.host,
            })
            .collect())
    }

    pub fn destroy_app(&self, id: &str) -> Result<(), ProbeError> {
        info!("Destroying Marathon app {id}");
        let mut route = self.app_route(id);
        route.path.push_str("?force=true");
        self.api.delete(&route)?.error_for_status()?;

        retry(&self.timeouts.teardown(), || -> Result<_, ProbeError> {
            let response = self.api.get(&self.app_route(id))?;
            verify!(response.status == 404, "app {id} still exists");
            Ok(())
        })?;
        Ok(())
    }

    /// Posts the pod and waits until Marathon reports it stable.
    pub fn deploy_pod(&self, pod: &Value) -> Result<(), ProbeError> {
        let id = definition_id(pod)?;
        info!("Deploying Marathon pod {id}");

        self.api.post(&self.route("/v2/pods"), pod)?.error_for_status()?;

        retry(&self.timeouts.convergence(), || -> Result<_, ProbeError> {
            let status = self.pod_status(&id)?;
            verify!(
                status.status == "STABLE",
                "pod {id} is {}, not STABLE",
                status.status
            );
            Ok(())
        })?;

        info!("Marathon pod {id} is stable");
        Ok(())
    }

    pub fn pod_status(&self, id: &str) -> Result<PodStatus, ProbeError> {
        let response = self.api.get(&self.pod_route(id, "::status"))?;
        response.expect_status(200)?;
        response.json()
    }

    pub fn destroy_pod(&self, id: &str) -> Result<(), ProbeError> {
        info!("Destroying Marathon pod {id}");
        self.api
            .delete(&self.pod_route(id, "?force=true"))?
            .error_for_status()?;

        retry(&self.timeouts.teardown(), || -> Result<_, ProbeError> {
            let response = self.api.get(&self.pod_route(id, "::status"))?;
            verify!(response.status == 404, "pod {id} still exists");
            Ok(())
        })?;
        Ok(())
    }

    /// Waits until Marathon has no deployment in progress.
    pub fn wait_for_deployments_complete(&self) -> Result<(), ProbeError> {
        let route = self.route("/v2/deployments");
        retry(&self.timeouts.teardown(), || -> Result<_, ProbeError> {
            let response = self.api.get(&route)?;
            response.expect_status(200)?;
            let deployments: Vec<Value> = response.json()?;
            verify!(
                deployments.is_empty(),
                "{} deployment(s) still in progress",
                deployments.len()
            );
            Ok(())
        })?;
        Ok(())
    }
}
