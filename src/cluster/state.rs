use serde::Deserialize;
use std::collections::BTreeSet;

use super::ClusterApi;
use crate::error::ProbeError;

/// The parts of the Mesos master `/state` document the checks rely on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MesosState {
    #[serde(default)]
    pub frameworks: Vec<Framework>,
    #[serde(default, rename = "slaves")]
    pub agents: Vec<Agent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Framework {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default, rename = "slave_id")]
    pub agent_id: String,
    #[serde(default)]
    pub statuses: Vec<TaskStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatus {
    pub container_status: Option<ContainerStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerStatus {
    /// Absent on statuses that only report network information.
    #[serde(default)]
    pub container_id: Option<ContainerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerId {
    pub value: String,
    pub parent: Option<Box<ContainerId>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Agent {
    pub id: String,
    pub hostname: String,
}

/// Fetches `/state` from the leading Mesos master.
pub fn fetch_state(api: &dyn ClusterApi) -> Result<MesosState, ProbeError> {
    let route = api.cluster().mesos_master("/state");
    let response = api.get(&route)?;
    response.expect_status(200)?;
    response.json()
}

impl MesosState {
    pub fn framework(&self, name: &str) -> Option<&Framework> {
        self.frameworks.iter().find(|f| f.name == name)
    }

    pub fn is_framework_running(&self, name: &str) -> bool {
        self.framework(name).is_some()
    }

    /// First task called `task` in the first framework called `framework`.
    pub fn task(&self, framework: &str, task: &str) -> Option<&Task> {
        self.framework(framework)?
            .tasks
            .iter()
            .find(|t| t.name == task)
    }

    pub fn agent_hostname(&self, agent_id: &str) -> Option<&str> {
        self.agents
            .iter()
            .find(|a| a.id == agent_id)
            .map(|a| a.hostname.as_str())
    }

    pub fn task_agent_id(&self, framework: &str, task: &str) -> Result<&str, ProbeError> {
        self.task(framework, task)
            .map(|t| t.agent_id.as_str())
            .ok_or_else(|| ProbeError::MissingTask {
                framework: framework.to_string(),
                task: task.to_string(),
            })
    }

    /// Hostname of the agent running the task.
    pub fn task_hostname(&self, framework: &str, task: &str) -> Result<&str, ProbeError> {
        let agent_id = self.task_agent_id(framework, task)?;
        self.agent_hostname(agent_id)
            .ok_or_else(|| ProbeError::MissingTask {
                framework: framework.to_string(),
                task: task.to_string(),
            })
    }

    /// Container ID of the task's first status that carries one, plus its parent container
    /// when nested.
    pub fn task_container_ids(&self, framework: &str, task: &str) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        let container_id = self.task(framework, task).and_then(|t| {
            t.statuses
                .iter()
                .filter_map(|s| s.container_status.as_ref())
                .find_map(|c| c.container_id.as_ref())
        });

        if let Some(container_id) = container_id {
            ids.insert(container_id.value.clone());
            if let Some(parent) = &container_id.parent {
                ids.insert(parent.value.clone());
            }
        }
        ids
    }
}
