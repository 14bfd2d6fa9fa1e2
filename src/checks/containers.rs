use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::BTreeSet;

use super::CheckContext;
use crate::cluster::state::{ContainerId, ContainerStatus};
use crate::cluster::{fetch_state, ApiResponse};
use crate::error::ProbeError;
use crate::metrics::{check_container_datapoints, check_statsd_uptime, MetricsResponse};
use crate::retry::retry;
use crate::verify;
use crate::workload::definitions::{self, STATSD_EMITTER_POD, STATSD_EMITTER_POD_TASK};
use crate::workload::with_pod;

pub(super) fn standalone_container_metrics(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    ctx.skip_in_strict(
        "Only resource providers are authorized to launch standalone containers in strict mode",
    )?;

    let state = fetch_state(ctx.api)?;
    let agent = match state.agents.first() {
        Some(agent) => agent,
        None => return Err(ProbeError::assertion("No agents found in master state")),
    };
    debug!("Selected agent {} at {}", agent.id, agent.hostname);

    let container_id = definitions::standalone_container_id();
    let operator_api = ctx.cluster().mesos_agent(&agent.hostname, "/api/v1");

    let launch = ctx.api.post(
        &operator_api,
        &definitions::launch_standalone_container(&container_id),
    )?;
    verify!(
        launch.status == 200,
        "Received unexpected status code when launching standalone container: {}",
        launch.status
    );
    info!("Launched standalone container {container_id}");

    let outcome = verify_standalone_metrics(ctx, &agent.id, &container_id);

    match ctx
        .api
        .post(&operator_api, &definitions::kill_container(&container_id))
    {
        Ok(response) if response.is_success() => {
            debug!("Killed standalone container {container_id}")
        }
        Ok(response) => warn!(
            "Killing standalone container {container_id} returned {}",
            response.status
        ),
        Err(e) => warn!("Killing standalone container {container_id} failed: {e}"),
    }

    outcome
}

fn verify_standalone_metrics(
    ctx: &CheckContext<'_>,
    agent_id: &str,
    container_id: &str,
) -> Result<(), ProbeError> {
    let route = ctx.cluster().leader(&format!(
        "/system/v1/agent/{agent_id}/metrics/v0/containers/{container_id}/app"
    ));

    // 204 means the container's metrics have not arrived yet; any error ends the wait
    let policy = ctx
        .timeouts
        .metrics_poll()
        .retry_on_result(|response: &ApiResponse| response.status == 204)
        .never_retry_errors();
    let response = retry(&policy, || ctx.api.get(&route))?;

    verify!(
        response.status == 200,
        "Received unexpected status code when fetching standalone container metrics: {}",
        response.status
    );

    let metrics: MetricsResponse = response.json()?;
    check_statsd_uptime(&metrics)?;
    verify!(metrics.dimensions.is_some(), "got {metrics:?}");
    verify!(
        metrics.dimension_str("container_id") == Some(container_id),
        "expected container_id dimension {container_id}, got {:?}",
        metrics.dimension("container_id")
    );
    Ok(())
}

#[derive(Debug, Deserialize)]
struct GetContainersResponse {
    get_containers: GetContainers,
}

#[derive(Debug, Deserialize)]
struct GetContainers {
    #[serde(default)]
    containers: Vec<AgentContainer>,
}

#[derive(Debug, Deserialize)]
struct AgentContainer {
    container_id: ContainerId,
    container_status: Option<ContainerStatus>,
}

impl AgentContainer {
    fn is_nested(&self) -> bool {
        self.container_status
            .as_ref()
            .and_then(|status| status.container_id.as_ref())
            .is_some_and(|id| id.parent.is_some())
    }
}

pub(super) fn pod_application_metrics(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    let marathon = ctx.marathon();

    with_pod(&marathon, &definitions::statsd_emitter_pod(), || {
        let status = marathon.pod_status(STATSD_EMITTER_POD)?;
        verify!(
            status.instances.len() == 1,
            "The marathon pod should have been deployed exactly once."
        );
        let instance = &status.instances[0];

        retry(&ctx.timeouts.convergence(), || -> Result<_, ProbeError> {
            check_pod_containers(
                ctx,
                &instance.agent_hostname,
                &instance.agent_id,
                STATSD_EMITTER_POD_TASK,
            )
        })?;
        Ok(())
    })
}

/// The task container and its parent, as reported in the master state.
fn pod_container_ids(
    ctx: &CheckContext<'_>,
    task_name: &str,
) -> Result<BTreeSet<String>, ProbeError> {
    Ok(retry(&ctx.timeouts.convergence(), || -> Result<_, ProbeError> {
        let state = fetch_state(ctx.api)?;
        let ids = state.task_container_ids("marathon", task_name);
        verify!(ids.len() == 2, "Test should create 2 containers, found {ids:?}");
        Ok(ids)
    })?)
}

fn check_pod_containers(
    ctx: &CheckContext<'_>,
    agent_host: &str,
    agent_id: &str,
    task_name: &str,
) -> Result<(), ProbeError> {
    let cluster = ctx.cluster();
    let container_ids = pod_container_ids(ctx, task_name)?;

    // The collector picks up new containers on its own schedule
    let listing = cluster.metrics_on_host(agent_host, "/containers");
    retry(&ctx.timeouts.convergence(), || -> Result<_, ProbeError> {
        let response = ctx.api.get(&listing)?;
        response.expect_status(200)?;
        let listed: BTreeSet<String> = response.json()?;
        verify!(
            container_ids.is_subset(&listed),
            "Containers {container_ids:?} should have been propagated"
        );
        Ok(())
    })?;

    let response = ctx.api.post(
        &cluster.leader(&format!("/agent/{agent_id}/api/v1")),
        &definitions::get_containers(),
    )?;
    response.error_for_status()?;
    let containers = response.json::<GetContainersResponse>()?.get_containers.containers;

    let agent_ids: BTreeSet<&str> = containers
        .iter()
        .map(|c| c.container_id.value.as_str())
        .collect();
    let missing: Vec<&String> = container_ids
        .iter()
        .filter(|id| !agent_ids.contains(id.as_str()))
        .collect();
    verify!(missing.is_empty(), "Missing expected containers {missing:?}");

    for container in containers
        .iter()
        .filter(|c| container_ids.contains(&c.container_id.value))
    {
        let id = &container.container_id.value;
        if container.is_nested() {
            check_task_container(ctx, agent_host, id, task_name)?;
        } else {
            check_executor_container(ctx, agent_host, id)?;
        }
    }
    Ok(())
}

/// Polls `/containers/<id>` back to back until it answers `status`.
fn wait_for_container_status(
    ctx: &CheckContext<'_>,
    agent_host: &str,
    container_id: &str,
    status: u16,
) -> Result<ApiResponse, ProbeError> {
    let route = ctx
        .cluster()
        .metrics_on_host(agent_host, &format!("/containers/{container_id}"));
    Ok(retry(&ctx.timeouts.tight(), || -> Result<_, ProbeError> {
        let response = ctx.api.get(&route)?;
        response.expect_status(status)?;
        Ok(response)
    })?)
}

/// Nested containers report no resource statistics but carry the task's app metrics.
fn check_task_container(
    ctx: &CheckContext<'_>,
    agent_host: &str,
    container_id: &str,
    task_name: &str,
) -> Result<(), ProbeError> {
    let response = wait_for_container_status(ctx, agent_host, container_id, 204)?;
    verify!(
        response.is_empty_json(),
        "expected no resource statistics for nested container {container_id}, got {}",
        response.text()
    );

    let app_route = ctx
        .cluster()
        .metrics_on_host(agent_host, &format!("/containers/{container_id}/app"));
    let app_response = ctx.api.get(&app_route)?;
    verify!(app_response.status == 200, "got {}", app_response.status);

    let app_metrics: MetricsResponse = app_response.json()?;
    check_statsd_uptime(&app_metrics)?;
    verify!(app_metrics.dimensions.is_some(), "got {app_metrics:?}");
    verify!(
        app_metrics.dimension_str("task_name") == Some(task_name.trim_matches('/')),
        "Nested container was not tagged with the correct task name, got {:?}",
        app_metrics.dimension("task_name")
    );
    Ok(())
}

/// The executor container reports resource statistics and no app metrics.
fn check_executor_container(
    ctx: &CheckContext<'_>,
    agent_host: &str,
    container_id: &str,
) -> Result<(), ProbeError> {
    let response = wait_for_container_status(ctx, agent_host, container_id, 200)?;
    let metrics: MetricsResponse = response.json()?;
    verify!(metrics.datapoints.is_some(), "got {metrics:?}");
    check_container_datapoints(&metrics, false)?;
    verify!(metrics.dimensions.is_some(), "got {metrics:?}");

    let app_route = ctx
        .cluster()
        .metrics_on_host(agent_host, &format!("/containers/{container_id}/app"));
    let app_response = ctx.api.get(&app_route)?;
    verify!(app_response.status == 204, "got {}", app_response.status);
    Ok(())
}
