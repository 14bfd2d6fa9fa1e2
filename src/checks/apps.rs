use log::info;
use serde_json::json;

use super::CheckContext;
use crate::cluster::fetch_state;
use crate::error::ProbeError;
use crate::metrics::api::{
    assert_app_metric_value_for_task, get_app_metric_for_task, get_metrics_for_task,
    poll_prometheus,
};
use crate::metrics::{check_container_datapoints, check_statsd_uptime};
use crate::retry::retry;
use crate::verify;
use crate::workload::definitions::{self, HELLO_WORLD, MARATHON_USER};
use crate::workload::{definition_id, with_app, with_package, Endpoint, Marathon};

/// The app must run exactly one task.
fn single_endpoint(marathon: &Marathon<'_>, app_id: &str) -> Result<Endpoint, ProbeError> {
    let mut endpoints = marathon.app_service_endpoints(app_id)?;
    verify!(
        endpoints.len() == 1,
        "The marathon app should have been deployed exactly once."
    );
    Ok(endpoints.remove(0))
}

/// Agent hostname running `task` of `framework`, once the master reports one.
pub(super) fn wait_for_task_hostname(
    ctx: &CheckContext<'_>,
    framework: &str,
    task: &str,
) -> Result<String, ProbeError> {
    Ok(retry(&ctx.timeouts.convergence(), || -> Result<_, ProbeError> {
        let state = fetch_state(ctx.api)?;
        Ok(state.task_hostname(framework, task)?.to_string())
    })?)
}

pub(super) fn metrics_agent_statsd(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    let marathon = ctx.marathon();
    let expected = definitions::statsd_sender_expected_types();
    let names: Vec<&str> = expected.iter().map(String::as_str).collect();

    for node in ctx.cluster().sample_agents() {
        info!("Sending statsd samples on {:?} {}", node.role, node.host);
        let app = definitions::statsd_sender_app(&node);
        let app_id = definition_id(&app)?;

        with_app(&marathon, &app, || {
            single_endpoint(&marathon, &app_id)?;
            poll_prometheus(ctx.api, &ctx.timeouts, &node.host, |expo| {
                expo.require_all(&names)
            })
        })?;
    }
    Ok(())
}

pub(super) fn task_metrics_metadata(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    ctx.skip_in_strict("MoM disabled for strict mode")?;

    with_package(&ctx.marathon(), &ctx.cosmos(), &MARATHON_USER, || {
        let host = wait_for_task_hostname(ctx, "marathon", MARATHON_USER.framework)?;

        poll_prometheus(ctx.api, &ctx.timeouts, &host, |expo| {
            for line in expo.samples() {
                if !line.contains("task_name=\"marathon-user\"") {
                    continue;
                }
                verify!(
                    line.contains("service_name=\"marathon\""),
                    "missing service_name in {line}"
                );
                // whitelisted task label
                verify!(
                    line.contains("DCOS_SERVICE_NAME=\"marathon-user\""),
                    "missing DCOS_SERVICE_NAME in {line}"
                );
            }
            Ok(())
        })
    })
}

pub(super) fn executor_metrics_metadata(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    ctx.skip_in_strict("Framework disabled for strict mode")?;

    with_package(&ctx.marathon(), &ctx.cosmos(), &HELLO_WORLD, || {
        let host = wait_for_task_hostname(ctx, "marathon", HELLO_WORLD.framework)?;

        poll_prometheus(ctx.api, &ctx.timeouts, &host, |expo| {
            for line in expo.samples() {
                // Lines mentioning marathon belong to the scheduler task, not an executor
                if !line.contains("cpus_nr_periods") || line.contains("marathon") {
                    continue;
                }
                verify!(
                    line.contains("service_name=\"hello-world\""),
                    "missing service_name in {line}"
                );
                verify!(
                    line.contains("task_name=\"\""),
                    "executor line carries a task name: {line}"
                );
                verify!(
                    line.contains("executor_name=\"hello\"")
                        || line.contains("executor_name=\"world\""),
                    "unexpected executor_name in {line}"
                );
            }
            Ok(())
        })
    })
}

pub(super) fn metrics_containers(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    let marathon = ctx.marathon();
    let app = definitions::statsd_emitter_app();
    let app_id = definition_id(&app)?;

    with_app(&marathon, &app, || {
        let endpoint = single_endpoint(&marathon, &app_id)?;

        retry(&ctx.timeouts.convergence(), || -> Result<_, ProbeError> {
            let task = get_metrics_for_task(
                ctx.api,
                &ctx.timeouts,
                &endpoint.host,
                definitions::STATSD_EMITTER_TASK,
            )?;
            check_container_datapoints(&task.container, true)?;

            let app_metrics = match &task.app {
                Some(app_metrics) => app_metrics,
                None => {
                    return Err(ProbeError::assertion(format!(
                        "no app metrics for container {}",
                        task.container_id
                    )))
                }
            };
            check_statsd_uptime(app_metrics)
        })?;
        Ok(())
    })
}

fn expect_app_metric_values(
    ctx: &CheckContext<'_>,
    app: serde_json::Value,
    task_name: &str,
    expected: Vec<(String, serde_json::Value)>,
) -> Result<(), ProbeError> {
    let marathon = ctx.marathon();
    let app_id = definition_id(&app)?;

    with_app(&marathon, &app, || {
        let endpoint = single_endpoint(&marathon, &app_id)?;
        for (metric_name, value) in &expected {
            assert_app_metric_value_for_task(
                ctx.api,
                &ctx.timeouts,
                &endpoint.host,
                task_name,
                metric_name,
                value,
            )?;
        }
        Ok(())
    })
}

pub(super) fn statsd_metrics_containers_app(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    expect_app_metric_values(
        ctx,
        definitions::statsd_containers_app(),
        definitions::STATSD_CONTAINERS_TASK,
        definitions::statsd_containers_expected(),
    )
}

pub(super) fn prom_metrics_containers_app(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    expect_app_metric_values(
        ctx,
        definitions::prometheus_containers_app(),
        definitions::PROM_CONTAINERS_TASK,
        definitions::prometheus_containers_expected(),
    )
}

pub(super) fn metrics_containers_nan(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    let marathon = ctx.marathon();
    let app = definitions::nan_gauge_app();
    let app_id = definition_id(&app)?;

    with_app(&marathon, &app, || {
        let endpoint = single_endpoint(&marathon, &app_id)?;
        let datapoint = get_app_metric_for_task(
            ctx.api,
            &ctx.timeouts,
            &endpoint.host,
            definitions::NAN_TASK,
            definitions::NAN_METRIC,
        )?;

        // NaN is reported as an empty string
        verify!(
            datapoint.value == Some(json!("")),
            "unexpected metric value: {:?}",
            datapoint.value
        );
        Ok(())
    })
}
