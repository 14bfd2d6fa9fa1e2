use serde_json::Value;

use super::CheckContext;
use crate::cluster::Node;
use crate::error::ProbeError;
use crate::metrics::api::poll_prometheus;
use crate::metrics::MetricsResponse;
use crate::retry::retry;
use crate::verify;

pub(super) fn metrics_ping(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    let cluster = ctx.cluster();
    for node in cluster.sample_nodes() {
        let response = ctx.api.get(&cluster.metrics(&node, "/ping"))?;
        verify!(
            response.status == 200,
            "Status code: {}, Content {}",
            response.status,
            response.text()
        );
        let ok = response.json_value()?.get("ok").and_then(Value::as_bool);
        verify!(
            ok == Some(true),
            "Status code: {}, Content {}",
            response.status,
            response.text()
        );
    }
    Ok(())
}

pub(super) fn metrics_agents_prom(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    let cluster = ctx.cluster();
    for node in cluster.sample_nodes() {
        let response = ctx.api.get(&cluster.prometheus(&node.host))?;
        verify!(response.status == 200, "Status code: {}", response.status);
    }
    Ok(())
}

fn expect_prometheus(
    ctx: &CheckContext<'_>,
    nodes: &[Node],
    names: &[&str],
) -> Result<(), ProbeError> {
    for node in nodes {
        poll_prometheus(ctx.api, &ctx.timeouts, &node.host, |expo| {
            expo.require_all(names)
        })?;
    }
    Ok(())
}

fn leader(ctx: &CheckContext<'_>) -> Vec<Node> {
    ctx.cluster()
        .sample_nodes()
        .into_iter()
        .take(1)
        .collect()
}

pub(super) fn metrics_agents_mesos(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    expect_prometheus(ctx, &ctx.cluster().sample_agents(), &["mesos_slave_uptime_secs"])
}

pub(super) fn metrics_master_mesos(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    expect_prometheus(ctx, &leader(ctx), &["mesos_master_uptime_secs"])
}

pub(super) fn metrics_master_zookeeper(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    expect_prometheus(ctx, &leader(ctx), &["ZooKeeper", "zookeeper_avg_latency"])
}

pub(super) fn metrics_master_cockroachdb(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    expect_prometheus(ctx, &leader(ctx), &["CockroachDB", "ranges_underreplicated"])
}

pub(super) fn metrics_master_adminrouter(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    expect_prometheus(
        ctx,
        &leader(ctx),
        &["dcos_component_name=\"Admin Router\"", "nginx_vts"],
    )
}

pub(super) fn metrics_agents_adminrouter(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    expect_prometheus(
        ctx,
        &ctx.cluster().sample_agents(),
        &["dcos_component_name=\"Admin Router Agent\"", "nginx_vts"],
    )
}

fn check_node_datapoints(response: &MetricsResponse) -> Result<(), ProbeError> {
    verify!(
        response.datapoints.is_some(),
        "\"datapoints\" dictionary not found in response, got {response:?}"
    );

    for dp in response.datapoints() {
        verify!(
            dp.name.is_some(),
            "\"name\" parameter should not be empty, got {dp:?}"
        );
        if !dp.name().contains("filesystem") {
            continue;
        }
        verify!(dp.tags.is_some(), "\"tags\" key not found, got {dp:?}");
        let path = match dp.tag("path") {
            Some(path) => path,
            None => {
                return Err(ProbeError::assertion(format!(
                    "\"path\" tag not found for filesystem metric, got {dp:?}"
                )))
            }
        };
        verify!(
            !path.is_empty(),
            "\"path\" tag should not be empty for filesystem metrics, got {dp:?}"
        );
    }
    Ok(())
}

fn check_node_dimensions(response: &MetricsResponse) -> Result<(), ProbeError> {
    verify!(
        response.dimensions.is_some(),
        "\"dimensions\" object not found in response, got {response:?}"
    );
    let cluster_id = response.dimension_str("cluster_id");
    verify!(
        cluster_id.is_some(),
        "\"cluster_id\" key not found in dimensions, got {response:?}"
    );
    verify!(cluster_id != Some(""), "expected cluster to contain a value");
    verify!(
        response.dimension_str("mesos_id") == Some(""),
        "expected dimensions to include empty \"mesos_id\""
    );
    Ok(())
}

pub(super) fn metrics_node(ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
    let cluster = ctx.cluster();
    for node in cluster.sample_nodes() {
        let route = cluster.metrics(&node, "/node");
        // The endpoint only answers once the collector finished its first cycle
        let response = retry(&ctx.timeouts.tight(), || -> Result<_, ProbeError> {
            let response = ctx.api.get(&route)?;
            response.expect_status(200)?;
            Ok(response)
        })?;

        let body: MetricsResponse = response.json()?;
        check_node_datapoints(&body)?;
        check_node_dimensions(&body)?;
    }
    Ok(())
}
