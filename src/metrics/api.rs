//! Polling fetchers for the node metrics API and Prometheus output.
//!
//! Each fetcher is wrapped in its own retry loop, and several of them nest: the outer loop
//! waits for a condition across collector cycles while the inner one rides out transient
//! errors of a single request.

use serde_json::Value;

use super::{value_matches, Datapoint, Exposition, MetricsResponse};
use crate::cluster::ClusterApi;
use crate::config::Timeouts;
use crate::error::ProbeError;
use crate::retry::retry;
use crate::verify;

/// Prometheus output of `host`, retried until it answers 200.
pub fn get_metrics_prom(
    api: &dyn ClusterApi,
    timeouts: &Timeouts,
    host: &str,
) -> Result<Exposition, ProbeError> {
    let route = api.cluster().prometheus(host);
    Ok(retry(&timeouts.convergence(), || -> Result<_, ProbeError> {
        let response = api.get(&route)?;
        response.expect_status(200)?;
        Ok(Exposition::new(response.text()))
    })?)
}

/// Polls `host`'s Prometheus output until `check` accepts it.
pub fn poll_prometheus<F>(
    api: &dyn ClusterApi,
    timeouts: &Timeouts,
    host: &str,
    mut check: F,
) -> Result<(), ProbeError>
where
    F: FnMut(&Exposition) -> Result<(), ProbeError>,
{
    Ok(retry(&timeouts.convergence(), || -> Result<_, ProbeError> {
        let exposition = get_metrics_prom(api, timeouts, host)?;
        check(&exposition)
    })?)
}

/// Container IDs the metrics API on `host` knows about; retried until non-empty.
pub fn get_container_ids(
    api: &dyn ClusterApi,
    timeouts: &Timeouts,
    host: &str,
) -> Result<Vec<String>, ProbeError> {
    let route = api.cluster().metrics_on_host(host, "/containers");
    Ok(retry(&timeouts.metrics_poll(), || -> Result<_, ProbeError> {
        let response = api.get(&route)?;
        response.expect_status(200)?;
        let container_ids: Vec<String> = response.json()?;
        verify!(!container_ids.is_empty(), "must have at least 1 container");
        Ok(container_ids)
    })?)
}

fn get_optional_metrics(
    api: &dyn ClusterApi,
    timeouts: &Timeouts,
    host: &str,
    path: &str,
) -> Result<Option<MetricsResponse>, ProbeError> {
    let route = api.cluster().metrics_on_host(host, path);
    Ok(retry(&timeouts.metrics_poll(), || -> Result<_, ProbeError> {
        let response = api.get(&route)?;
        if response.status == 204 {
            return Ok(None);
        }
        response.expect_status(200)?;
        let metrics: MetricsResponse = response.json()?;
        metrics.require_shape()?;
        Ok(Some(metrics))
    })?)
}

/// Resource metrics of one container, `None` when the API answers 204.
pub fn get_container_metrics(
    api: &dyn ClusterApi,
    timeouts: &Timeouts,
    host: &str,
    container_id: &str,
) -> Result<Option<MetricsResponse>, ProbeError> {
    get_optional_metrics(api, timeouts, host, &format!("/containers/{container_id}"))
}

/// Application metrics of one container, `None` when the API answers 204.
pub fn get_app_metrics(
    api: &dyn ClusterApi,
    timeouts: &Timeouts,
    host: &str,
    container_id: &str,
) -> Result<Option<MetricsResponse>, ProbeError> {
    get_optional_metrics(
        api,
        timeouts,
        host,
        &format!("/containers/{container_id}/app"),
    )
}

/// Metrics of the container running a task.
#[derive(Debug, Clone)]
pub struct TaskMetrics {
    pub container_id: String,
    pub container: MetricsResponse,
    pub app: Option<MetricsResponse>,
}

/// Finds the container whose `task_name` dimension equals `task_name` and fetches its
/// resource and application metrics.
pub fn get_metrics_for_task(
    api: &dyn ClusterApi,
    timeouts: &Timeouts,
    host: &str,
    task_name: &str,
) -> Result<TaskMetrics, ProbeError> {
    Ok(retry(&timeouts.metrics_poll(), || -> Result<_, ProbeError> {
        let mut seen: Vec<(String, Option<String>)> = Vec::new();

        for container_id in get_container_ids(api, timeouts, host)? {
            let container = match get_container_metrics(api, timeouts, host, &container_id)? {
                Some(metrics) => metrics,
                None => {
                    seen.push((container_id, None));
                    continue;
                }
            };

            let name = container.dimension_str("task_name");
            if name != Some(task_name) {
                seen.push((container_id, name.map(String::from)));
                continue;
            }

            let app = get_app_metrics(api, timeouts, host, &container_id)?;
            return Ok(TaskMetrics {
                container_id,
                container,
                app,
            });
        }

        Err(ProbeError::TaskNotFound {
            task: task_name.to_string(),
            host: host.to_string(),
            seen: format!("{seen:?}"),
        })
    })?)
}

/// The single app datapoint named `metric_name` reported for `task_name`.
pub fn get_app_metric_for_task(
    api: &dyn ClusterApi,
    timeouts: &Timeouts,
    host: &str,
    task_name: &str,
    metric_name: &str,
) -> Result<Datapoint, ProbeError> {
    Ok(retry(&timeouts.metrics_poll(), || -> Result<_, ProbeError> {
        let task = get_metrics_for_task(api, timeouts, host, task_name)?;
        let app = match task.app {
            Some(app) => app,
            None => {
                return Err(ProbeError::assertion(format!(
                    "missing metrics for task {task_name}"
                )))
            }
        };
        let matching = app.matching(metric_name);
        verify!(
            matching.len() == 1,
            "expected 1 datapoint for metric {metric_name}, got {}",
            matching.len()
        );
        Ok(matching[0].clone())
    })?)
}

/// Waits until app metric `metric_name` of `task_name` reports `expected`.
pub fn assert_app_metric_value_for_task(
    api: &dyn ClusterApi,
    timeouts: &Timeouts,
    host: &str,
    task_name: &str,
    metric_name: &str,
    expected: &Value,
) -> Result<(), ProbeError> {
    Ok(retry(&timeouts.metrics_poll(), || -> Result<_, ProbeError> {
        let datapoint = get_app_metric_for_task(api, timeouts, host, task_name, metric_name)?;
        let actual = datapoint.value.clone().unwrap_or(Value::Null);
        verify!(
            value_matches(&actual, expected),
            "metric {metric_name} of task {task_name}: expected {expected}, got {actual}"
        );
        Ok(())
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::{fast_timeouts, FakeCluster, FakeReply};
    use serde_json::json;

    const HOST: &str = "10.0.0.2";

    fn container(task_name: &str, cid: &str) -> Value {
        json!({
            "datapoints": [{"name": "cpus.user.time", "tags": {"container_id": cid}}],
            "dimensions": {"task_name": task_name}
        })
    }

    #[test]
    fn test_prometheus_retries_until_200() {
        let fake = FakeCluster::standard();
        let route = fake.cluster().prometheus(HOST);
        fake.on_get(
            &route,
            vec![
                FakeReply::text(503, ""),
                FakeReply::text(200, "mesos_slave_uptime_secs 5"),
            ],
        );

        let expo = get_metrics_prom(&fake, &fast_timeouts(), HOST).unwrap();
        assert!(expo.contains("mesos_slave_uptime_secs"));
        assert_eq!(fake.count(crate::cluster::Method::Get, &route), 2);
    }

    #[test]
    fn test_container_ids_require_at_least_one() {
        let fake = FakeCluster::standard();
        let route = fake.cluster().metrics_on_host(HOST, "/containers");
        fake.on_get(&route, vec![FakeReply::json(200, json!([]))]);

        let err = get_container_ids(&fake, &fast_timeouts(), HOST).unwrap_err();
        assert_eq!(err.root().to_string(), "must have at least 1 container");
    }

    #[test]
    fn test_no_content_maps_to_none() {
        let fake = FakeCluster::standard();
        let route = fake.cluster().metrics_on_host(HOST, "/containers/abc/app");
        fake.on_get(&route, vec![FakeReply::no_content()]);

        assert!(get_app_metrics(&fake, &fast_timeouts(), HOST, "abc")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_metrics_for_task_fans_out_over_containers() {
        let fake = FakeCluster::standard();
        let cluster = fake.cluster().clone();
        fake.on_get(
            &cluster.metrics_on_host(HOST, "/containers"),
            vec![FakeReply::json(200, json!(["idle", "other", "target"]))],
        )
        .on_get(
            &cluster.metrics_on_host(HOST, "/containers/idle"),
            vec![FakeReply::no_content()],
        )
        .on_get(
            &cluster.metrics_on_host(HOST, "/containers/other"),
            vec![FakeReply::json(200, container("someone-else", "other"))],
        )
        .on_get(
            &cluster.metrics_on_host(HOST, "/containers/target"),
            vec![FakeReply::json(200, container("statsd-emitter", "target"))],
        )
        .on_get(
            &cluster.metrics_on_host(HOST, "/containers/target/app"),
            vec![FakeReply::json(
                200,
                json!({"datapoints": [{"name": "gauge", "value": 100}], "dimensions": {}}),
            )],
        );

        let task = get_metrics_for_task(&fake, &fast_timeouts(), HOST, "statsd-emitter").unwrap();
        assert_eq!(task.container_id, "target");
        assert_eq!(task.app.unwrap().datapoints().len(), 1);

        let datapoint =
            get_app_metric_for_task(&fake, &fast_timeouts(), HOST, "statsd-emitter", "gauge")
                .unwrap();
        assert_eq!(datapoint.value, Some(json!(100)));

        assert_app_metric_value_for_task(
            &fake,
            &fast_timeouts(),
            HOST,
            "statsd-emitter",
            "gauge",
            &json!(100),
        )
        .unwrap();
    }

    #[test]
    fn test_metrics_for_missing_task_lists_seen_names() {
        let fake = FakeCluster::standard();
        let cluster = fake.cluster().clone();
        fake.on_get(
            &cluster.metrics_on_host(HOST, "/containers"),
            vec![FakeReply::json(200, json!(["other"]))],
        )
        .on_get(
            &cluster.metrics_on_host(HOST, "/containers/other"),
            vec![FakeReply::json(200, container("someone-else", "other"))],
        );

        let err = get_metrics_for_task(&fake, &fast_timeouts(), HOST, "missing").unwrap_err();
        match err.root() {
            ProbeError::TaskNotFound { task, seen, .. } => {
                assert_eq!(task, "missing");
                assert!(seen.contains("someone-else"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_metric_value_mismatch_times_out() {
        let fake = FakeCluster::standard();
        let cluster = fake.cluster().clone();
        fake.on_get(
            &cluster.metrics_on_host(HOST, "/containers"),
            vec![FakeReply::json(200, json!(["target"]))],
        )
        .on_get(
            &cluster.metrics_on_host(HOST, "/containers/target"),
            vec![FakeReply::json(200, container("app", "target"))],
        )
        .on_get(
            &cluster.metrics_on_host(HOST, "/containers/target/app"),
            vec![FakeReply::json(
                200,
                json!({"datapoints": [{"name": "count", "value": 1}], "dimensions": {}}),
            )],
        );

        let err = assert_app_metric_value_for_task(
            &fake,
            &fast_timeouts(),
            HOST,
            "app",
            "count",
            &json!(2),
        )
        .unwrap_err();
        assert!(err.root().to_string().contains("expected 2, got 1"));
    }
}
