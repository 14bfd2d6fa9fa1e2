//! Registry and runner for the metrics conformance checks.
//!
//! A check is a plain function over a [`CheckContext`]. It returns `Ok(())` once the
//! telemetry it looks for has converged, `ProbeError::Skipped` when it does not apply to
//! the cluster, and any other error on failure.

mod apps;
mod containers;
mod nodes;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::time::Instant;

use crate::cluster::{Cluster, ClusterApi};
use crate::config::{SecurityMode, Timeouts};
use crate::error::ProbeError;
use crate::workload::{Cosmos, Marathon};

/// Everything a check may use.
pub struct CheckContext<'a> {
    pub api: &'a dyn ClusterApi,
    pub timeouts: Timeouts,
    pub security: SecurityMode,
}

impl<'a> CheckContext<'a> {
    pub fn new(api: &'a dyn ClusterApi, timeouts: Timeouts, security: SecurityMode) -> Self {
        Self {
            api,
            timeouts,
            security,
        }
    }

    pub fn cluster(&self) -> &Cluster {
        self.api.cluster()
    }

    pub fn marathon(&self) -> Marathon<'_> {
        Marathon::new(self.api, &self.timeouts)
    }

    pub fn cosmos(&self) -> Cosmos<'_> {
        Cosmos::new(self.api)
    }

    /// Fails with `Skipped(reason)` on clusters running in strict security mode.
    pub fn skip_in_strict(&self, reason: &str) -> Result<(), ProbeError> {
        if self.security == SecurityMode::Strict {
            return Err(ProbeError::Skipped(reason.to_string()));
        }
        Ok(())
    }
}

pub type CheckFn = fn(&CheckContext<'_>) -> Result<(), ProbeError>;

#[derive(Debug, Clone, Copy)]
pub struct Check {
    pub name: &'static str,
    pub description: &'static str,
    pub windows_supported: bool,
    pub run: CheckFn,
}

const fn check(name: &'static str, description: &'static str, run: CheckFn) -> Check {
    Check {
        name,
        description,
        windows_supported: false,
        run,
    }
}

const fn windows(mut check: Check) -> Check {
    check.windows_supported = true;
    check
}

static CHECKS: [Check; 18] = [
    windows(check(
        "metrics_ping",
        "Metrics service answers /ping on master and agents",
        nodes::metrics_ping,
    )),
    check(
        "metrics_agents_prom",
        "Telegraf Prometheus endpoint is reachable on master and agents",
        nodes::metrics_agents_prom,
    ),
    check(
        "metrics_agents_mesos",
        "Mesos agent metrics are exposed on agents",
        nodes::metrics_agents_mesos,
    ),
    check(
        "metrics_master_mesos",
        "Mesos master metrics are exposed on the master",
        nodes::metrics_master_mesos,
    ),
    check(
        "metrics_master_zookeeper",
        "ZooKeeper metrics are exposed on the master",
        nodes::metrics_master_zookeeper,
    ),
    check(
        "metrics_master_cockroachdb",
        "CockroachDB metrics are exposed on the master",
        nodes::metrics_master_cockroachdb,
    ),
    check(
        "metrics_master_adminrouter",
        "Admin Router metrics are exposed on the master",
        nodes::metrics_master_adminrouter,
    ),
    check(
        "metrics_agents_adminrouter",
        "Admin Router Agent metrics are exposed on agents",
        nodes::metrics_agents_adminrouter,
    ),
    check(
        "metrics_agent_statsd",
        "Statsd samples sent to an agent appear in its Prometheus output",
        apps::metrics_agent_statsd,
    ),
    check(
        "task_metrics_metadata",
        "Task metrics carry service and whitelisted label metadata",
        apps::task_metrics_metadata,
    ),
    check(
        "executor_metrics_metadata",
        "Executor metrics carry service and executor metadata",
        apps::executor_metrics_metadata,
    ),
    windows(check(
        "metrics_node",
        "Node endpoint returns datapoints and dimensions",
        nodes::metrics_node,
    )),
    check(
        "metrics_containers",
        "Container and app metrics of a Marathon app can be retrieved",
        apps::metrics_containers,
    ),
    check(
        "statsd_metrics_containers_app",
        "Statsd app metrics appear in the metrics API",
        apps::statsd_metrics_containers_app,
    ),
    check(
        "prom_metrics_containers_app",
        "Prometheus app metrics appear in the metrics API",
        apps::prom_metrics_containers_app,
    ),
    check(
        "metrics_containers_nan",
        "NaN gauges are reported as empty values",
        apps::metrics_containers_nan,
    ),
    check(
        "standalone_container_metrics",
        "Standalone containers report app metrics",
        containers::standalone_container_metrics,
    ),
    check(
        "pod_application_metrics",
        "Pod containers report resource and app metrics",
        containers::pod_application_metrics,
    ),
];

/// Every known check, in execution order.
pub fn all() -> &'static [Check] {
    &CHECKS
}

pub fn find(name: &str) -> Option<&'static Check> {
    CHECKS.iter().find(|c| c.name == name)
}

/// Resolves check names (all checks when empty), optionally limited to Windows-capable ones.
pub fn select(names: &[String], windows_only: bool) -> Result<Vec<&'static Check>, ProbeError> {
    let selected = if names.is_empty() {
        CHECKS.iter().collect()
    } else {
        names
            .iter()
            .map(|name| {
                find(name).ok_or_else(|| ProbeError::InvalidConfig(format!("Unknown check: {name}")))
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(selected
        .into_iter()
        .filter(|c| !windows_only || c.windows_supported)
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl CheckReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

pub fn run_check(ctx: &CheckContext<'_>, check: &Check) -> CheckReport {
    info!("Running check {}", check.name);
    let started_at = Utc::now();
    let start = Instant::now();

    let outcome = match (check.run)(ctx) {
        Ok(()) => {
            info!("Check {} passed", check.name);
            Outcome::Passed
        }
        Err(ProbeError::Skipped(reason)) => {
            warn!("Check {} skipped: {reason}", check.name);
            Outcome::Skipped(reason)
        }
        Err(e) => {
            error!("Check {} failed: {e}", check.name);
            Outcome::Failed(e.to_string())
        }
    };

    CheckReport {
        name: check.name.to_string(),
        outcome,
        started_at,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Runs the checks one after another; a failing check does not stop the run.
pub fn run_checks(ctx: &CheckContext<'_>, checks: &[&Check]) -> Vec<CheckReport> {
    checks.iter().map(|check| run_check(ctx, check)).collect()
}
