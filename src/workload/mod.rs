//! Scoped workloads: everything deployed here is torn down again, whatever the body returns.

pub mod cosmos;
pub mod definitions;
pub mod marathon;

pub use cosmos::Cosmos;
pub use definitions::Package;
pub use marathon::{definition_id, Endpoint, Marathon};

use log::{info, warn};
use serde_json::Value;

use crate::cluster::fetch_state;
use crate::error::ProbeError;
use crate::retry::retry;
use crate::verify;

/// Combines the body outcome with the teardown outcome. A body error wins; a teardown
/// error that would otherwise be lost is logged.
fn settle<T>(
    what: &str,
    outcome: Result<T, ProbeError>,
    teardown: Result<(), ProbeError>,
) -> Result<T, ProbeError> {
    match (outcome, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(teardown_err)) => Err(teardown_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(teardown_err)) => {
            warn!("Teardown of {what} failed: {teardown_err}");
            Err(err)
        }
    }
}

/// Deploys `app`, runs `body`, and destroys the app again. A failed deployment is
/// cleaned up too.
pub fn with_app<T, F>(marathon: &Marathon<'_>, app: &Value, body: F) -> Result<T, ProbeError>
where
    F: FnOnce() -> Result<T, ProbeError>,
{
    let id = definition_id(app)?;
    let outcome = marathon.deploy_app(app).and_then(|()| body());
    settle(&id, outcome, marathon.destroy_app(&id))
}

/// Pod counterpart of [`with_app`].
pub fn with_pod<T, F>(marathon: &Marathon<'_>, pod: &Value, body: F) -> Result<T, ProbeError>
where
    F: FnOnce() -> Result<T, ProbeError>,
{
    let id = definition_id(pod)?;
    let outcome = marathon.deploy_pod(pod).and_then(|()| body());
    settle(&id, outcome, marathon.destroy_pod(&id))
}

/// Installs `package`, runs `body`, uninstalls it, and waits until its framework has
/// left the cluster.
pub fn with_package<T, F>(
    marathon: &Marathon<'_>,
    cosmos: &Cosmos<'_>,
    package: &Package,
    body: F,
) -> Result<T, ProbeError>
where
    F: FnOnce() -> Result<T, ProbeError>,
{
    let app_id = cosmos.install_package(package.name, package.version)?;
    let outcome = marathon.wait_for_deployments_complete().and_then(|()| body());

    let teardown = cosmos
        .uninstall_package(package.name, &app_id)
        .and_then(|()| wait_for_framework_teardown(marathon, package.framework));
    settle(package.name, outcome, teardown)
}

fn wait_for_framework_teardown(marathon: &Marathon<'_>, framework: &str) -> Result<(), ProbeError> {
    let api = marathon.api();
    retry(&marathon.timeouts().teardown(), || -> Result<_, ProbeError> {
        let state = fetch_state(api)?;
        verify!(
            !state.is_framework_running(framework),
            "Framework {framework} still running"
        );
        Ok(())
    })?;
    info!("Framework {framework} is gone");
    Ok(())
}
