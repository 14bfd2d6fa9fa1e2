use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::cluster::{ClusterApi, MediaType};
use crate::error::ProbeError;

const INSTALL: MediaType = MediaType {
    content_type: "application/vnd.dcos.package.install-request+json;charset=utf-8;version=v1",
    accept: "application/vnd.dcos.package.install-response+json;charset=utf-8;version=v2",
};

const UNINSTALL: MediaType = MediaType {
    content_type: "application/vnd.dcos.package.uninstall-request+json;charset=utf-8;version=v1",
    accept: "application/vnd.dcos.package.uninstall-response+json;charset=utf-8;version=v1",
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallResponse {
    app_id: String,
}

/// Package manager behind the leader's Admin Router.
pub struct Cosmos<'a> {
    api: &'a dyn ClusterApi,
}

impl<'a> Cosmos<'a> {
    pub fn new(api: &'a dyn ClusterApi) -> Self {
        Self { api }
    }

    /// Installs `name` at `version` and returns the Marathon app ID it runs under.
    pub fn install_package(&self, name: &str, version: &str) -> Result<String, ProbeError> {
        info!("Installing package {name} {version}");
        let route = self
            .api
            .cluster()
            .leader("/package/install")
            .with_media_type(INSTALL);
        let body = json!({"packageName": name, "packageVersion": version});

        let response = self.api.post(&route, &body)?;
        response.error_for_status()?;
        let installed: InstallResponse = response.json()?;
        info!("Package {name} installed as {}", installed.app_id);
        Ok(installed.app_id)
    }

    pub fn uninstall_package(&self, name: &str, app_id: &str) -> Result<(), ProbeError> {
        info!("Uninstalling package {name} ({app_id})");
        let route = self
            .api
            .cluster()
            .leader("/package/uninstall")
            .with_media_type(UNINSTALL);
        let body = json!({"packageName": name, "appId": app_id});

        self.api.post(&route, &body)?.error_for_status()?;
        Ok(())
    }
}
