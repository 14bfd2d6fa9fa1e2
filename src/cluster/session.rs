use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use super::{ApiResponse, Cluster, ClusterApi, Method, Route};
use crate::config::ProbeConfig;
use crate::error::ProbeError;

/// Blocking HTTP session against a live cluster.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    cluster: Cluster,
    auth_token: Option<String>,
}

impl HttpSession {
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            cluster: Cluster::from_config(config),
            auth_token: config.auth_token.clone(),
        })
    }

    fn headers(&self, route: &Route, with_body: bool) -> Result<HeaderMap, ProbeError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("token={token}"))
                .map_err(|e| ProbeError::InvalidConfig(format!("auth token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        if with_body {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static(route.media_type.content_type),
            );
            headers.insert(ACCEPT, HeaderValue::from_static(route.media_type.accept));
        }
        Ok(headers)
    }
}

impl ClusterApi for HttpSession {
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
        log::debug!("{method:?} {url}");

        let request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        }
        .headers(self.headers(route, body.is_some())?);

        let request = match body {
            Some(body) => request.json(body),
            None => request,
        };

        let response = request.send()?;
        let status = response.status().as_u16();
        let bytes = response.bytes()?;

        Ok(ApiResponse::new(url, status, bytes.to_vec()))
    }
}
