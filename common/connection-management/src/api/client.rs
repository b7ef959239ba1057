// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::active::ActiveSnapshot;
use crate::api::routes::{ApiVersion, Routes};
use crate::api::ConnectionApi;
use crate::constraints::LegConstraints;
use crate::error::ConnectionError;
use crate::params::Endpoint;
use crate::staging::{PeerResponse, StagedDocument, StagedPatch};
use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Root of the device's http api, e.g. `http://localhost:8080`.
    pub root_url: Url,

    #[serde(default)]
    pub version: ApiVersion,

    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    #[serde(default)]
    pub user_agent: Option<String>,
}

impl ClientConfig {
    pub fn new(root_url: Url) -> Self {
        ClientConfig {
            root_url,
            version: ApiVersion::default(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }
}

/// [`ConnectionApi`] talking json over http to a real device.
#[derive(Debug, Clone)]
pub struct HttpConnectionApi {
    routes: Routes,
    inner_client: reqwest::Client,
}

impl HttpConnectionApi {
    pub fn builder(root_url: impl Into<String>) -> Result<ClientBuilder, ConnectionError> {
        ClientBuilder::new(root_url)
    }

    pub fn new(config: ClientConfig) -> Result<Self, ConnectionError> {
        let builder = ClientBuilder::from_url(config.root_url)
            .version(config.version)
            .timeout(config.timeout);
        match config.user_agent {
            Some(user_agent) => builder.user_agent(user_agent).build(),
            None => builder.build(),
        }
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    fn build_request(&self, method: Method, url: &str) -> RequestBuilder {
        trace!("{method} {url}");
        self.inner_client
            .request(method, url)
            .header(header::ACCEPT, "application/json")
    }

    async fn send(
        &self,
        request: RequestBuilder,
        url: &str,
    ) -> Result<PeerResponse, ConnectionError> {
        let response = request
            .send()
            .await
            .map_err(|source| ConnectionError::RemoteUnavailable {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ConnectionError::RemoteUnavailable {
                url: url.to_string(),
                source,
            })?;
        debug!("{url} responded with {status}");

        Ok(PeerResponse::from_bytes(url, status, &bytes))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, ConnectionError> {
        let response = self
            .send(self.build_request(Method::GET, &url), &url)
            .await?;
        if !response.status.is_success() {
            return Err(response.into_rejection());
        }
        response.decode()
    }
}

#[async_trait]
impl ConnectionApi for HttpConnectionApi {
    async fn get_constraints(
        &self,
        endpoint: Endpoint,
    ) -> Result<Vec<LegConstraints>, ConnectionError> {
        self.get_json(self.routes.constraints(endpoint)).await
    }

    async fn get_staged(&self, endpoint: Endpoint) -> Result<StagedDocument, ConnectionError> {
        self.get_json(self.routes.staged(endpoint)).await
    }

    async fn patch_staged(
        &self,
        endpoint: Endpoint,
        patch: &StagedPatch,
    ) -> Result<PeerResponse, ConnectionError> {
        let url = self.routes.staged_patch(endpoint);
        let request = self.build_request(Method::PATCH, &url).json(patch);
        self.send(request, &url).await
    }

    async fn get_active(&self, endpoint: Endpoint) -> Result<ActiveSnapshot, ConnectionError> {
        self.get_json(self.routes.active(endpoint)).await
    }

    async fn get_transport_file(&self, sender: Endpoint) -> Result<String, ConnectionError> {
        let url = self.routes.transport_file(sender);
        let request = self
            .inner_client
            .request(Method::GET, &url)
            .header(header::ACCEPT, "application/sdp, text/plain;q=0.9, */*;q=0.1");
        let unavailable = |source| ConnectionError::RemoteUnavailable {
            url: url.clone(),
            source,
        };

        let response = request.send().await.map_err(unavailable)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(unavailable)?;
        if !status.is_success() {
            return Err(PeerResponse::from_bytes(url.as_str(), status, &bytes).into_rejection());
        }

        // transport files are plain text, not json
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub struct ClientBuilder {
    root_url: Url,
    version: ApiVersion,
    timeout: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    pub fn new(root_url: impl Into<String>) -> Result<Self, ConnectionError> {
        let root_url = root_url.into();
        let parsed_url =
            Url::from_str(&root_url).map_err(|source| ConnectionError::MalformedApiRoot {
                raw: root_url,
                source,
            })?;
        Ok(ClientBuilder::from_url(parsed_url))
    }

    pub fn from_url(root_url: Url) -> Self {
        ClientBuilder {
            root_url,
            version: ApiVersion::default(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    #[must_use]
    pub fn version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn build(self) -> Result<HttpConnectionApi, ConnectionError> {
        let user_agent = self.user_agent.unwrap_or_else(default_user_agent);
        Ok(HttpConnectionApi {
            routes: Routes::new(&self.root_url, self.version),
            inner_client: reqwest::ClientBuilder::new()
                .user_agent(user_agent)
                .timeout(self.timeout)
                .build()
                .map_err(|source| ConnectionError::ClientBuildFailure { source })?,
        })
    }
}
