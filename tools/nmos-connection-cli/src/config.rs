// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::error::CliError;
use nmos_connection_management::api::client::DEFAULT_TIMEOUT;
use nmos_connection_management::api::routes::ApiVersion;
use nmos_connection_management::{ClientConfig, ConnectionError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub(crate) const API_ROOT_ENV: &str = "NMOS_CONNECTION_API_ROOT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) api: ApiSettings,

    #[serde(default)]
    pub(crate) logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ApiSettings {
    /// Root of the device's http api, e.g. `http://192.168.1.50:8080`.
    pub(crate) root_url: Option<Url>,

    pub(crate) version: ApiVersion,

    #[serde(with = "humantime_serde")]
    pub(crate) timeout: Duration,

    pub(crate) user_agent: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            root_url: None,
            version: ApiVersion::default(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LoggingSettings {
    pub(crate) disable_logs: bool,
}

impl Config {
    pub(crate) fn read_from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path = path.as_ref();
        let raw =
            std::fs::read_to_string(path).map_err(|source| CliError::ConfigLoadFailure {
                path: path.to_path_buf(),
                source,
            })?;
        let loaded = toml::from_str(&raw).map_err(|source| CliError::MalformedConfig {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loaded config file from {}", path.display());
        Ok(loaded)
    }

    /// Resolves the client configuration. Explicit arguments (which already include the
    /// environment) take precedence over the file.
    pub(crate) fn client_config(
        &self,
        api_root: Option<&str>,
        version: Option<ApiVersion>,
    ) -> Result<ClientConfig, CliError> {
        let root_url = match api_root {
            Some(raw) => Url::parse(raw).map_err(|source| ConnectionError::MalformedApiRoot {
                raw: raw.to_string(),
                source,
            })?,
            None => self
                .api
                .root_url
                .clone()
                .ok_or(CliError::MissingApiRoot)?,
        };

        Ok(ClientConfig {
            root_url,
            version: version.unwrap_or(self.api.version),
            timeout: self.api.timeout,
            user_agent: self.api.user_agent.clone(),
        })
    }
}
