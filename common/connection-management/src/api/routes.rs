// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConnectionError;
use crate::params::Endpoint;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use url::Url;

pub const CONNECTION_API_NAMESPACE: &str = "x-nmos/connection";
pub const SINGLE: &str = "single";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "v1.0")]
    V1_0,

    #[serde(rename = "v1.1")]
    V1_1,
}

impl Display for ApiVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ApiVersion::V1_0 => write!(f, "v1.0"),
            ApiVersion::V1_1 => write!(f, "v1.1"),
        }
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1.0" | "1.0" => Ok(ApiVersion::V1_0),
            "v1.1" | "1.1" => Ok(ApiVersion::V1_1),
            other => Err(format!("unsupported connection api version '{other}'")),
        }
    }
}

/// Resource paths of the `single` connection api.
///
/// Reads go to the trailing-slash form of a resource while `PATCH` targets `staged`
/// without it, matching what the peer routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    base: String,
}

impl Routes {
    pub fn new(root: &Url, version: ApiVersion) -> Self {
        let root = root.as_str().trim_end_matches('/');
        Routes {
            base: format!("{root}/{CONNECTION_API_NAMESPACE}/{version}/{SINGLE}"),
        }
    }

    pub fn parse(root: &str, version: ApiVersion) -> Result<Self, ConnectionError> {
        let parsed = Url::parse(root).map_err(|source| ConnectionError::MalformedApiRoot {
            raw: root.to_string(),
            source,
        })?;
        Ok(Routes::new(&parsed, version))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn resource(&self, endpoint: Endpoint, resource: &str) -> String {
        format!(
            "{}/{}/{}/{resource}",
            self.base,
            endpoint.kind.resource(),
            endpoint.id
        )
    }

    pub fn constraints(&self, endpoint: Endpoint) -> String {
        self.resource(endpoint, "constraints/")
    }

    pub fn staged(&self, endpoint: Endpoint) -> String {
        self.resource(endpoint, "staged/")
    }

    pub fn staged_patch(&self, endpoint: Endpoint) -> String {
        self.resource(endpoint, "staged")
    }

    pub fn active(&self, endpoint: Endpoint) -> String {
        self.resource(endpoint, "active/")
    }

    pub fn transport_file(&self, sender: Endpoint) -> String {
        self.resource(sender, "transportfile/")
    }
}
