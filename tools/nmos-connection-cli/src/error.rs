// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use nmos_connection_management::ConnectionError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("failed to load config file using path '{}'. detailed message: {source}", path.display())]
    ConfigLoadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config file at '{}' is malformed: {source}", path.display())]
    MalformedConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("the connection api root is unknown. provide it with --api-root, NMOS_CONNECTION_API_ROOT or the config file")]
    MissingApiRoot,

    #[error("either --sender or --receiver has to be provided")]
    NoEndpointProvided,

    #[error("'{raw}' is not a valid assignment. expected <name>=<value>")]
    MalformedAssignment { raw: String },

    #[error("failed to read the transport file at '{}': {source}", path.display())]
    TransportFileReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialise the output: {source}")]
    OutputSerialisationFailure {
        #[from]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
