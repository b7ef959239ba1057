// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::{Config, API_ROOT_ENV};
use crate::error::CliError;
use crate::logging::setup_tracing_logger;
use clap::{Parser, Subcommand};
use nmos_connection_management::api::routes::ApiVersion;
use nmos_connection_management::{ConnectionManager, Endpoint, HttpConnectionApi};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

mod activate;
mod active;
mod constraints;
mod stage;
mod staged;
mod transport_file;

pub(crate) type Manager = ConnectionManager<HttpConnectionApi>;

#[derive(Parser, Debug)]
#[clap(author = "Nymtech", version, about)]
pub(crate) struct Cli {
    /// Path to a TOML config file with the api and logging settings.
    #[clap(short, long)]
    pub(crate) config: Option<PathBuf>,

    /// Root of the device's connection api, e.g. http://192.168.1.50:8080
    #[clap(long, env = API_ROOT_ENV)]
    pub(crate) api_root: Option<String>,

    /// Version of the connection api to talk, v1.0 or v1.1
    #[clap(long)]
    pub(crate) api_version: Option<ApiVersion>,

    #[clap(subcommand)]
    command: Commands,
}

impl Cli {
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let config = match &self.config {
            Some(path) => Config::read_from_toml_file(path)?,
            None => Config::default(),
        };
        if !config.logging.disable_logs {
            setup_tracing_logger();
        }

        let client_config = config.client_config(self.api_root.as_deref(), self.api_version)?;
        let manager = ConnectionManager::new(HttpConnectionApi::new(client_config)?);

        match self.command {
            Commands::Constraints(args) => constraints::execute(args, &manager).await,
            Commands::Staged(args) => staged::execute(args, &manager).await,
            Commands::Stage(args) => stage::execute(args, &manager).await,
            Commands::StageTransportFile(args) => {
                transport_file::execute_stage(args, &manager).await
            }
            Commands::Activate(args) => activate::execute(args, &manager).await,
            Commands::Active(args) => active::execute(args, &manager).await,
            Commands::TransportFile(args) => transport_file::execute_fetch(args, &manager).await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Show the per-leg constraints of a sender or receiver
    Constraints(constraints::Args),

    /// Show the staged parameters of a sender or receiver
    Staged(staged::Args),

    /// Edit and stage the transport parameters of a single leg
    Stage(stage::Args),

    /// Stage a transport file (e.g. SDP) on a receiver
    StageTransportFile(transport_file::StageArgs),

    /// Activate (or schedule the activation of) the staged parameters
    Activate(activate::Args),

    /// Show the parameters a sender or receiver is currently running with
    Active(active::Args),

    /// Print the transport file published by a sender
    TransportFile(transport_file::FetchArgs),
}

#[derive(clap::Args, Debug, Clone, Copy)]
#[group(required = true, multiple = false)]
pub(crate) struct EndpointArgs {
    /// Id of the sender to operate on
    #[clap(long)]
    sender: Option<Uuid>,

    /// Id of the receiver to operate on
    #[clap(long)]
    receiver: Option<Uuid>,
}

impl EndpointArgs {
    pub(crate) fn endpoint(&self) -> Result<Endpoint, CliError> {
        match (self.sender, self.receiver) {
            (Some(id), _) => Ok(Endpoint::sender(id)),
            (None, Some(id)) => Ok(Endpoint::receiver(id)),
            (None, None) => Err(CliError::NoEndpointProvided),
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
