// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::{print_json, Manager};
use crate::error::CliError;
use nmos_connection_management::staging::TransportFile;
use nmos_connection_management::{Endpoint, EndpointKind};
use std::path::PathBuf;
use uuid::Uuid;

const SDP_MEDIA_TYPE: &str = "application/sdp";

#[derive(clap::Args, Debug)]
pub(crate) struct StageArgs {
    /// Id of the receiver to stage the file on
    #[clap(long)]
    pub(crate) receiver: Uuid,

    /// Path to the transport file
    #[clap(long)]
    pub(crate) file: PathBuf,

    #[clap(long, default_value = SDP_MEDIA_TYPE)]
    pub(crate) media_type: String,

    /// Sender the transport file originates from
    #[clap(long)]
    pub(crate) sender_id: Option<Uuid>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct FetchArgs {
    /// Id of the sender whose transport file should be printed
    #[clap(long)]
    pub(crate) sender: Uuid,
}

pub(crate) async fn execute_stage(args: StageArgs, manager: &Manager) -> Result<(), CliError> {
    let data = std::fs::read_to_string(&args.file).map_err(|source| {
        CliError::TransportFileReadFailure {
            path: args.file.clone(),
            source,
        }
    })?;

    manager.select(Endpoint::receiver(args.receiver)).await?;
    manager
        .stage_transport_file(TransportFile::new(args.media_type, data), args.sender_id)
        .await?;

    let staged = manager.session(EndpointKind::Receiver, |session| {
        session.transport_file().cloned()
    })?;
    print_json(&staged)
}

pub(crate) async fn execute_fetch(args: FetchArgs, manager: &Manager) -> Result<(), CliError> {
    manager.select(Endpoint::sender(args.sender)).await?;
    let transport_file = manager.sender_transport_file().await?;
    print!("{transport_file}");
    Ok(())
}
