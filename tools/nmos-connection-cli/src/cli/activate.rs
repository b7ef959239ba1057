// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::{print_json, EndpointArgs, Manager};
use crate::error::CliError;
use nmos_connection_management::activation::{ActivationRequest, ActivationResult};

#[derive(clap::Args, Debug)]
pub(crate) struct Args {
    #[clap(flatten)]
    pub(crate) endpoint: EndpointArgs,

    /// One of `now`, `relative`, `absolute` or `cancel`
    #[clap(long, default_value = "now")]
    pub(crate) mode: String,

    /// Seconds part of the requested TAI time (or offset, for relative activations)
    #[clap(long, default_value = "")]
    pub(crate) secs: String,

    /// Nanoseconds part of the requested TAI time
    #[clap(long, default_value = "0")]
    pub(crate) nanos: String,
}

pub(crate) async fn execute(args: Args, manager: &Manager) -> Result<(), CliError> {
    // validate before touching the network
    let request = ActivationRequest::from_fields(&args.mode, &args.secs, &args.nanos)?;

    let endpoint = args.endpoint.endpoint()?;
    manager.select(endpoint).await?;

    match manager.activate(endpoint.kind, request).await? {
        ActivationResult::Applied => println!("{endpoint} activated"),
        ActivationResult::Scheduled { activation_time } => {
            println!("{endpoint} is going to activate at {activation_time}")
        }
    }

    if let Some(active) = manager.session(endpoint.kind, |session| session.active().cloned())? {
        print_json(&active)?;
    }
    Ok(())
}
