// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::{print_json, EndpointArgs, Manager};
use crate::error::CliError;
use nmos_connection_management::ConnectionApi;

#[derive(clap::Args, Debug)]
pub(crate) struct Args {
    #[clap(flatten)]
    pub(crate) endpoint: EndpointArgs,
}

pub(crate) async fn execute(args: Args, manager: &Manager) -> Result<(), CliError> {
    let endpoint = args.endpoint.endpoint()?;
    let staged = manager.api().get_staged(endpoint).await?;
    print_json(&staged)
}
