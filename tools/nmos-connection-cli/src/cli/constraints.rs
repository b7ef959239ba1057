// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::{print_json, EndpointArgs, Manager};
use crate::error::CliError;

#[derive(clap::Args, Debug)]
pub(crate) struct Args {
    #[clap(flatten)]
    pub(crate) endpoint: EndpointArgs,
}

pub(crate) async fn execute(args: Args, manager: &Manager) -> Result<(), CliError> {
    let endpoint = args.endpoint.endpoint()?;
    manager.select(endpoint).await?;

    let legs = manager.session(endpoint.kind, |session| session.catalog().legs().to_vec())?;
    print_json(&legs)
}
