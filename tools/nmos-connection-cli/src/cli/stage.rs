// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::{print_json, EndpointArgs, Manager};
use crate::error::CliError;
use std::str::FromStr;
use tracing::info;

/// `<name>=<value>` as given on the command line. The value is kept exactly as typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Assignment {
    pub(crate) name: String,
    pub(crate) value: String,
}

impl FromStr for Assignment {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CliError::MalformedAssignment { raw: s.to_string() };

        let (name, value) = s.split_once('=').ok_or_else(malformed)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(malformed());
        }
        Ok(Assignment {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

#[derive(clap::Args, Debug)]
pub(crate) struct Args {
    #[clap(flatten)]
    pub(crate) endpoint: EndpointArgs,

    /// Leg to edit
    #[clap(long, default_value_t = 0)]
    pub(crate) leg: usize,

    /// Parameter to change, e.g. `--set destination_port=5006`. Can be repeated.
    /// An empty address (`--set multicast_ip=`) clears it.
    #[clap(long = "set", value_name = "NAME=VALUE")]
    pub(crate) assignments: Vec<Assignment>,

    /// Overrides the staged master enable
    #[clap(long)]
    pub(crate) master_enable: Option<bool>,

    /// Overrides the peer the endpoint is connected to. Pass an empty string to disconnect
    #[clap(long)]
    pub(crate) peer_id: Option<String>,
}

pub(crate) async fn execute(args: Args, manager: &Manager) -> Result<(), CliError> {
    let endpoint = args.endpoint.endpoint()?;
    let mut view = manager.select(endpoint).await?;
    if args.leg != view.displayed_leg {
        view = manager.select_leg(endpoint.kind, args.leg, &view.form)?;
    }

    let mut form = view.form;
    for assignment in args.assignments {
        if !view.visible_params.contains(&assignment.name) {
            info!(
                "'{}' is not a parameter of {endpoint}. it is going to be ignored",
                assignment.name
            );
        }
        form.set_field(assignment.name, assignment.value);
    }
    if let Some(master_enable) = args.master_enable {
        form.master_enable = master_enable;
    }
    if let Some(peer_id) = args.peer_id {
        form.peer_id = peer_id;
    }

    manager.stage(endpoint.kind, &form).await?;
    let staged = manager.session(endpoint.kind, |session| {
        session.params().to_stage_request()
    })?;
    print_json(&staged)
}
