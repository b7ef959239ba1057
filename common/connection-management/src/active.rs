// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::api::ConnectionApi;
use crate::error::ConnectionError;
use crate::params::{Endpoint, EndpointKind, LegParams};
use crate::staging::ActivationEcho;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Parameters the peer is currently running with, as opposed to the staged ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSnapshot {
    pub master_enable: bool,

    pub transport_params: Vec<LegParams>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationEcho>,
}

impl ActiveSnapshot {
    pub fn leg_count(&self) -> usize {
        self.transport_params.len()
    }

    pub fn peer_id(&self, kind: EndpointKind) -> Option<Uuid> {
        match kind {
            EndpointKind::Sender => self.receiver_id,
            EndpointKind::Receiver => self.sender_id,
        }
    }
}

/// Read-only view of the `active` resource.
pub struct ActiveParameterMonitor<'a, A: ?Sized> {
    api: &'a A,
}

impl<'a, A> ActiveParameterMonitor<'a, A>
where
    A: ConnectionApi + ?Sized,
{
    pub fn new(api: &'a A) -> Self {
        ActiveParameterMonitor { api }
    }

    pub async fn fetch_active(
        &self,
        endpoint: Endpoint,
    ) -> Result<ActiveSnapshot, ConnectionError> {
        let snapshot = self.api.get_active(endpoint).await?;
        debug!(
            "{endpoint} is active with {} leg(s) (master_enable: {})",
            snapshot.leg_count(),
            snapshot.master_enable
        );
        Ok(snapshot)
    }
}
