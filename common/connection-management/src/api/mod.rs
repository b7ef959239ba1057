// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::active::ActiveSnapshot;
use crate::constraints::LegConstraints;
use crate::error::ConnectionError;
use crate::params::Endpoint;
use crate::staging::{PeerResponse, StagedDocument, StagedPatch};
use async_trait::async_trait;
use std::sync::Arc;

pub mod client;
pub mod routes;

/// The remote connection management service, as seen by the engine.
///
/// Reads fail with [`ConnectionError::RemoteRejected`] on any non-success status.
/// `PATCH` responses are handed back raw, since their meaning depends on what was sent.
#[async_trait]
pub trait ConnectionApi: Send + Sync {
    async fn get_constraints(
        &self,
        endpoint: Endpoint,
    ) -> Result<Vec<LegConstraints>, ConnectionError>;

    async fn get_staged(&self, endpoint: Endpoint) -> Result<StagedDocument, ConnectionError>;

    async fn patch_staged(
        &self,
        endpoint: Endpoint,
        patch: &StagedPatch,
    ) -> Result<PeerResponse, ConnectionError>;

    async fn get_active(&self, endpoint: Endpoint) -> Result<ActiveSnapshot, ConnectionError>;

    /// Transport file (usually SDP) currently published by a sender.
    async fn get_transport_file(&self, sender: Endpoint) -> Result<String, ConnectionError>;
}

#[async_trait]
impl<T> ConnectionApi for Arc<T>
where
    T: ConnectionApi + ?Sized,
{
    async fn get_constraints(
        &self,
        endpoint: Endpoint,
    ) -> Result<Vec<LegConstraints>, ConnectionError> {
        (**self).get_constraints(endpoint).await
    }

    async fn get_staged(&self, endpoint: Endpoint) -> Result<StagedDocument, ConnectionError> {
        (**self).get_staged(endpoint).await
    }

    async fn patch_staged(
        &self,
        endpoint: Endpoint,
        patch: &StagedPatch,
    ) -> Result<PeerResponse, ConnectionError> {
        (**self).patch_staged(endpoint, patch).await
    }

    async fn get_active(&self, endpoint: Endpoint) -> Result<ActiveSnapshot, ConnectionError> {
        (**self).get_active(endpoint).await
    }

    async fn get_transport_file(&self, sender: Endpoint) -> Result<String, ConnectionError> {
        (**self).get_transport_file(sender).await
    }
}
