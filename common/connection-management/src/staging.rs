// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::activation::ActivationEnvelope;
use crate::api::ConnectionApi;
use crate::error::ConnectionError;
use crate::params::{Endpoint, EndpointKind, LegParams, TransportParameterSet};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Last activation request the peer recorded for the staged resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationEcho {
    #[serde(default)]
    pub mode: Option<String>,

    #[serde(default)]
    pub requested_time: Option<String>,

    #[serde(default)]
    pub activation_time: Option<String>,
}

/// Transport description document (e.g. SDP) staged on a receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportFile {
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,

    #[serde(default)]
    pub data: Option<String>,
}

impl TransportFile {
    pub fn new(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        TransportFile {
            media_type: Some(media_type.into()),
            data: Some(data.into()),
        }
    }
}

/// Body of `GET .../staged/`, also returned by a successful staging `PATCH`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedDocument {
    pub transport_params: Vec<LegParams>,

    pub master_enable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_file: Option<TransportFile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationEcho>,
}

impl StagedDocument {
    pub fn peer_id(&self, kind: EndpointKind) -> Option<Uuid> {
        match kind {
            EndpointKind::Sender => self.receiver_id,
            EndpointKind::Receiver => self.sender_id,
        }
    }
}

/// Staging of the parameters of every leg.
///
/// Exactly one of the peer ids is present and it is sent as an explicit `null` when unset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRequest {
    pub transport_params: Vec<LegParams>,

    pub master_enable: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<Option<Uuid>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<Option<Uuid>>,
}

/// Staging of a receiver's transport file, optionally overriding its sender.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportFilePatch {
    pub transport_file: TransportFile,
    pub sender_id: Option<Uuid>,
}

/// Everything the engine ever sends to `PATCH .../staged`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StagedPatch {
    Parameters(StageRequest),
    TransportFile(TransportFilePatch),
    Activation(ActivationEnvelope),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<u16>,

    #[serde(default)]
    pub error: Option<String>,
}

/// Raw answer of the peer to a `PATCH`. Interpretation depends on what was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerResponse {
    pub url: String,
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl PeerResponse {
    pub fn new(url: impl Into<String>, status: StatusCode, body: serde_json::Value) -> Self {
        PeerResponse {
            url: url.into(),
            status,
            body,
        }
    }

    /// Builds the response out of raw bytes. Bodies that are not json are kept as text.
    pub fn from_bytes(url: impl Into<String>, status: StatusCode, bytes: &[u8]) -> Self {
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(bytes).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
            })
        };
        PeerResponse::new(url, status, body)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ConnectionError> {
        serde_json::from_value(self.body.clone())
            .map_err(|err| ConnectionError::malformed(self.url.as_str(), err))
    }

    /// The peer's own explanation of a failure, falling back to the status reason.
    pub fn error_message(&self) -> String {
        let reported = match &self.body {
            serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
            serde_json::Value::Object(_) => serde_json::from_value::<ErrorBody>(self.body.clone())
                .ok()
                .and_then(|body| body.error),
            _ => None,
        };

        reported.unwrap_or_else(|| {
            self.status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        })
    }

    pub fn into_rejection(self) -> ConnectionError {
        ConnectionError::RemoteRejected {
            message: self.error_message(),
            status: self.status,
        }
    }
}

/// Pushes staged parameters to the peer and reads back what it accepted.
pub struct StagingClient<'a, A: ?Sized> {
    api: &'a A,
}

impl<'a, A> StagingClient<'a, A>
where
    A: ConnectionApi + ?Sized,
{
    pub fn new(api: &'a A) -> Self {
        StagingClient { api }
    }

    /// Stages every leg of `params`. On success the peer's view of the staged resource
    /// is returned. The caller's parameter set is never touched here.
    pub async fn stage(
        &self,
        params: &TransportParameterSet,
    ) -> Result<StagedDocument, ConnectionError> {
        let endpoint = params.endpoint();
        let request = params.to_stage_request();
        debug!(
            "staging {} leg(s) of {endpoint} (master_enable: {})",
            request.transport_params.len(),
            request.master_enable
        );

        let response = self
            .api
            .patch_staged(endpoint, &StagedPatch::Parameters(request))
            .await?;
        self.accepted_document(endpoint, response).await
    }

    /// Stages a transport file on a receiver. Independent of [`StagingClient::stage`].
    pub async fn stage_transport_file(
        &self,
        endpoint: Endpoint,
        transport_file: TransportFile,
        sender_id: Option<Uuid>,
    ) -> Result<StagedDocument, ConnectionError> {
        debug!("staging transport file on {endpoint}");
        let patch = StagedPatch::TransportFile(TransportFilePatch {
            transport_file,
            sender_id,
        });

        let response = self.api.patch_staged(endpoint, &patch).await?;
        self.accepted_document(endpoint, response).await
    }

    async fn accepted_document(
        &self,
        endpoint: Endpoint,
        response: PeerResponse,
    ) -> Result<StagedDocument, ConnectionError> {
        if response.status != StatusCode::OK {
            let err = response.into_rejection();
            debug!("staging of {endpoint} was rejected: {err}");
            return Err(err);
        }

        match response.decode() {
            Ok(document) => Ok(document),
            Err(err) => {
                warn!(
                    "could not use the staging response of {endpoint} ({err}). re-reading the staged resource"
                );
                self.api.get_staged(endpoint).await
            }
        }
    }
}
