// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::params::{Endpoint, EndpointKind};
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to reach the connection api at {url}: {source}")]
    RemoteUnavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("the connection api rejected the request ({status}): {message}")]
    RemoteRejected { status: StatusCode, message: String },

    #[error("received malformed response for {context}: {reason}")]
    MalformedResponse { context: String, reason: String },

    #[error("'{raw}' is not a valid value for '{param}': {reason}")]
    InvalidValue {
        param: String,
        raw: String,
        reason: String,
    },

    #[error("{value} is not permitted for '{param}'. allowed: {allowed}")]
    ConstraintViolation {
        param: String,
        value: String,
        allowed: String,
    },

    #[error("discarded response for {endpoint} as it is no longer selected")]
    StaleResponse { endpoint: Endpoint },

    #[error("there is no {kind} currently selected")]
    NoEndpointSelected { kind: EndpointKind },

    #[error("leg {leg} does not exist. the endpoint has {legs} leg(s)")]
    NoSuchLeg { leg: usize, legs: usize },

    #[error("an activation of {endpoint} is still awaiting its response")]
    RequestInFlight { endpoint: Endpoint },

    #[error("the connection api reported {got} leg(s) where {expected} were expected")]
    InconsistentLegCount { expected: usize, got: usize },

    #[error("provided api root ({raw}) is malformed: {source}")]
    MalformedApiRoot {
        raw: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build internal client: {source}")]
    ClientBuildFailure {
        #[source]
        source: reqwest::Error,
    },
}

impl ConnectionError {
    /// Responses for an endpoint that got deselected in the meantime are dropped
    /// by the engine. Presentation layers should treat this as a no-op.
    pub fn is_stale(&self) -> bool {
        matches!(self, ConnectionError::StaleResponse { .. })
    }

    /// Errors that were detected locally, before anything was sent to the peer.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            ConnectionError::InvalidValue { .. } | ConnectionError::ConstraintViolation { .. }
        )
    }

    /// Message reported by the peer, if it rejected the request.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            ConnectionError::RemoteRejected { message, .. } => Some(message),
            _ => None,
        }
    }

    pub(crate) fn invalid_value(
        param: impl Into<String>,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConnectionError::InvalidValue {
            param: param.into(),
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(context: impl Into<String>, reason: impl ToString) -> Self {
        ConnectionError::MalformedResponse {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}
