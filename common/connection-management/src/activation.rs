// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConnectionError;
use crate::params::Endpoint;
use crate::staging::{ActivationEcho, PeerResponse};
use http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use tracing::debug;

const REQUESTED_TIME: &str = "requested_time";

/// TAI time (or offset) in the `<seconds>:<nanoseconds>` form used by the connection api.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaiTimestamp {
    secs: u64,
    nanos: u32,
}

impl TaiTimestamp {
    pub const NANOS_PER_SEC: u32 = 1_000_000_000;

    pub fn new(secs: u64, nanos: u32) -> Result<Self, ConnectionError> {
        if nanos >= Self::NANOS_PER_SEC {
            return Err(ConnectionError::invalid_value(
                REQUESTED_TIME,
                format!("{secs}:{nanos}"),
                "nanoseconds must be below one second",
            ));
        }
        Ok(TaiTimestamp { secs, nanos })
    }

    /// Builds the timestamp out of two separately entered fields.
    pub fn from_fields(secs: &str, nanos: &str) -> Result<Self, ConnectionError> {
        let raw = format!("{secs}:{nanos}");
        let parse = |part: &str| {
            part.trim().parse::<u64>().map_err(|err| {
                ConnectionError::invalid_value(REQUESTED_TIME, raw.as_str(), err.to_string())
            })
        };

        let secs = parse(secs)?;
        let nanos = u32::try_from(parse(nanos)?).map_err(|_| {
            ConnectionError::invalid_value(
                REQUESTED_TIME,
                raw.as_str(),
                "nanoseconds must be below one second",
            )
        })?;
        TaiTimestamp::new(secs, nanos)
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }
}

impl Display for TaiTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.secs, self.nanos)
    }
}

impl FromStr for TaiTimestamp {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (secs, nanos) = s.split_once(':').ok_or_else(|| {
            ConnectionError::invalid_value(REQUESTED_TIME, s, "expected <seconds>:<nanoseconds>")
        })?;
        TaiTimestamp::from_fields(secs, nanos)
    }
}

impl Serialize for TaiTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaiTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationMode {
    Immediate,
    ScheduledRelative,
    ScheduledAbsolute,

    /// Withdraws a pending scheduled activation.
    Cancel,
}

impl ActivationMode {
    /// Value of the `mode` field. Cancellation is signalled with a `null` mode.
    pub fn wire_name(&self) -> Option<&'static str> {
        match self {
            ActivationMode::Immediate => Some("activate_immediate"),
            ActivationMode::ScheduledRelative => Some("activate_scheduled_relative"),
            ActivationMode::ScheduledAbsolute => Some("activate_scheduled_absolute"),
            ActivationMode::Cancel => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(
            self,
            ActivationMode::ScheduledRelative | ActivationMode::ScheduledAbsolute
        )
    }
}

impl Display for ActivationMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ActivationMode::Immediate => write!(f, "immediate"),
            ActivationMode::ScheduledRelative => write!(f, "relative"),
            ActivationMode::ScheduledAbsolute => write!(f, "absolute"),
            ActivationMode::Cancel => write!(f, "cancel"),
        }
    }
}

impl FromStr for ActivationMode {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "now" | "immediate" | "activate_immediate" => Ok(ActivationMode::Immediate),
            "relative" | "activate_scheduled_relative" => Ok(ActivationMode::ScheduledRelative),
            "absolute" | "activate_scheduled_absolute" => Ok(ActivationMode::ScheduledAbsolute),
            "cancel" | "none" => Ok(ActivationMode::Cancel),
            other => Err(ConnectionError::invalid_value(
                "mode",
                other,
                "expected one of now, relative, absolute or cancel",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationRequest {
    mode: ActivationMode,
    requested_time: Option<TaiTimestamp>,
}

impl ActivationRequest {
    pub fn immediate() -> Self {
        ActivationRequest {
            mode: ActivationMode::Immediate,
            requested_time: None,
        }
    }

    /// Activation after `offset` has elapsed on the peer.
    pub fn relative(offset: TaiTimestamp) -> Self {
        ActivationRequest {
            mode: ActivationMode::ScheduledRelative,
            requested_time: Some(offset),
        }
    }

    pub fn absolute(at: TaiTimestamp) -> Self {
        ActivationRequest {
            mode: ActivationMode::ScheduledAbsolute,
            requested_time: Some(at),
        }
    }

    pub fn cancel() -> Self {
        ActivationRequest {
            mode: ActivationMode::Cancel,
            requested_time: None,
        }
    }

    /// Builds the request out of the mode selector and the seconds/nanoseconds inputs.
    /// The time inputs are ignored unless the mode is scheduled.
    pub fn from_fields(mode: &str, secs: &str, nanos: &str) -> Result<Self, ConnectionError> {
        let mode: ActivationMode = mode.parse()?;
        let requested_time = if mode.is_scheduled() {
            Some(TaiTimestamp::from_fields(secs, nanos)?)
        } else {
            None
        };
        Ok(ActivationRequest {
            mode,
            requested_time,
        })
    }

    pub fn mode(&self) -> ActivationMode {
        self.mode
    }

    pub fn requested_time(&self) -> Option<TaiTimestamp> {
        self.requested_time
    }

    pub fn envelope(&self) -> ActivationEnvelope {
        ActivationEnvelope {
            activation: ActivationBody {
                mode: self.mode.wire_name(),
                requested_time: self.requested_time,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationBody {
    pub mode: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_time: Option<TaiTimestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationEnvelope {
    pub activation: ActivationBody,
}

#[derive(Debug, Default, Deserialize)]
struct ActivationResponse {
    #[serde(default)]
    activation: Option<ActivationEcho>,
}

/// Successful outcome of an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationResult {
    /// The staged parameters are active now.
    Applied,

    /// The peer will activate at the reported time.
    Scheduled { activation_time: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActivationState {
    #[default]
    Idle,
    Requested(ActivationMode),
    Applied,
    Scheduled {
        activation_time: String,
    },
    Rejected {
        message: String,
    },
}

impl ActivationState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ActivationState::Requested(_))
    }
}

/// Activation handshake of a single endpoint.
///
/// The coordinator does no I/O on its own: [`ActivationCoordinator::begin`] hands out the
/// envelope to send and [`ActivationCoordinator::complete`] consumes whatever came back.
#[derive(Debug, Default)]
pub struct ActivationCoordinator {
    state: ActivationState,
}

impl ActivationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ActivationState {
        &self.state
    }

    pub fn begin(
        &mut self,
        endpoint: Endpoint,
        request: &ActivationRequest,
    ) -> Result<ActivationEnvelope, ConnectionError> {
        if self.state.is_in_flight() {
            return Err(ConnectionError::RequestInFlight { endpoint });
        }
        debug!("requesting {} activation of {endpoint}", request.mode());

        self.state = ActivationState::Requested(request.mode());
        Ok(request.envelope())
    }

    pub fn complete(
        &mut self,
        response: Result<PeerResponse, ConnectionError>,
    ) -> Result<ActivationResult, ConnectionError> {
        let outcome = response.and_then(|response| Self::interpret(&response));
        self.state = match &outcome {
            Ok(ActivationResult::Applied) => ActivationState::Applied,
            Ok(ActivationResult::Scheduled { activation_time }) => ActivationState::Scheduled {
                activation_time: activation_time.clone(),
            },
            Err(ConnectionError::RemoteRejected { message, .. }) => ActivationState::Rejected {
                message: message.clone(),
            },
            Err(other) => ActivationState::Rejected {
                message: other.to_string(),
            },
        };
        outcome
    }

    /// Drops an activation whose response is never going to be consumed, e.g. because the
    /// request got cancelled. Terminal states are kept.
    pub fn abandon(&mut self) {
        if self.state.is_in_flight() {
            self.state = ActivationState::Idle;
        }
    }

    /// 200 means applied, 202 scheduled and anything else a rejection.
    pub fn interpret(response: &PeerResponse) -> Result<ActivationResult, ConnectionError> {
        match response.status {
            StatusCode::OK => Ok(ActivationResult::Applied),
            StatusCode::ACCEPTED => {
                let activation_time = response
                    .decode::<ActivationResponse>()?
                    .activation
                    .and_then(|activation| activation.activation_time)
                    .ok_or_else(|| {
                        ConnectionError::malformed(
                            response.url.as_str(),
                            "scheduled activation did not report its activation_time",
                        )
                    })?;
                Ok(ActivationResult::Scheduled { activation_time })
            }
            _ => Err(response.clone().into_rejection()),
        }
    }
}
