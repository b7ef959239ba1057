// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::constraints::ConstraintCatalog;
use crate::error::ConnectionError;
use crate::staging::{StageRequest, StagedDocument};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use tracing::debug;
use uuid::Uuid;

/// Literal used by the connection api to let the device pick a value on its own.
pub const AUTO: &str = "auto";

/// Parameters of a single leg, keyed by their name.
pub type LegParams = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Sender,
    Receiver,
}

impl EndpointKind {
    /// Path segment of the collection this kind lives under.
    pub fn resource(&self) -> &'static str {
        match self {
            EndpointKind::Sender => "senders",
            EndpointKind::Receiver => "receivers",
        }
    }

    /// Senders get connected to a receiver and receivers to a sender.
    pub fn peer_id_key(&self) -> &'static str {
        match self {
            EndpointKind::Sender => "receiver_id",
            EndpointKind::Receiver => "sender_id",
        }
    }
}

impl Display for EndpointKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Sender => write!(f, "sender"),
            EndpointKind::Receiver => write!(f, "receiver"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub kind: EndpointKind,
    pub id: Uuid,
}

impl Endpoint {
    pub fn new(kind: EndpointKind, id: Uuid) -> Self {
        Endpoint { kind, id }
    }

    pub fn sender(id: Uuid) -> Self {
        Endpoint::new(EndpointKind::Sender, id)
    }

    pub fn receiver(id: Uuid) -> Self {
        Endpoint::new(EndpointKind::Receiver, id)
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// A single transport parameter value.
///
/// The `"auto"` literal is always represented by [`ParamValue::Auto`], regardless of
/// whether it came from the peer or from a form field, so that values compare equal
/// no matter where they originated. On the wire both forms are identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Null,
    Auto,
    Bool(bool),
    Integer(i64),
    String(String),
}

impl ParamValue {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text == AUTO {
            ParamValue::Auto
        } else {
            ParamValue::String(text)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Text to put into an input field. Null values leave the field empty.
    pub fn as_field_text(&self) -> String {
        match self {
            ParamValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Auto => write!(f, "{AUTO}"),
            ParamValue::Bool(value) => write!(f, "{value}"),
            ParamValue::Integer(value) => write!(f, "{value}"),
            ParamValue::String(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::from_text(value)
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Null => serializer.serialize_unit(),
            ParamValue::Auto => serializer.serialize_str(AUTO),
            ParamValue::Bool(value) => serializer.serialize_bool(*value),
            ParamValue::Integer(value) => serializer.serialize_i64(*value),
            ParamValue::String(value) => serializer.serialize_str(value),
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParamValueVisitor;

        impl<'de> Visitor<'de> for ParamValueVisitor {
            type Value = ParamValue;

            fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
                formatter.write_str("a null, boolean, integer or string transport parameter")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(ParamValue::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(ParamValue::Null)
            }

            fn visit_some<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> Result<Self::Value, D::Error> {
                deserializer.deserialize_any(self)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(ParamValue::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(ParamValue::Integer(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                i64::try_from(v)
                    .map(ParamValue::Integer)
                    .map_err(|_| E::custom(format!("{v} does not fit into a parameter value")))
            }

            // some peers render integral values as floats (e.g. `5004.0`)
            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                    Ok(ParamValue::Integer(v as i64))
                } else {
                    Err(E::custom(format!("{v} is not an integral parameter value")))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(ParamValue::from_text(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(ParamValue::from_text(v))
            }
        }

        deserializer.deserialize_any(ParamValueVisitor)
    }
}

/// Staged transport parameters of a single endpoint, as currently known to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportParameterSet {
    endpoint: Endpoint,
    legs: Vec<LegParams>,
    master_enable: bool,
    peer_id: Option<Uuid>,
}

impl TransportParameterSet {
    /// Builds the set out of the peer's staged document.
    ///
    /// The number of legs is taken from the document and has to be covered by the catalog.
    /// Parameters the catalog does not declare for a leg are dropped.
    pub fn from_staged(
        endpoint: Endpoint,
        staged: &StagedDocument,
        catalog: &ConstraintCatalog,
    ) -> Result<Self, ConnectionError> {
        let got = staged.transport_params.len();
        if got == 0 {
            return Err(ConnectionError::malformed(
                endpoint.to_string(),
                "staged document does not contain any legs",
            ));
        }
        if got != catalog.leg_count() {
            return Err(ConnectionError::InconsistentLegCount {
                expected: catalog.leg_count(),
                got,
            });
        }

        let legs = staged
            .transport_params
            .iter()
            .enumerate()
            .map(|(leg, params)| {
                params
                    .iter()
                    .filter(|(name, _)| {
                        let declared = catalog.declares(leg, name);
                        if !declared {
                            debug!(
                                "{endpoint}: ignoring undeclared parameter '{name}' on leg {leg}"
                            );
                        }
                        declared
                    })
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .collect();

        Ok(TransportParameterSet {
            endpoint,
            legs,
            master_enable: staged.master_enable,
            peer_id: staged.peer_id(endpoint.kind),
        })
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }

    pub fn legs(&self) -> &[LegParams] {
        &self.legs
    }

    pub fn leg(&self, leg: usize) -> Result<&LegParams, ConnectionError> {
        self.legs.get(leg).ok_or(ConnectionError::NoSuchLeg {
            leg,
            legs: self.legs.len(),
        })
    }

    pub(crate) fn leg_mut(&mut self, leg: usize) -> Result<&mut LegParams, ConnectionError> {
        let legs = self.legs.len();
        self.legs
            .get_mut(leg)
            .ok_or(ConnectionError::NoSuchLeg { leg, legs })
    }

    pub fn value(&self, leg: usize, name: &str) -> Option<&ParamValue> {
        self.legs.get(leg).and_then(|params| params.get(name))
    }

    pub fn master_enable(&self) -> bool {
        self.master_enable
    }

    pub(crate) fn set_master_enable(&mut self, master_enable: bool) {
        self.master_enable = master_enable;
    }

    /// `receiver_id` of a sender or `sender_id` of a receiver.
    pub fn peer_id(&self) -> Option<Uuid> {
        self.peer_id
    }

    pub(crate) fn set_peer_id(&mut self, peer_id: Option<Uuid>) {
        self.peer_id = peer_id;
    }

    /// Request staging every leg, including the ones that are not currently displayed.
    pub fn to_stage_request(&self) -> StageRequest {
        let (receiver_id, sender_id) = match self.endpoint.kind {
            EndpointKind::Sender => (Some(self.peer_id), None),
            EndpointKind::Receiver => (None, Some(self.peer_id)),
        };

        StageRequest {
            transport_params: self.legs.clone(),
            master_enable: self.master_enable,
            receiver_id,
            sender_id,
        }
    }
}
