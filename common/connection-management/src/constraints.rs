// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::api::ConnectionApi;
use crate::error::ConnectionError;
use crate::params::{Endpoint, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Constraints of a single leg, keyed by parameter name.
pub type LegConstraints = BTreeMap<String, Constraint>;

/// Address parameters accept `"auto"` even if the peer's enumeration does not list it.
pub fn is_address_param(name: &str) -> bool {
    name.ends_with("_ip")
}

/// Validation rule of a single parameter, as reported by the peer.
///
/// An empty object leaves the parameter unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<ParamValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Constraint {
    pub fn enumeration(values: impl IntoIterator<Item = impl Into<ParamValue>>) -> Self {
        Constraint {
            allowed: Some(values.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn range(minimum: Option<i64>, maximum: Option<i64>) -> Self {
        Constraint {
            minimum,
            maximum,
            ..Default::default()
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.allowed.is_none() && self.minimum.is_none() && self.maximum.is_none()
    }

    /// Values a user may pick for `name`, or `None` if the parameter is not enumerated.
    pub fn permitted_values(&self, name: &str) -> Option<Vec<ParamValue>> {
        let mut values = self.allowed.clone()?;
        if is_address_param(name) && !values.contains(&ParamValue::Auto) {
            values.push(ParamValue::Auto);
        }
        Some(values)
    }

    /// Checks an already coerced value. Null always passes, as it clears the parameter.
    pub fn check(&self, name: &str, value: &ParamValue) -> Result<(), ConnectionError> {
        if value.is_null() {
            return Ok(());
        }

        if let Some(permitted) = self.permitted_values(name) {
            if !permitted.contains(value) {
                return Err(ConnectionError::ConstraintViolation {
                    param: name.to_string(),
                    value: value.to_string(),
                    allowed: permitted
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }

        if let Some(number) = value.as_integer() {
            let below = self.minimum.is_some_and(|minimum| number < minimum);
            let above = self.maximum.is_some_and(|maximum| number > maximum);
            if below || above {
                return Err(ConnectionError::ConstraintViolation {
                    param: name.to_string(),
                    value: number.to_string(),
                    allowed: format!(
                        "{}..={}",
                        self.minimum.map(|m| m.to_string()).unwrap_or_default(),
                        self.maximum.map(|m| m.to_string()).unwrap_or_default()
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Per-leg constraints of a single endpoint. Read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintCatalog {
    endpoint: Endpoint,
    legs: Vec<LegConstraints>,
}

impl ConstraintCatalog {
    pub fn new(endpoint: Endpoint, legs: Vec<LegConstraints>) -> Self {
        ConstraintCatalog { endpoint, legs }
    }

    pub async fn load<A>(api: &A, endpoint: Endpoint) -> Result<Self, ConnectionError>
    where
        A: ConnectionApi + ?Sized,
    {
        let legs = api.get_constraints(endpoint).await?;
        if legs.is_empty() {
            return Err(ConnectionError::malformed(
                endpoint.to_string(),
                "constraints do not describe any legs",
            ));
        }
        debug!("loaded constraints of {endpoint} for {} leg(s)", legs.len());

        Ok(ConstraintCatalog::new(endpoint, legs))
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }

    pub fn legs(&self) -> &[LegConstraints] {
        &self.legs
    }

    pub fn leg(&self, leg: usize) -> Option<&LegConstraints> {
        self.legs.get(leg)
    }

    pub fn constraint(&self, leg: usize, name: &str) -> Option<&Constraint> {
        self.leg(leg).and_then(|constraints| constraints.get(name))
    }

    pub fn declares(&self, leg: usize, name: &str) -> bool {
        self.constraint(leg, name).is_some()
    }

    /// Parameters to show to the user. The first leg decides for every leg.
    pub fn visible_params(&self) -> Vec<String> {
        self.legs
            .first()
            .map(|constraints| constraints.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Selectable values of every enumerated parameter of the given leg.
    pub fn options(&self, leg: usize) -> BTreeMap<String, Vec<ParamValue>> {
        self.leg(leg)
            .map(|constraints| {
                constraints
                    .iter()
                    .filter_map(|(name, constraint)| {
                        constraint
                            .permitted_values(name)
                            .map(|values| (name.clone(), values))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
