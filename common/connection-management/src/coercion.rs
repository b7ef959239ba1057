// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::constraints::Constraint;
use crate::error::ConnectionError;
use crate::params::{ParamValue, AUTO};

const BOOLEAN_PARAMS: &[&str] = &["rtp_enabled", "fec_enabled", "rtcp_enabled"];
const FEC_BLOCK_PARAMS: &[&str] = &["fec_block_width", "fec_block_height"];
const NULLABLE_ADDRESS_PARAMS: &[&str] = &["multicast_ip", "source_ip", "dest_ip"];

/// Raw content of an input field, as handed over by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawField {
    Text(String),
    Checked(bool),
}

impl From<&str> for RawField {
    fn from(value: &str) -> Self {
        RawField::Text(value.to_string())
    }
}

impl From<String> for RawField {
    fn from(value: String) -> Self {
        RawField::Text(value)
    }
}

impl From<bool> for RawField {
    fn from(value: bool) -> Self {
        RawField::Checked(value)
    }
}

impl From<&ParamValue> for RawField {
    fn from(value: &ParamValue) -> Self {
        match value {
            ParamValue::Bool(checked) => RawField::Checked(*checked),
            other => RawField::Text(other.as_field_text()),
        }
    }
}

impl RawField {
    fn describe(&self) -> String {
        match self {
            RawField::Text(text) => text.clone(),
            RawField::Checked(checked) => checked.to_string(),
        }
    }
}

fn parse_integer(param: &str, raw: &RawField) -> Result<ParamValue, ConnectionError> {
    match raw {
        RawField::Text(text) => text.trim().parse::<i64>().map(ParamValue::Integer).map_err(
            |err| ConnectionError::invalid_value(param, text.as_str(), err.to_string()),
        ),
        RawField::Checked(_) => Err(ConnectionError::invalid_value(
            param,
            raw.describe(),
            "expected an integer",
        )),
    }
}

fn parse_boolean(param: &str, raw: &RawField) -> Result<ParamValue, ConnectionError> {
    match raw {
        RawField::Checked(checked) => Ok(ParamValue::Bool(*checked)),
        RawField::Text(text) => match text.trim() {
            "true" => Ok(ParamValue::Bool(true)),
            "false" => Ok(ParamValue::Bool(false)),
            _ => Err(ConnectionError::invalid_value(
                param,
                text.as_str(),
                "expected a boolean",
            )),
        },
    }
}

/// Converts a raw field value into the typed value of the named parameter.
///
/// Names without a dedicated rule pass through as text, so that parameters added by
/// newer peers can still be edited.
pub fn coerce(param: &str, raw: &RawField) -> Result<ParamValue, ConnectionError> {
    if BOOLEAN_PARAMS.contains(&param) {
        return parse_boolean(param, raw);
    }

    if param.contains("port") {
        return match raw {
            RawField::Text(text) if text == AUTO => Ok(ParamValue::Auto),
            _ => parse_integer(param, raw),
        };
    }

    if FEC_BLOCK_PARAMS.contains(&param) {
        return parse_integer(param, raw);
    }

    match raw {
        RawField::Text(text) if text.is_empty() && NULLABLE_ADDRESS_PARAMS.contains(&param) => {
            Ok(ParamValue::Null)
        }
        RawField::Text(text) => Ok(ParamValue::from_text(text.as_str())),
        RawField::Checked(checked) => Ok(ParamValue::Bool(*checked)),
    }
}

/// [`coerce`] followed by a check against the leg's constraint of that parameter, if any.
pub fn coerce_constrained(
    param: &str,
    raw: &RawField,
    constraint: Option<&Constraint>,
) -> Result<ParamValue, ConnectionError> {
    let value = coerce(param, raw)?;
    if let Some(constraint) = constraint {
        constraint.check(param, &value)?;
    }
    Ok(value)
}
