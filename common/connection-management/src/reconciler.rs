// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::coercion::{coerce_constrained, RawField};
use crate::constraints::ConstraintCatalog;
use crate::error::ConnectionError;
use crate::params::{ParamValue, TransportParameterSet};
use std::collections::HashMap;
use tracing::trace;
use uuid::Uuid;

const PEER_ID_FIELD: &str = "peer_id";

/// Snapshot of the input fields of an endpoint panel, for the currently displayed leg.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldForm {
    fields: HashMap<String, RawField>,
    pub master_enable: bool,
    pub peer_id: String,
}

impl FieldForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills the form from `leg` of the parameter set, the way it is shown to the user.
    pub fn populate(params: &TransportParameterSet, leg: usize) -> Result<Self, ConnectionError> {
        let fields = params
            .leg(leg)?
            .iter()
            .map(|(name, value)| (name.clone(), RawField::from(value)))
            .collect();

        Ok(FieldForm {
            fields,
            master_enable: params.master_enable(),
            peer_id: params
                .peer_id()
                .map(|id| id.to_string())
                .unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, raw: impl Into<RawField>) -> Self {
        self.set_field(name, raw);
        self
    }

    #[must_use]
    pub fn with_master_enable(mut self, master_enable: bool) -> Self {
        self.master_enable = master_enable;
        self
    }

    #[must_use]
    pub fn with_peer_id(mut self, peer_id: impl Into<String>) -> Self {
        self.peer_id = peer_id.into();
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, raw: impl Into<RawField>) {
        self.fields.insert(name.into(), raw.into());
    }

    pub fn field(&self, name: &str) -> Option<&RawField> {
        self.fields.get(name)
    }
}

fn parse_peer_id(raw: &str) -> Result<Option<Uuid>, ConnectionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(raw)
        .map(Some)
        .map_err(|err| ConnectionError::invalid_value(PEER_ID_FIELD, raw, err.to_string()))
}

/// Folds edited form fields back into the parameter set, one leg at a time.
pub struct LegReconciler<'a> {
    catalog: &'a ConstraintCatalog,
}

impl<'a> LegReconciler<'a> {
    pub fn new(catalog: &'a ConstraintCatalog) -> Self {
        LegReconciler { catalog }
    }

    /// Writes the named fields of `form` into `leg`, together with the master enable and
    /// peer id. Nothing is written unless every field coerces and passes its constraint.
    pub fn apply_edits(
        &self,
        params: &mut TransportParameterSet,
        leg: usize,
        param_names: &[String],
        form: &FieldForm,
    ) -> Result<(), ConnectionError> {
        params.leg(leg)?;

        let mut updates: Vec<(&str, ParamValue)> = Vec::with_capacity(param_names.len());
        for name in param_names {
            if !self.catalog.declares(leg, name) {
                trace!("leg {leg} does not declare '{name}'");
                continue;
            }
            let Some(raw) = form.field(name) else {
                continue;
            };
            let value = coerce_constrained(name, raw, self.catalog.constraint(leg, name))?;
            updates.push((name, value));
        }
        let peer_id = parse_peer_id(&form.peer_id)?;

        let target = params.leg_mut(leg)?;
        for (name, value) in updates {
            target.insert(name.to_string(), value);
        }
        params.set_master_enable(form.master_enable);
        params.set_peer_id(peer_id);
        Ok(())
    }

    /// Switches the displayed leg, flushing the edits of the previously displayed one first.
    /// Returns the form content for the newly displayed leg.
    pub fn select_leg(
        &self,
        params: &mut TransportParameterSet,
        displayed_leg: &mut usize,
        new_leg: usize,
        form: &FieldForm,
    ) -> Result<FieldForm, ConnectionError> {
        params.leg(new_leg)?;

        let visible = self.catalog.visible_params();
        self.apply_edits(params, *displayed_leg, &visible, form)?;
        *displayed_leg = new_leg;

        FieldForm::populate(params, new_leg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tests::two_leg_set;

    #[test]
    fn edits_only_touch_the_given_leg() {
        let (catalog, mut params) = two_leg_set();
        let reconciler = LegReconciler::new(&catalog);
        let untouched = params.leg(1).unwrap().clone();

        let form = FieldForm::populate(&params, 0)
            .unwrap()
            .with_field("destination_port", "6000")
            .with_field("source_ip", "10.0.0.1")
            .with_field("rtp_enabled", false);
        reconciler
            .apply_edits(&mut params, 0, &catalog.visible_params(), &form)
            .unwrap();

        assert_eq!(
            params.value(0, "destination_port"),
            Some(&ParamValue::Integer(6000))
        );
        assert_eq!(
            params.value(0, "rtp_enabled"),
            Some(&ParamValue::Bool(false))
        );
        assert_eq!(params.leg(1).unwrap(), &untouched);
        assert_eq!(params.leg_count(), 2);
    }

    #[test]
    fn failed_edits_leave_the_set_unchanged() {
        let (catalog, mut params) = two_leg_set();
        let reconciler = LegReconciler::new(&catalog);
        let before = params.clone();

        let form = FieldForm::populate(&params, 0)
            .unwrap()
            .with_field("destination_port", "6000")
            .with_field("source_port", "not-a-port")
            .with_master_enable(true);
        let err = reconciler
            .apply_edits(&mut params, 0, &catalog.visible_params(), &form)
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidValue { .. }));
        assert_eq!(params, before);

        let form = FieldForm::populate(&params, 1)
            .unwrap()
            .with_field("source_ip", "10.0.0.1");
        let err = reconciler
            .apply_edits(&mut params, 1, &catalog.visible_params(), &form)
            .unwrap_err();
        assert!(matches!(err, ConnectionError::ConstraintViolation { .. }));
        assert_eq!(params, before);
    }

    #[test]
    fn master_enable_and_peer_id_follow_the_form() {
        let (catalog, mut params) = two_leg_set();
        let reconciler = LegReconciler::new(&catalog);
        let receiver = Uuid::parse_str("0c5f4b36-8b09-4c1a-a7b5-3e1d0f0a9c11").unwrap();

        let form = FieldForm::populate(&params, 0)
            .unwrap()
            .with_master_enable(true)
            .with_peer_id(receiver.to_string());
        reconciler
            .apply_edits(&mut params, 0, &catalog.visible_params(), &form)
            .unwrap();
        assert!(params.master_enable());
        assert_eq!(params.peer_id(), Some(receiver));

        let form = form.with_peer_id("");
        reconciler
            .apply_edits(&mut params, 0, &catalog.visible_params(), &form)
            .unwrap();
        assert_eq!(params.peer_id(), None);

        let form = form.with_peer_id("definitely-not-a-uuid");
        assert!(reconciler
            .apply_edits(&mut params, 0, &catalog.visible_params(), &form)
            .is_err());
    }

    #[test]
    fn switching_legs_flushes_the_displayed_one_first() {
        let (catalog, mut params) = two_leg_set();
        let reconciler = LegReconciler::new(&catalog);
        let mut displayed = 0;

        let edited = FieldForm::populate(&params, 0)
            .unwrap()
            .with_field("destination_port", "7000");
        let leg_one = reconciler
            .select_leg(&mut params, &mut displayed, 1, &edited)
            .unwrap();

        assert_eq!(displayed, 1);
        assert_eq!(
            params.value(0, "destination_port"),
            Some(&ParamValue::Integer(7000))
        );
        assert_eq!(
            leg_one.field("destination_port"),
            Some(&RawField::from("5006"))
        );

        // and back again, the edit on leg 0 survives
        let leg_zero = reconciler
            .select_leg(&mut params, &mut displayed, 0, &leg_one)
            .unwrap();
        assert_eq!(
            leg_zero.field("destination_port"),
            Some(&RawField::from("7000"))
        );
    }

    #[test]
    fn switching_to_a_missing_leg_changes_nothing() {
        let (catalog, mut params) = two_leg_set();
        let reconciler = LegReconciler::new(&catalog);
        let mut displayed = 0;
        let before = params.clone();

        let edited = FieldForm::populate(&params, 0)
            .unwrap()
            .with_field("destination_port", "7000");
        assert!(matches!(
            reconciler.select_leg(&mut params, &mut displayed, 2, &edited),
            Err(ConnectionError::NoSuchLeg { leg: 2, legs: 2 })
        ));
        assert_eq!(displayed, 0);
        assert_eq!(params, before);
    }
}
