// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::activation::{
    ActivationCoordinator, ActivationRequest, ActivationResult, ActivationState,
};
use crate::active::{ActiveParameterMonitor, ActiveSnapshot};
use crate::api::ConnectionApi;
use crate::constraints::ConstraintCatalog;
use crate::error::ConnectionError;
use crate::params::{Endpoint, EndpointKind, ParamValue, TransportParameterSet};
use crate::reconciler::{FieldForm, LegReconciler};
use crate::staging::{ActivationEcho, StagedDocument, StagedPatch, StagingClient, TransportFile};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the engine knows about the endpoint currently edited in one panel.
#[derive(Debug)]
pub struct EndpointSession {
    endpoint: Endpoint,
    catalog: ConstraintCatalog,
    params: TransportParameterSet,
    displayed_leg: usize,
    transport_file: Option<TransportFile>,
    staged_activation: Option<ActivationEcho>,
    activation: ActivationCoordinator,
    active: Option<ActiveSnapshot>,
}

impl EndpointSession {
    fn new(
        endpoint: Endpoint,
        catalog: ConstraintCatalog,
        staged: StagedDocument,
    ) -> Result<Self, ConnectionError> {
        let params = TransportParameterSet::from_staged(endpoint, &staged, &catalog)?;
        Ok(EndpointSession {
            endpoint,
            catalog,
            params,
            displayed_leg: 0,
            transport_file: staged.transport_file,
            staged_activation: staged.activation,
            activation: ActivationCoordinator::new(),
            active: None,
        })
    }

    /// Replaces the staged state with what the peer reported. The leg count may not change.
    fn refresh_staged(&mut self, staged: StagedDocument) -> Result<(), ConnectionError> {
        let params = TransportParameterSet::from_staged(self.endpoint, &staged, &self.catalog)?;
        if params.leg_count() != self.params.leg_count() {
            return Err(ConnectionError::InconsistentLegCount {
                expected: self.params.leg_count(),
                got: params.leg_count(),
            });
        }

        self.params = params;
        if staged.transport_file.is_some() {
            self.transport_file = staged.transport_file;
        }
        self.staged_activation = staged.activation;
        Ok(())
    }

    fn reconcile(&mut self, form: &FieldForm) -> Result<(), ConnectionError> {
        let visible = self.catalog.visible_params();
        LegReconciler::new(&self.catalog).apply_edits(
            &mut self.params,
            self.displayed_leg,
            &visible,
            form,
        )
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn catalog(&self) -> &ConstraintCatalog {
        &self.catalog
    }

    pub fn params(&self) -> &TransportParameterSet {
        &self.params
    }

    pub fn displayed_leg(&self) -> usize {
        self.displayed_leg
    }

    pub fn transport_file(&self) -> Option<&TransportFile> {
        self.transport_file.as_ref()
    }

    pub fn staged_activation(&self) -> Option<&ActivationEcho> {
        self.staged_activation.as_ref()
    }

    pub fn activation_state(&self) -> &ActivationState {
        self.activation.state()
    }

    pub fn active(&self) -> Option<&ActiveSnapshot> {
        self.active.as_ref()
    }

    pub fn view(&self) -> Result<EndpointView, ConnectionError> {
        Ok(EndpointView {
            endpoint: self.endpoint,
            leg_count: self.params.leg_count(),
            displayed_leg: self.displayed_leg,
            visible_params: self.catalog.visible_params(),
            options: self.catalog.options(self.displayed_leg),
            form: FieldForm::populate(&self.params, self.displayed_leg)?,
        })
    }
}

/// What a presentation layer needs to render an endpoint panel.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointView {
    pub endpoint: Endpoint,
    pub leg_count: usize,
    pub displayed_leg: usize,

    /// Inputs to show. Anything else stays hidden.
    pub visible_params: Vec<String>,

    /// Selectable values of enumerated parameters on the displayed leg.
    pub options: BTreeMap<String, Vec<ParamValue>>,

    pub form: FieldForm,
}

#[derive(Debug, Default)]
struct Panel {
    generation: u64,
    session: Option<EndpointSession>,
}

/// Identity of a selection, captured when a request is issued and checked once it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SelectionToken {
    endpoint: Endpoint,
    generation: u64,
}

type Panels = HashMap<EndpointKind, Panel>;

/// The session `token` was issued for, unless its panel moved on since.
fn current_session(panels: &mut Panels, token: SelectionToken) -> Option<&mut EndpointSession> {
    panels
        .get_mut(&token.endpoint.kind)
        .filter(|panel| panel.generation == token.generation)
        .and_then(|panel| panel.session.as_mut())
        .filter(|session| session.endpoint == token.endpoint)
}

/// Puts the coordinator of an activation back to idle if its future is dropped before the
/// peer's response got consumed.
struct PendingActivation<'a> {
    panels: &'a Mutex<Panels>,
    token: SelectionToken,
    armed: bool,
}

impl<'a> PendingActivation<'a> {
    fn new(panels: &'a Mutex<Panels>, token: SelectionToken) -> Self {
        PendingActivation {
            panels,
            token,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingActivation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut panels = self.panels.lock();
        if let Some(session) = current_session(&mut panels, self.token) {
            debug!("activation of {} was abandoned", self.token.endpoint);
            session.activation.abandon();
        }
    }
}

/// Owns the state of at most one edited endpoint per [`EndpointKind`].
///
/// Locks are never held across a request. Any response that arrives after its panel moved
/// on to a different selection is dropped with [`ConnectionError::StaleResponse`].
pub struct ConnectionManager<A: ?Sized> {
    panels: Mutex<Panels>,
    api: Arc<A>,
}

impl<A> ConnectionManager<A>
where
    A: ConnectionApi,
{
    pub fn new(api: A) -> Self {
        ConnectionManager::from_shared(Arc::new(api))
    }
}

impl<A> ConnectionManager<A>
where
    A: ConnectionApi + ?Sized,
{
    pub fn from_shared(api: Arc<A>) -> Self {
        ConnectionManager {
            panels: Mutex::new(HashMap::new()),
            api,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn token(&self, kind: EndpointKind) -> Result<SelectionToken, ConnectionError> {
        let panels = self.panels.lock();
        panels
            .get(&kind)
            .and_then(|panel| {
                panel.session.as_ref().map(|session| SelectionToken {
                    endpoint: session.endpoint,
                    generation: panel.generation,
                })
            })
            .ok_or(ConnectionError::NoEndpointSelected { kind })
    }

    fn with_current<R>(
        &self,
        kind: EndpointKind,
        f: impl FnOnce(SelectionToken, &mut EndpointSession) -> Result<R, ConnectionError>,
    ) -> Result<R, ConnectionError> {
        let mut panels = self.panels.lock();
        let panel = panels
            .get_mut(&kind)
            .ok_or(ConnectionError::NoEndpointSelected { kind })?;
        let generation = panel.generation;
        let session = panel
            .session
            .as_mut()
            .ok_or(ConnectionError::NoEndpointSelected { kind })?;
        let token = SelectionToken {
            endpoint: session.endpoint,
            generation,
        };
        f(token, session)
    }

    fn with_session<R>(
        &self,
        token: SelectionToken,
        f: impl FnOnce(&mut EndpointSession) -> Result<R, ConnectionError>,
    ) -> Result<R, ConnectionError> {
        let mut panels = self.panels.lock();
        match current_session(&mut panels, token) {
            Some(session) => f(session),
            None => {
                warn!("discarding response for {} as it is no longer selected", token.endpoint);
                Err(ConnectionError::StaleResponse {
                    endpoint: token.endpoint,
                })
            }
        }
    }

    /// Read access to the session currently selected for `kind`.
    pub fn session<R>(
        &self,
        kind: EndpointKind,
        f: impl FnOnce(&EndpointSession) -> R,
    ) -> Result<R, ConnectionError> {
        self.with_current(kind, |_, session| Ok(f(session)))
    }

    pub fn selected(&self, kind: EndpointKind) -> Option<Endpoint> {
        self.token(kind).ok().map(|token| token.endpoint)
    }

    pub fn view(&self, kind: EndpointKind) -> Result<EndpointView, ConnectionError> {
        self.with_current(kind, |_, session| session.view())
    }

    /// Starts editing `endpoint`, dropping whatever was edited in its panel before.
    ///
    /// Constraints and staged parameters are (re)loaded from the peer.
    pub async fn select(&self, endpoint: Endpoint) -> Result<EndpointView, ConnectionError> {
        let generation = {
            let mut panels = self.panels.lock();
            let panel = panels.entry(endpoint.kind).or_default();
            panel.generation += 1;
            panel.session = None;
            panel.generation
        };
        let token = SelectionToken {
            endpoint,
            generation,
        };
        debug!("selecting {endpoint}");

        let catalog = ConstraintCatalog::load(&*self.api, endpoint).await?;
        let staged = self.api.get_staged(endpoint).await?;
        let session = EndpointSession::new(endpoint, catalog, staged)?;

        let mut panels = self.panels.lock();
        let panel = panels.entry(endpoint.kind).or_default();
        if panel.generation != token.generation {
            warn!("discarding state of {endpoint} as another {} got selected", endpoint.kind);
            return Err(ConnectionError::StaleResponse { endpoint });
        }
        let view = session.view()?;
        panel.session = Some(session);
        Ok(view)
    }

    /// Forgets the endpoint edited in the `kind` panel. Outstanding responses become stale.
    pub fn deselect(&self, kind: EndpointKind) {
        let mut panels = self.panels.lock();
        let panel = panels.entry(kind).or_default();
        panel.generation += 1;
        panel.session = None;
    }

    /// Folds the displayed leg's fields into the staged parameters, without sending anything.
    pub fn apply_edits(&self, kind: EndpointKind, form: &FieldForm) -> Result<(), ConnectionError> {
        self.with_current(kind, |_, session| session.reconcile(form))
    }

    /// Displays another leg. The fields of the previously displayed leg are kept.
    pub fn select_leg(
        &self,
        kind: EndpointKind,
        new_leg: usize,
        form: &FieldForm,
    ) -> Result<EndpointView, ConnectionError> {
        self.with_current(kind, |_, session| {
            LegReconciler::new(&session.catalog).select_leg(
                &mut session.params,
                &mut session.displayed_leg,
                new_leg,
                form,
            )?;
            session.view()
        })
    }

    /// Stages every leg of the selected endpoint, after folding in the displayed form.
    ///
    /// Invalid fields fail before anything is sent. On success the peer's accepted values
    /// replace the local ones. On failure the local state is left as it was after the form
    /// got folded in, so that the request can be retried.
    pub async fn stage(
        &self,
        kind: EndpointKind,
        form: &FieldForm,
    ) -> Result<EndpointView, ConnectionError> {
        let (token, params) = self.with_current(kind, |token, session| {
            session.reconcile(form)?;
            Ok((token, session.params.clone()))
        })?;

        let staged = StagingClient::new(&*self.api).stage(&params).await?;
        info!("{} accepted the staged parameters", token.endpoint);

        self.with_session(token, |session| {
            session.refresh_staged(staged)?;
            session.view()
        })
    }

    /// Stages a transport file on the selected receiver, optionally overriding its sender.
    pub async fn stage_transport_file(
        &self,
        transport_file: TransportFile,
        sender_id: Option<Uuid>,
    ) -> Result<EndpointView, ConnectionError> {
        let token = self.token(EndpointKind::Receiver)?;

        let staged = StagingClient::new(&*self.api)
            .stage_transport_file(token.endpoint, transport_file, sender_id)
            .await?;
        info!("{} accepted the staged transport file", token.endpoint);

        self.with_session(token, |session| {
            session.refresh_staged(staged)?;
            session.view()
        })
    }

    /// Runs the activation handshake and refreshes the active parameters afterwards,
    /// regardless of its outcome.
    pub async fn activate(
        &self,
        kind: EndpointKind,
        request: ActivationRequest,
    ) -> Result<ActivationResult, ConnectionError> {
        let (token, envelope) = self.with_current(kind, |token, session| {
            let envelope = session.activation.begin(token.endpoint, &request)?;
            Ok((token, envelope))
        })?;

        let mut pending = PendingActivation::new(&self.panels, token);
        let response = self
            .api
            .patch_staged(token.endpoint, &StagedPatch::Activation(envelope))
            .await;
        pending.disarm();

        let outcome =
            self.with_session(token, |session| Ok(session.activation.complete(response)))?;

        match &outcome {
            Ok(ActivationResult::Applied) => info!("{} activated", token.endpoint),
            Ok(ActivationResult::Scheduled { activation_time }) => info!(
                "{} scheduled for activation at {activation_time}",
                token.endpoint
            ),
            Err(err) => warn!("activation of {} failed: {err}", token.endpoint),
        }

        if let Err(err) = self.refresh_active_for(token).await {
            if !err.is_stale() {
                warn!(
                    "could not refresh active parameters of {}: {err}",
                    token.endpoint
                );
            }
        }
        outcome
    }

    /// Fetches the parameters the selected endpoint is currently running with.
    pub async fn refresh_active(
        &self,
        kind: EndpointKind,
    ) -> Result<ActiveSnapshot, ConnectionError> {
        let token = self.token(kind)?;
        self.refresh_active_for(token).await
    }

    async fn refresh_active_for(
        &self,
        token: SelectionToken,
    ) -> Result<ActiveSnapshot, ConnectionError> {
        let snapshot = ActiveParameterMonitor::new(&*self.api)
            .fetch_active(token.endpoint)
            .await?;
        self.with_session(token, |session| {
            session.active = Some(snapshot.clone());
            Ok(snapshot)
        })
    }

    /// Transport file currently published by the selected sender.
    pub async fn sender_transport_file(&self) -> Result<String, ConnectionError> {
        let token = self.token(EndpointKind::Sender)?;
        let file = self.api.get_transport_file(token.endpoint).await?;
        self.with_session(token, |_| Ok(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::TaiTimestamp;
    use crate::coercion::RawField;
    use crate::constraints::LegConstraints;
    use crate::params::tests::{sender_id, two_leg_constraints, two_leg_staged};
    use crate::staging::PeerResponse;
    use async_trait::async_trait;
    use http::StatusCode;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn other_sender_id() -> Uuid {
        Uuid::parse_str("9b1e7c1a-3b9e-4f0e-8f36-0a6d1b0c2e77").unwrap()
    }

    fn receiver_id() -> Uuid {
        Uuid::parse_str("0c5f4b36-8b09-4c1a-a7b5-3e1d0f0a9c11").unwrap()
    }

    fn single_leg_receiver_constraints() -> Vec<LegConstraints> {
        serde_json::from_value(json!([
            {"interface_ip": {"enum": ["10.0.0.5"]}, "destination_port": {}, "multicast_ip": {}, "rtp_enabled": {}}
        ]))
        .unwrap()
    }

    fn single_leg_receiver_staged() -> StagedDocument {
        serde_json::from_value(json!({
            "transport_params": [
                {"interface_ip": "auto", "destination_port": 5004, "multicast_ip": null, "rtp_enabled": true}
            ],
            "master_enable": true,
            "sender_id": null,
            "transport_file": {"type": "application/sdp", "data": "v=0"}
        }))
        .unwrap()
    }

    fn active_document() -> ActiveSnapshot {
        serde_json::from_value(json!({
            "master_enable": true,
            "transport_params": [{"destination_port": 5004}, {"destination_port": 5006}]
        }))
        .unwrap()
    }

    /// In-memory device. Successful parameter patches are merged into its staged state.
    #[derive(Default)]
    struct FakePeer {
        constraints: Mutex<HashMap<Uuid, Vec<LegConstraints>>>,
        staged: Mutex<HashMap<Uuid, StagedDocument>>,
        scripted: Mutex<VecDeque<Result<PeerResponse, ConnectionError>>>,
        patches: Mutex<Vec<(Endpoint, StagedPatch)>>,
        active_reads: Mutex<Vec<Endpoint>>,
        hold_patches: AtomicBool,
        hold_next_staged_read: AtomicBool,
        hold_next_active_read: AtomicBool,
        gate_entered: Notify,
        gate_release: Notify,
    }

    impl FakePeer {
        fn with_endpoint(
            self,
            id: Uuid,
            constraints: Vec<LegConstraints>,
            staged: StagedDocument,
        ) -> Self {
            self.constraints.lock().insert(id, constraints);
            self.staged.lock().insert(id, staged);
            self
        }

        fn script(&self, status: StatusCode, body: serde_json::Value) {
            self.scripted
                .lock()
                .push_back(Ok(PeerResponse::new("fake://staged", status, body)));
        }

        fn script_unreachable(&self) {
            let source = reqwest::Client::new().get("not a url").build().unwrap_err();
            self.scripted
                .lock()
                .push_back(Err(ConnectionError::RemoteUnavailable {
                    url: "fake://staged".to_string(),
                    source,
                }));
        }

        /// Parks the caller until the test releases the gate.
        async fn pass_gate(&self) {
            self.gate_entered.notify_one();
            self.gate_release.notified().await;
        }

        async fn wait_at_gate(&self) {
            self.gate_entered.notified().await;
        }

        fn open_gate(&self) {
            self.gate_release.notify_one();
        }

        fn patches(&self) -> Vec<(Endpoint, StagedPatch)> {
            self.patches.lock().clone()
        }

        fn missing(endpoint: Endpoint) -> ConnectionError {
            ConnectionError::RemoteRejected {
                status: StatusCode::NOT_FOUND,
                message: format!("{endpoint} does not exist"),
            }
        }
    }

    #[async_trait]
    impl ConnectionApi for FakePeer {
        async fn get_constraints(
            &self,
            endpoint: Endpoint,
        ) -> Result<Vec<LegConstraints>, ConnectionError> {
            self.constraints
                .lock()
                .get(&endpoint.id)
                .cloned()
                .ok_or_else(|| Self::missing(endpoint))
        }

        async fn get_staged(&self, endpoint: Endpoint) -> Result<StagedDocument, ConnectionError> {
            if self.hold_next_staged_read.swap(false, Ordering::SeqCst) {
                self.pass_gate().await;
            }
            self.staged
                .lock()
                .get(&endpoint.id)
                .cloned()
                .ok_or_else(|| Self::missing(endpoint))
        }

        async fn patch_staged(
            &self,
            endpoint: Endpoint,
            patch: &StagedPatch,
        ) -> Result<PeerResponse, ConnectionError> {
            self.patches.lock().push((endpoint, patch.clone()));
            if self.hold_patches.load(Ordering::SeqCst) {
                self.pass_gate().await;
            }

            if let Some(scripted) = self.scripted.lock().pop_front() {
                return scripted;
            }

            let mut staged = self.staged.lock();
            let document = staged
                .get_mut(&endpoint.id)
                .ok_or_else(|| Self::missing(endpoint))?;
            match patch {
                StagedPatch::Parameters(request) => {
                    document.transport_params = request.transport_params.clone();
                    document.master_enable = request.master_enable;
                    if let Some(receiver_id) = request.receiver_id {
                        document.receiver_id = receiver_id;
                    }
                    if let Some(sender_id) = request.sender_id {
                        document.sender_id = sender_id;
                    }
                }
                StagedPatch::TransportFile(request) => {
                    document.transport_file = Some(request.transport_file.clone());
                    document.sender_id = request.sender_id;
                }
                StagedPatch::Activation(_) => {
                    return Ok(PeerResponse::new(
                        "fake://staged",
                        StatusCode::OK,
                        json!({"activation": {"mode": "activate_immediate"}}),
                    ))
                }
            }
            Ok(PeerResponse::new(
                "fake://staged",
                StatusCode::OK,
                serde_json::to_value(&*document).unwrap(),
            ))
        }

        async fn get_active(&self, endpoint: Endpoint) -> Result<ActiveSnapshot, ConnectionError> {
            if self.hold_next_active_read.swap(false, Ordering::SeqCst) {
                self.pass_gate().await;
            }
            self.active_reads.lock().push(endpoint);
            Ok(active_document())
        }

        async fn get_transport_file(&self, sender: Endpoint) -> Result<String, ConnectionError> {
            Ok(format!("v=0\r\ns={}\r\n", sender.id))
        }
    }

    fn fake_peer() -> Arc<FakePeer> {
        Arc::new(
            FakePeer::default()
                .with_endpoint(sender_id(), two_leg_constraints(), two_leg_staged())
                .with_endpoint(other_sender_id(), two_leg_constraints(), two_leg_staged())
                .with_endpoint(
                    receiver_id(),
                    single_leg_receiver_constraints(),
                    single_leg_receiver_staged(),
                ),
        )
    }

    fn staged_request(patch: &StagedPatch) -> &crate::staging::StageRequest {
        match patch {
            StagedPatch::Parameters(request) => request,
            other => panic!("unexpected patch {other:?}"),
        }
    }

    #[tokio::test]
    async fn selecting_loads_constraints_and_staged_state() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());

        let view = manager.select(Endpoint::sender(sender_id())).await.unwrap();
        assert_eq!(view.leg_count, 2);
        assert_eq!(view.displayed_leg, 0);
        assert!(view.visible_params.contains(&"fec_block_width".to_string()));
        assert_eq!(view.options["source_ip"].last(), Some(&ParamValue::Auto));
        assert_eq!(
            view.form.field("destination_port"),
            Some(&RawField::from("5004"))
        );
        assert_eq!(
            manager.selected(EndpointKind::Sender),
            Some(Endpoint::sender(sender_id()))
        );
        assert_eq!(manager.selected(EndpointKind::Receiver), None);
    }

    #[tokio::test]
    async fn unknown_endpoints_fail_to_select() {
        let manager = ConnectionManager::from_shared(fake_peer());
        let err = manager
            .select(Endpoint::sender(Uuid::nil()))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::RemoteRejected { .. }));
        assert!(matches!(
            manager.view(EndpointKind::Sender),
            Err(ConnectionError::NoEndpointSelected { .. })
        ));
    }

    #[tokio::test]
    async fn staging_always_sends_every_leg() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        let view = manager.select(Endpoint::sender(sender_id())).await.unwrap();

        let form = view.form.with_field("destination_port", "6000");
        let staged = manager.stage(EndpointKind::Sender, &form).await.unwrap();
        assert_eq!(
            staged.form.field("destination_port"),
            Some(&RawField::from("6000"))
        );

        let patches = peer.patches();
        assert_eq!(patches.len(), 1);
        let request = staged_request(&patches[0].1);
        assert_eq!(request.transport_params.len(), 2);
        assert_eq!(
            request.transport_params[1]["destination_port"],
            ParamValue::Integer(5006)
        );
        assert_eq!(request.receiver_id, Some(None));
        assert_eq!(request.sender_id, None);
    }

    #[tokio::test]
    async fn edits_of_a_hidden_leg_are_staged_too() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        let view = manager.select(Endpoint::sender(sender_id())).await.unwrap();

        let leg_zero = view.form.with_field("destination_port", "6000");
        let view = manager
            .select_leg(EndpointKind::Sender, 1, &leg_zero)
            .unwrap();
        assert_eq!(view.displayed_leg, 1);
        assert_eq!(view.options["source_ip"][0], ParamValue::from("192.168.2.10"));

        let leg_one = view.form.with_field("destination_port", "6002");
        manager.stage(EndpointKind::Sender, &leg_one).await.unwrap();

        let patches = peer.patches();
        let request = staged_request(&patches[0].1);
        assert_eq!(
            request.transport_params[0]["destination_port"],
            ParamValue::Integer(6000)
        );
        assert_eq!(
            request.transport_params[1]["destination_port"],
            ParamValue::Integer(6002)
        );
    }

    #[tokio::test]
    async fn invalid_fields_block_the_request() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        let view = manager.select(Endpoint::sender(sender_id())).await.unwrap();
        let before = manager
            .session(EndpointKind::Sender, |s| s.params().clone())
            .unwrap();

        let form = view.form.clone().with_field("destination_port", "abc");
        let err = manager.stage(EndpointKind::Sender, &form).await.unwrap_err();
        assert!(err.is_validation_failure());

        let form = view.form.with_field("fec_block_width", "1000");
        let err = manager.stage(EndpointKind::Sender, &form).await.unwrap_err();
        assert!(matches!(err, ConnectionError::ConstraintViolation { .. }));

        assert!(peer.patches().is_empty());
        let after = manager
            .session(EndpointKind::Sender, |s| s.params().clone())
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn rejected_staging_surfaces_the_peer_error() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        let view = manager.select(Endpoint::sender(sender_id())).await.unwrap();

        peer.script(
            StatusCode::BAD_REQUEST,
            json!({"code": 400, "error": "destination_port out of range"}),
        );
        let form = view.form.with_field("destination_port", "6000");
        let err = manager.stage(EndpointKind::Sender, &form).await.unwrap_err();
        assert_eq!(err.remote_message(), Some("destination_port out of range"));

        // the edit is kept locally so it can be retried
        let port = manager
            .session(EndpointKind::Sender, |s| {
                s.params().value(0, "destination_port").cloned()
            })
            .unwrap();
        assert_eq!(port, Some(ParamValue::Integer(6000)));
    }

    #[tokio::test]
    async fn failed_activation_after_staging_keeps_the_staged_state() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        let view = manager.select(Endpoint::sender(sender_id())).await.unwrap();

        let form = view.form.with_field("destination_port", "6000");
        manager.stage(EndpointKind::Sender, &form).await.unwrap();
        let staged = manager
            .session(EndpointKind::Sender, |s| s.params().clone())
            .unwrap();

        peer.script(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"code": 500, "error": "busy"}),
        );
        let err = manager
            .activate(EndpointKind::Sender, ActivationRequest::immediate())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::RemoteRejected {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                ..
            }
        ));
        assert_eq!(err.remote_message(), Some("busy"));

        let (params, state, active) = manager
            .session(EndpointKind::Sender, |s| {
                (
                    s.params().clone(),
                    s.activation_state().clone(),
                    s.active().cloned(),
                )
            })
            .unwrap();
        assert_eq!(params, staged);
        assert_eq!(
            state,
            ActivationState::Rejected {
                message: "busy".into()
            }
        );
        // active parameters get refreshed even after a rejection
        assert_eq!(active, Some(active_document()));
    }

    #[tokio::test]
    async fn scheduled_activation_reports_the_peer_time() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        manager.select(Endpoint::sender(sender_id())).await.unwrap();

        peer.script(
            StatusCode::ACCEPTED,
            json!({"activation": {"mode": "activate_scheduled_absolute", "requested_time": "1600000000:0", "activation_time": "1600000000:0"}}),
        );
        let at = TaiTimestamp::new(1_600_000_000, 0).unwrap();
        let result = manager
            .activate(EndpointKind::Sender, ActivationRequest::absolute(at))
            .await
            .unwrap();
        assert_eq!(
            result,
            ActivationResult::Scheduled {
                activation_time: "1600000000:0".into()
            }
        );

        let patches = peer.patches();
        assert_eq!(
            serde_json::to_value(&patches[0].1).unwrap(),
            json!({"activation": {"mode": "activate_scheduled_absolute", "requested_time": "1600000000:0"}})
        );
        assert_eq!(
            peer.active_reads.lock().as_slice(),
            &[Endpoint::sender(sender_id())]
        );
    }

    #[tokio::test]
    async fn immediate_activation_is_applied() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        manager.select(Endpoint::sender(sender_id())).await.unwrap();

        let result = manager
            .activate(EndpointKind::Sender, ActivationRequest::immediate())
            .await
            .unwrap();
        assert_eq!(result, ActivationResult::Applied);
        assert_eq!(
            manager
                .session(EndpointKind::Sender, |s| s.activation_state().clone())
                .unwrap(),
            ActivationState::Applied
        );
    }

    #[tokio::test]
    async fn responses_for_a_deselected_endpoint_are_discarded() {
        let peer = fake_peer();
        peer.hold_patches.store(true, Ordering::SeqCst);
        let manager = ConnectionManager::from_shared(peer.clone());
        let view = manager.select(Endpoint::sender(sender_id())).await.unwrap();

        let form = view.form.with_field("destination_port", "6000");
        let stage = manager.stage(EndpointKind::Sender, &form);
        let switch = async {
            peer.wait_at_gate().await;
            let view = manager
                .select(Endpoint::sender(other_sender_id()))
                .await
                .unwrap();
            peer.open_gate();
            view
        };
        let (staged, switched) = tokio::join!(stage, switch);

        assert!(staged.unwrap_err().is_stale());
        assert_eq!(switched.endpoint, Endpoint::sender(other_sender_id()));

        let current = manager
            .session(EndpointKind::Sender, |s| {
                (s.endpoint(), s.params().value(0, "destination_port").cloned())
            })
            .unwrap();
        assert_eq!(
            current,
            (
                Endpoint::sender(other_sender_id()),
                Some(ParamValue::Integer(5004))
            )
        );
    }

    #[tokio::test]
    async fn panels_of_different_kinds_are_independent() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        manager.select(Endpoint::sender(sender_id())).await.unwrap();
        manager.select(Endpoint::receiver(receiver_id())).await.unwrap();

        manager.deselect(EndpointKind::Receiver);
        assert!(manager.view(EndpointKind::Sender).is_ok());
        assert!(manager.view(EndpointKind::Receiver).is_err());
    }

    #[tokio::test]
    async fn receiver_staging_uses_sender_id() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        let view = manager
            .select(Endpoint::receiver(receiver_id()))
            .await
            .unwrap();
        assert_eq!(view.options["interface_ip"].len(), 2);

        let form = view
            .form
            .with_field("multicast_ip", "")
            .with_peer_id(sender_id().to_string());
        manager.stage(EndpointKind::Receiver, &form).await.unwrap();

        let patches = peer.patches();
        let request = staged_request(&patches[0].1);
        assert_eq!(request.sender_id, Some(Some(sender_id())));
        assert_eq!(request.receiver_id, None);
        assert_eq!(
            request.transport_params[0]["multicast_ip"],
            ParamValue::Null
        );
    }

    #[tokio::test]
    async fn transport_file_staging_refreshes_the_receiver() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        manager
            .select(Endpoint::receiver(receiver_id()))
            .await
            .unwrap();
        assert_eq!(
            manager
                .session(EndpointKind::Receiver, |s| s.transport_file().cloned())
                .unwrap(),
            Some(TransportFile::new("application/sdp", "v=0"))
        );

        let file = TransportFile::new("application/sdp", "v=0\r\ns=updated\r\n");
        let view = manager
            .stage_transport_file(file.clone(), Some(sender_id()))
            .await
            .unwrap();
        assert_eq!(view.form.peer_id, sender_id().to_string());
        assert_eq!(
            manager
                .session(EndpointKind::Receiver, |s| s.transport_file().cloned())
                .unwrap(),
            Some(file)
        );
    }

    #[tokio::test]
    async fn transport_file_staging_needs_a_receiver() {
        let manager = ConnectionManager::from_shared(fake_peer());
        manager.select(Endpoint::sender(sender_id())).await.unwrap();

        let err = manager
            .stage_transport_file(TransportFile::new("application/sdp", "v=0"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::NoEndpointSelected {
                kind: EndpointKind::Receiver
            }
        ));
    }

    #[tokio::test]
    async fn active_parameters_can_be_refreshed_on_demand() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        manager.select(Endpoint::sender(sender_id())).await.unwrap();

        let first = manager.refresh_active(EndpointKind::Sender).await.unwrap();
        let second = manager.refresh_active(EndpointKind::Sender).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.leg_count(), 2);
        assert_eq!(peer.active_reads.lock().len(), 2);

        let sdp = manager.sender_transport_file().await.unwrap();
        assert!(sdp.contains(&sender_id().to_string()));
    }

    #[tokio::test]
    async fn abandoned_activation_does_not_block_the_next_one() {
        let peer = fake_peer();
        peer.hold_patches.store(true, Ordering::SeqCst);
        let manager = ConnectionManager::from_shared(peer.clone());
        manager.select(Endpoint::sender(sender_id())).await.unwrap();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            manager.activate(EndpointKind::Sender, ActivationRequest::immediate()),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(
            manager
                .session(EndpointKind::Sender, |s| s.activation_state().clone())
                .unwrap(),
            ActivationState::Idle
        );

        peer.hold_patches.store(false, Ordering::SeqCst);
        let result = manager
            .activate(EndpointKind::Sender, ActivationRequest::immediate())
            .await
            .unwrap();
        assert_eq!(result, ActivationResult::Applied);
    }

    #[tokio::test]
    async fn activation_answered_after_a_reselection_is_discarded() {
        let peer = fake_peer();
        peer.hold_patches.store(true, Ordering::SeqCst);
        let manager = ConnectionManager::from_shared(peer.clone());
        manager.select(Endpoint::sender(sender_id())).await.unwrap();

        let activate = manager.activate(EndpointKind::Sender, ActivationRequest::immediate());
        let switch = async {
            peer.wait_at_gate().await;
            manager
                .select(Endpoint::sender(other_sender_id()))
                .await
                .unwrap();
            peer.open_gate();
        };
        let (activated, _) = tokio::join!(activate, switch);

        assert!(activated.unwrap_err().is_stale());
        let (endpoint, state, active) = manager
            .session(EndpointKind::Sender, |s| {
                (s.endpoint(), s.activation_state().clone(), s.active().cloned())
            })
            .unwrap();
        assert_eq!(endpoint, Endpoint::sender(other_sender_id()));
        assert_eq!(state, ActivationState::Idle);
        assert_eq!(active, None);
        assert!(peer.active_reads.lock().is_empty());
    }

    #[tokio::test]
    async fn later_selection_wins_over_a_slower_one() {
        let peer = fake_peer();
        peer.hold_next_staged_read.store(true, Ordering::SeqCst);
        let manager = ConnectionManager::from_shared(peer.clone());

        let first = manager.select(Endpoint::sender(sender_id()));
        let second = async {
            peer.wait_at_gate().await;
            let view = manager
                .select(Endpoint::sender(other_sender_id()))
                .await
                .unwrap();
            peer.open_gate();
            view
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.unwrap_err().is_stale());
        assert_eq!(second.endpoint, Endpoint::sender(other_sender_id()));
        assert_eq!(
            manager.selected(EndpointKind::Sender),
            Some(Endpoint::sender(other_sender_id()))
        );
    }

    #[tokio::test]
    async fn transport_file_accepted_after_a_reselection_is_discarded() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        manager
            .select(Endpoint::receiver(receiver_id()))
            .await
            .unwrap();
        peer.hold_patches.store(true, Ordering::SeqCst);

        let file = TransportFile::new("application/sdp", "v=0\r\ns=updated\r\n");
        let stage = manager.stage_transport_file(file, Some(sender_id()));
        let switch = async {
            peer.wait_at_gate().await;
            manager
                .select(Endpoint::receiver(receiver_id()))
                .await
                .unwrap();
            peer.open_gate();
        };
        let (staged, _) = tokio::join!(stage, switch);

        assert!(staged.unwrap_err().is_stale());
        assert_eq!(
            manager
                .session(EndpointKind::Receiver, |s| s.transport_file().cloned())
                .unwrap(),
            Some(TransportFile::new("application/sdp", "v=0"))
        );
    }

    #[tokio::test]
    async fn active_parameters_of_a_replaced_endpoint_are_discarded() {
        let peer = fake_peer();
        let manager = ConnectionManager::from_shared(peer.clone());
        manager.select(Endpoint::sender(sender_id())).await.unwrap();
        peer.hold_next_active_read.store(true, Ordering::SeqCst);

        let refresh = manager.refresh_active(EndpointKind::Sender);
        let switch = async {
            peer.wait_at_gate().await;
            manager
                .select(Endpoint::sender(other_sender_id()))
                .await
                .unwrap();
            peer.open_gate();
        };
        let (refreshed, _) = tokio::join!(refresh, switch);

        assert!(refreshed.unwrap_err().is_stale());
        assert_eq!(
            manager
                .session(EndpointKind::Sender, |s| s.active().cloned())
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn unreachable_peer_rejects_the_activation_and_still_refreshes_active() {
        let peer = fake_peer();
        peer.script_unreachable();
        let manager = ConnectionManager::from_shared(peer.clone());
        manager.select(Endpoint::sender(sender_id())).await.unwrap();

        let err = manager
            .activate(EndpointKind::Sender, ActivationRequest::immediate())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::RemoteUnavailable { .. }));

        let (state, active) = manager
            .session(EndpointKind::Sender, |s| {
                (s.activation_state().clone(), s.active().cloned())
            })
            .unwrap();
        assert!(matches!(state, ActivationState::Rejected { .. }));
        assert_eq!(active, Some(active_document()));
        assert_eq!(peer.active_reads.lock().len(), 1);
    }
}
