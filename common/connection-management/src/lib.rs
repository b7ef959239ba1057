// Copyright 2026 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

//! Client-side staging and activation engine for IS-05 style connection management.
//!
//! The engine keeps, per selected sender or receiver, the staged transport parameters
//! reported by the remote connection api, lets a presentation layer edit them leg by leg,
//! and pushes them back through the stage-then-activate protocol.
//!
//! ```no_run
//! # use nmos_connection_management::{
//! #     ConnectionError, ConnectionManager, Endpoint, HttpConnectionApi,
//! # };
//! # use nmos_connection_management::activation::ActivationRequest;
//! # async fn run(id: uuid::Uuid) -> Result<(), ConnectionError> {
//! let api = HttpConnectionApi::builder("http://localhost:8080")?.build()?;
//! let manager = ConnectionManager::new(api);
//!
//! let view = manager.select(Endpoint::sender(id)).await?;
//! let form = view.form.with_field("destination_port", "5006");
//! manager.stage(view.endpoint.kind, &form).await?;
//! manager
//!     .activate(view.endpoint.kind, ActivationRequest::immediate())
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::expect_used)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::dbg_macro)]

pub mod activation;
pub mod active;
pub mod api;
pub mod coercion;
pub mod constraints;
pub mod error;
pub mod manager;
pub mod params;
pub mod reconciler;
pub mod staging;

pub use api::client::{ClientBuilder, ClientConfig, HttpConnectionApi};
pub use api::ConnectionApi;
pub use error::ConnectionError;
pub use manager::{ConnectionManager, EndpointSession, EndpointView};
pub use params::{Endpoint, EndpointKind, ParamValue, TransportParameterSet};
pub use reconciler::FieldForm;
