// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP surface of the synchronization service.
//!
//! All routes live under `/api` and accept their parameters in the query
//! string, which is what device firmware can produce most easily:
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /api` | Health and waiter counts |
//! | `GET /api/device/registration` | First-contact provisioning |
//! | `GET /api/device/authorization` | Device startup check |
//! | `GET /api/device/values` | Read, write, or long-poll device values |
//! | `GET /api/user/device` | List or long-poll the user's devices |
//! | `POST /api/user/device` | Claim a device |
//! | `DELETE /api/user/device` | Soft-delete an owned device |
//!
//! User sessions are resolved through a [`SessionResolver`]; issuing tokens
//! is left to whatever sits in front of this server.

mod auth;
mod error;
mod params;
mod routes;

pub use auth::{SessionResolver, StaticSessions};
pub use error::ApiError;

use std::sync::Arc;

use axum::Router;
use axum::http::{Method, header};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};

use crate::service::DeviceSync;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The synchronization service.
    pub sync: Arc<DeviceSync>,
    /// Resolves bearer tokens to users.
    pub sessions: Arc<dyn SessionResolver>,
}

impl AppState {
    /// Creates the state from its parts.
    #[must_use]
    pub fn new(sync: Arc<DeviceSync>, sessions: Arc<dyn SessionResolver>) -> Self {
        Self { sync, sessions }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

/// Builds the axum router with all routes and the CORS layer.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(Any);

    let api = Router::new()
        .route("/device/registration", get(routes::register_device))
        .route("/device/authorization", get(routes::authorize_device))
        .route("/device/values", get(routes::device_values))
        .route(
            "/user/device",
            get(routes::user_devices)
                .post(routes::claim_device)
                .delete(routes::release_device),
        );

    Router::new()
        .route("/api", get(routes::health))
        .nest("/api", api)
        .layer(cors)
        .with_state(state)
}
