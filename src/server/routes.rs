// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Route handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use super::auth::{require_user, session_user};
use super::params::Params;
use super::{ApiError, AppState};
use crate::error::Error;
use crate::service::{Registration, Subject};
use crate::store::ValueWrite;

type Pairs = Query<Vec<(String, String)>>;

/// `GET /api`
pub(super) async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "waiters": state.sync.waiter_counts(),
    }))
}

/// `GET /api/device/registration?deviceId=&ip=&device_type=&<initial values>`
pub(super) async fn register_device(
    State(state): State<AppState>,
    Query(pairs): Pairs,
) -> Result<Json<Value>, ApiError> {
    let params = Params::new(pairs);
    let history = params.history();

    let registration = params.fields().into_iter().fold(
        Registration::new(params.mac()?, params.require("ip")?, params.device_type()?),
        |registration, (title, raw)| {
            registration.with_value(title, raw, history.contains(title))
        },
    );

    let key = state.sync.register_device(registration)?;
    Ok(Json(json!({ "key": key })))
}

/// `GET /api/device/authorization?deviceId=&key=&ip=`
pub(super) async fn authorize_device(
    State(state): State<AppState>,
    Query(pairs): Pairs,
) -> Result<Response, ApiError> {
    let params = Params::new(pairs);
    let credentials = state.sync.authorize_device(
        &params.mac()?,
        params.require("key")?,
        params.require("ip")?,
    )?;
    Ok(Json(credentials).into_response())
}

/// `GET /api/device/values`
///
/// Identified either by `(deviceId, key)` or by a user session. Then, in
/// order of precedence: `longpool` waits for the next change, `value`
/// reads one key, write fields update values, and otherwise every value is
/// returned.
pub(super) async fn device_values(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pairs): Pairs,
) -> Result<Response, ApiError> {
    let params = Params::new(pairs);
    let sync = &state.sync;

    let (device, subject) = if let Some(key) = params.get("key") {
        let device = sync.identify_device(&params.mac()?, key)?;
        (device.id, Subject::Device(device.id))
    } else if let Some(user) = session_user(state.sessions.as_ref(), &headers, &params)? {
        let device = sync.device_for_user(user, params.optional_mac()?.as_ref())?;
        (device.id, Subject::User(user))
    } else {
        return Err(Error::bad_request("missing device key or user session").into());
    };

    if params.flag("longpool") {
        let outcome = sync.long_poll(subject, params.request_id()).await;
        return Ok(Json(outcome.into_notification()).into_response());
    }

    if let Some(title) = params.get("value") {
        let snapshot = sync.read_value(device, title)?;
        return Ok(Json(BTreeMap::from([(title, snapshot)])).into_response());
    }

    let fields = params.fields();
    if !fields.is_empty() {
        let history = params.history();
        let writes: Vec<ValueWrite> = fields
            .iter()
            .map(|&(title, raw)| {
                let write = ValueWrite::new(title, raw);
                if history.contains(title) {
                    write.with_history(true)
                } else {
                    write
                }
            })
            .collect();
        sync.write_values(device, &writes)?;

        let echo: BTreeMap<&str, &str> = fields.into_iter().collect();
        return Ok(Json(echo).into_response());
    }

    Ok(Json(sync.read_values(device)?).into_response())
}

/// `GET /api/user/device`
pub(super) async fn user_devices(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pairs): Pairs,
) -> Result<Response, ApiError> {
    let params = Params::new(pairs);
    let user = require_user(state.sessions.as_ref(), &headers, &params)?;

    if params.flag("longpool") {
        let outcome = state
            .sync
            .long_poll(Subject::User(user), params.request_id())
            .await;
        return Ok(Json(outcome.into_notification()).into_response());
    }

    let devices = state.sync.user_devices(user)?;
    Ok(Json(json!({ "devices": devices })).into_response())
}

/// `POST /api/user/device?deviceId=&key=`
pub(super) async fn claim_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pairs): Pairs,
) -> Result<Json<Value>, ApiError> {
    let params = Params::new(pairs);
    let user = require_user(state.sessions.as_ref(), &headers, &params)?;
    let device = state
        .sync
        .claim_device(user, &params.mac()?, params.require("key")?)?;
    Ok(Json(json!({ "id": device.id, "mac": device.mac })))
}

/// `DELETE /api/user/device?deviceId=`
pub(super) async fn release_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pairs): Pairs,
) -> Result<StatusCode, ApiError> {
    let params = Params::new(pairs);
    let user = require_user(state.sessions.as_ref(), &headers, &params)?;
    state.sync.release_device(user, &params.mac()?)?;
    Ok(StatusCode::NO_CONTENT)
}
