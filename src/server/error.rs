// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mapping of crate errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{Error, StoreError};

/// A crate error on its way out of a handler.
///
/// Responds with the mapped status and a `{"message", "errors"}` body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    /// Returns the HTTP status for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Unauthorized | Error::DeviceUnauthorized => StatusCode::UNAUTHORIZED,
            Error::DeviceAuthorized | Error::BadRequest(_) | Error::Value(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Store(store) => match store {
                StoreError::DeviceNotFound
                | StoreError::InvalidKey(_)
                | StoreError::EntryNotFound
                | StoreError::MacTaken(_) => StatusCode::BAD_REQUEST,
                StoreError::Snapshot(_) | StoreError::SnapshotFormat(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let body = json!({
            "message": self.0.to_string(),
            "errors": [],
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValueError;

    #[test]
    fn status_mapping() {
        let cases = [
            (ApiError(Error::Unauthorized), StatusCode::UNAUTHORIZED),
            (ApiError(Error::DeviceUnauthorized), StatusCode::UNAUTHORIZED),
            (ApiError(Error::DeviceAuthorized), StatusCode::BAD_REQUEST),
            (
                ApiError::from(StoreError::InvalidKey("x".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(StoreError::DeviceNotFound),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(ValueError::InvalidMac(String::new())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(StoreError::Snapshot(std::io::Error::other("disk"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{:?}", err.0);
        }
    }

    #[tokio::test]
    async fn body_carries_message_and_errors() {
        let response = ApiError(Error::DeviceAuthorized).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({"message": "device is already registered", "errors": []})
        );
    }
}
