// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `homepoll` crate.
//!
//! The hierarchy mirrors the layers of the crate: value decoding failures
//! ([`ValueError`]), record store failures ([`StoreError`]), and the
//! request-level kinds a handler maps to an HTTP status ([`Error`]).

use thiserror::Error;

use crate::types::Mac;

/// The main error type for this crate.
///
/// Every variant is recoverable at the request boundary: handlers map it to
/// a status code and a message, they never abort the process.
#[derive(Debug, Error)]
pub enum Error {
    /// A stored or submitted value could not be decoded.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// The record store rejected the operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The user session is missing or invalid.
    #[error("user is not authorized")]
    Unauthorized,

    /// The device credentials do not match, or the device was deleted.
    #[error("device is not authorized")]
    DeviceUnauthorized,

    /// Registration was attempted for a mac that is already registered.
    #[error("device is already registered")]
    DeviceAuthorized,

    /// A required parameter is missing or malformed.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl Error {
    /// Shorthand for [`Error::BadRequest`].
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

/// Errors raised by the codec when a raw value does not match its key family.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A composite value has the wrong arity or a non-numeric component.
    #[error("malformed value for `{key}`: {raw:?}")]
    Malformed {
        /// The key the value was written under.
        key: String,
        /// The offending raw value.
        raw: String,
    },

    /// A hardware address was empty.
    #[error("invalid mac address: {0:?}")]
    InvalidMac(String),
}

/// Errors raised by a [`RecordStore`](crate::store::RecordStore) or the
/// [`DeviceValueStore`](crate::store::DeviceValueStore) on top of it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No non-deleted device exists with the requested id.
    #[error("device not found")]
    DeviceNotFound,

    /// The key has never been written for this device and no history
    /// policy was supplied to create it.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// No value entry exists with the requested id.
    #[error("value entry not found")]
    EntryNotFound,

    /// A non-deleted device already uses this mac.
    #[error("mac {0} is already in use")]
    MacTaken(Mac),

    /// Reading or writing a snapshot file failed.
    #[error("snapshot I/O failed: {0}")]
    Snapshot(#[from] std::io::Error),

    /// A snapshot file could not be encoded or decoded.
    #[error("snapshot format error: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
