// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device credentials: hardware address and secret key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValueError;

/// Hardware address of a device.
///
/// Addresses are compared case-insensitively, so they are normalized to
/// lowercase on construction. Devices send whatever separator style their
/// firmware uses; only surrounding whitespace is trimmed.
///
/// # Examples
///
/// ```
/// use homepoll::types::Mac;
///
/// let mac = Mac::new("AA:BB:CC").unwrap();
/// assert_eq!(mac.as_str(), "aa:bb:cc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mac(String);

impl Mac {
    /// Creates a normalized hardware address.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidMac`] if the address is empty.
    pub fn new(raw: &str) -> Result<Self, ValueError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValueError::InvalidMac(raw.to_string()));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    /// Returns the normalized address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Mac {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secret issued to a device at registration.
///
/// Unauthenticated device calls present the `(mac, key)` pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    /// Mints a fresh 32-character hex key.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `candidate` equals this key.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl From<&str> for DeviceKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceKey(..)")
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
