// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Query string handling.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{Mac, RequestId};

/// Parameter names that never denote a value write.
const RESERVED: &[&str] = &[
    "key",
    "parent",
    "deviceId",
    "device_type",
    "value",
    "history",
    "ip",
    "longpool",
    "access_token",
    "rid",
];

/// Query parameters in request order, repeated names included.
#[derive(Debug, Clone, Default)]
pub(crate) struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub(crate) fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Returns the first non-empty value of `name`.
    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .find(|v| !v.is_empty())
    }

    pub(crate) fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| Error::bad_request(format!("missing {name}")))
    }

    /// Returns true if `name` is present with a non-empty value.
    pub(crate) fn flag(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The device's hardware address from `deviceId`.
    pub(crate) fn mac(&self) -> Result<Mac> {
        Ok(Mac::new(self.require("deviceId")?)?)
    }

    pub(crate) fn optional_mac(&self) -> Result<Option<Mac>> {
        Ok(self.get("deviceId").map(Mac::new).transpose()?)
    }

    pub(crate) fn device_type(&self) -> Result<u32> {
        self.require("device_type")?
            .parse()
            .map_err(|_| Error::bad_request("device_type must be a non-negative integer"))
    }

    /// Client-supplied `rid`, or a fresh random id.
    pub(crate) fn request_id(&self) -> RequestId {
        self.get("rid").map_or_else(RequestId::random, RequestId::from)
    }

    /// Keys listed in `history`, repeated or comma-separated.
    pub(crate) fn history(&self) -> HashSet<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == "history")
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Non-reserved `(title, raw value)` pairs in request order.
    pub(crate) fn fields(&self) -> Vec<(&str, &str)> {
        self.pairs
            .iter()
            .filter(|(k, _)| !k.is_empty() && !RESERVED.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        Params::new(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn fields_skip_reserved_names() {
        let p = params(&[
            ("deviceId", "aa"),
            ("key", "k"),
            ("color", "1,2,3,4"),
            ("longpool", "1"),
            ("rid", "r"),
            ("mode", "auto"),
            ("history", "mode"),
        ]);
        assert_eq!(p.fields(), [("color", "1,2,3,4"), ("mode", "auto")]);
    }

    #[test]
    fn history_accepts_repeats_and_commas() {
        let p = params(&[("history", "temp, level"), ("history", "log")]);
        let history = p.history();
        assert_eq!(history.len(), 3);
        assert!(history.contains("temp"));
        assert!(history.contains("level"));
        assert!(history.contains("log"));
    }

    #[test]
    fn empty_values_count_as_missing() {
        let p = params(&[("longpool", ""), ("deviceId", " ")]);
        assert!(!p.flag("longpool"));
        assert!(matches!(p.mac(), Err(Error::BadRequest(_))));
        assert_eq!(p.optional_mac().unwrap(), None);
    }

    #[test]
    fn mac_is_normalized() {
        let p = params(&[("deviceId", "AA:BB")]);
        assert_eq!(p.mac().unwrap().as_str(), "aa:bb");
    }

    #[test]
    fn device_type_must_be_numeric() {
        assert_eq!(params(&[("device_type", "3")]).device_type().unwrap(), 3);
        assert!(params(&[("device_type", "lamp")]).device_type().is_err());
        assert!(params(&[]).device_type().is_err());
    }

    #[test]
    fn request_id_from_rid_or_random() {
        assert_eq!(
            params(&[("rid", "tab-2")]).request_id(),
            RequestId::from("tab-2")
        );
        let a = params(&[]).request_id();
        let b = params(&[]).request_id();
        assert_ne!(a, b);
    }
}
