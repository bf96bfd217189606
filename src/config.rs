// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime configuration of the sync service.

use std::collections::BTreeMap;
use std::time::Duration;

/// Default time a device stays online after its last contact.
pub const DEFAULT_HEARTBEAT_TTL: Duration = Duration::from_secs(2 * 60);

/// Default upper bound on a single long-poll wait.
pub const DEFAULT_LONGPOLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for [`DeviceSync`](crate::DeviceSync).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use homepoll::SyncConfig;
///
/// let config = SyncConfig::default()
///     .with_heartbeat_ttl(Duration::from_secs(30))
///     .with_longpoll_timeout(Duration::from_secs(20));
///
/// assert_eq!(config.longpoll_timeout, Some(Duration::from_secs(20)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// How long a device counts as online after each authenticated contact.
    pub heartbeat_ttl: Duration,
    /// How long a long-poll request may wait before it answers with no
    /// update. `None` waits until notified or disconnected.
    pub longpoll_timeout: Option<Duration>,
    /// Names of the known hardware types, by type id.
    pub device_types: BTreeMap<u32, String>,
}

impl SyncConfig {
    /// Sets the heartbeat time-to-live.
    #[must_use]
    pub fn with_heartbeat_ttl(mut self, ttl: Duration) -> Self {
        self.heartbeat_ttl = ttl;
        self
    }

    /// Sets the long-poll timeout.
    #[must_use]
    pub fn with_longpoll_timeout(mut self, timeout: Duration) -> Self {
        self.longpoll_timeout = Some(timeout);
        self
    }

    /// Lets long-poll requests wait without bound.
    #[must_use]
    pub fn without_longpoll_timeout(mut self) -> Self {
        self.longpoll_timeout = None;
        self
    }

    /// Names a hardware type.
    #[must_use]
    pub fn with_device_type(mut self, id: u32, title: impl Into<String>) -> Self {
        self.device_types.insert(id, title.into());
        self
    }

    /// Returns the name of a hardware type, or a generic one for unknown
    /// types.
    #[must_use]
    pub fn device_type_title(&self, id: u32) -> String {
        self.device_types
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("Device type {id}"))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heartbeat_ttl: DEFAULT_HEARTBEAT_TTL,
            longpoll_timeout: Some(DEFAULT_LONGPOLL_TIMEOUT),
            device_types: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.heartbeat_ttl, Duration::from_secs(120));
        assert_eq!(config.longpoll_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn unbounded_long_poll() {
        let config = SyncConfig::default().without_longpoll_timeout();
        assert_eq!(config.longpoll_timeout, None);
    }

    #[test]
    fn device_type_titles() {
        let config = SyncConfig::default().with_device_type(1, "RGB lamp");
        assert_eq!(config.device_type_title(1), "RGB lamp");
        assert_eq!(config.device_type_title(2), "Device type 2");
    }
}
