// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device liveness tracking.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::Result;
use crate::store::RecordStore;
use crate::types::DeviceId;

/// Extends a device's online deadline on every authenticated contact.
///
/// A device is online while `online_until` lies in the future. The tracker
/// only ever moves the deadline to `now + ttl`; it never marks a device
/// offline explicitly.
#[derive(Clone)]
pub struct HeartbeatTracker {
    store: Arc<dyn RecordStore>,
    ttl: TimeDelta,
}

impl HeartbeatTracker {
    /// Creates a tracker with the given time-to-live.
    ///
    /// A ttl beyond chrono's range saturates to one year.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl: to_delta(ttl),
        }
    }

    /// Returns the configured time-to-live.
    #[must_use]
    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Marks `device` online until now plus the configured ttl.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`](crate::error::StoreError::DeviceNotFound)
    /// if the device does not exist.
    pub fn touch(&self, device: DeviceId) -> Result<DateTime<Utc>> {
        self.touch_for(device, self.ttl)
    }

    /// Marks `device` online until now plus `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`](crate::error::StoreError::DeviceNotFound)
    /// if the device does not exist or was deleted.
    pub fn touch_for(&self, device: DeviceId, ttl: TimeDelta) -> Result<DateTime<Utc>> {
        let until = Utc::now() + ttl;
        self.store
            .update_device(device, &mut |record| record.online_until = Some(until))?;
        tracing::trace!(%device, %until, "Heartbeat");
        Ok(until)
    }
}

impl std::fmt::Debug for HeartbeatTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatTracker")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn to_delta(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::days(365))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, StoreError};
    use crate::store::{MemoryStore, NewDevice};
    use crate::types::UserId;
    use crate::types::{DeviceKey, Mac};

    fn setup() -> (Arc<MemoryStore>, DeviceId) {
        let store = Arc::new(MemoryStore::new());
        let device = store
            .insert_device(NewDevice {
                mac: Mac::new("aa").unwrap(),
                key: DeviceKey::from("k"),
                device_type: 1,
                title: "Lamp".to_string(),
                ip: "10.0.0.2".to_string(),
            })
            .unwrap();
        (store, device.id)
    }

    #[test]
    fn touch_extends_deadline() {
        let (store, id) = setup();
        let tracker = HeartbeatTracker::new(store.clone(), Duration::from_secs(120));

        let before = Utc::now();
        let until = tracker.touch(id).unwrap();

        assert!(until >= before + TimeDelta::seconds(120));
        let device = store.device(id).unwrap();
        assert_eq!(device.online_until, Some(until));
        assert!(device.is_online_at(Utc::now()));
        assert!(!device.is_online_at(until));
    }

    #[test]
    fn later_touch_moves_deadline_forward() {
        let (store, id) = setup();
        let tracker = HeartbeatTracker::new(store, Duration::from_secs(120));

        let first = tracker.touch_for(id, TimeDelta::seconds(1)).unwrap();
        let second = tracker.touch(id).unwrap();
        assert!(second > first);
    }

    #[test]
    fn unknown_device_fails() {
        let (store, _) = setup();
        let tracker = HeartbeatTracker::new(store, Duration::from_secs(120));
        let err = tracker.touch(DeviceId::new(99)).unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::DeviceNotFound)));
    }

    #[test]
    fn touch_keeps_other_fields() {
        let (store, id) = setup();
        store
            .update_device(id, &mut |d| d.owner = Some(UserId::new(4)))
            .unwrap();
        let tracker = HeartbeatTracker::new(store.clone(), Duration::from_secs(120));

        tracker.touch(id).unwrap();
        assert_eq!(store.device(id).unwrap().owner, Some(UserId::new(4)));
    }

    #[test]
    fn touch_never_revives_a_deleted_device() {
        let (store, id) = setup();
        let tracker = HeartbeatTracker::new(store.clone(), Duration::from_secs(120));
        store.update_device(id, &mut |d| d.deleted = true).unwrap();

        let err = tracker.touch(id).unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::DeviceNotFound)));
        assert!(store.device(id).is_none());
    }

    #[test]
    fn huge_ttl_saturates() {
        assert_eq!(to_delta(Duration::MAX), TimeDelta::days(365));
    }
}
