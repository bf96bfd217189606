// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device and value persistence.
//!
//! The [`RecordStore`] trait is the only contact point with persistence: a
//! handful of simple read and write operations on device records and value
//! entries. [`MemoryStore`] implements it in process and can snapshot its
//! tables to a JSON file.
//!
//! [`DeviceValueStore`] sits on top of a record store and owns the value
//! semantics: history policy, overwrite-in-place, and the color/effect
//! exclusion rule.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use homepoll::store::{DeviceValueStore, MemoryStore, NewDevice, RecordStore};
//! use homepoll::types::{DeviceKey, Mac};
//!
//! # fn main() -> homepoll::Result<()> {
//! let records = Arc::new(MemoryStore::new());
//! let device = records.insert_device(NewDevice {
//!     mac: Mac::new("aa:bb:cc")?,
//!     key: DeviceKey::generate(),
//!     device_type: 1,
//!     title: "Lamp".to_string(),
//!     ip: "10.0.0.2".to_string(),
//! })?;
//!
//! let values = DeviceValueStore::new(records);
//! values.write(device.id, "color", "255,0,0,255", Some(false))?;
//! assert_eq!(values.read(device.id)?.len(), 1);
//! # Ok(())
//! # }
//! ```

mod memory;
mod value_store;

pub use memory::MemoryStore;
pub use value_store::{DeviceValueStore, HistoryItem, ValueMap, ValueSnapshot, ValueWrite};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{DeviceId, DeviceKey, EntryId, Mac, UserId};

/// A registered device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Store-assigned identifier.
    pub id: DeviceId,
    /// Hardware address, unique among non-deleted devices.
    pub mac: Mac,
    /// Secret issued at registration.
    pub key: DeviceKey,
    /// Hardware type reported at registration.
    pub device_type: u32,
    /// Human-readable name of the hardware type.
    #[serde(default)]
    pub title: String,
    /// Last known address of the device.
    pub ip: String,
    /// Liveness deadline, extended on every authenticated contact.
    pub online_until: Option<DateTime<Utc>>,
    /// Owning user, once the device has been claimed.
    pub owner: Option<UserId>,
    /// Soft-delete flag. Deleted devices are invisible to lookups.
    pub deleted: bool,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Returns true if the heartbeat deadline lies after `now`.
    #[must_use]
    pub fn is_online_at(&self, now: DateTime<Utc>) -> bool {
        self.online_until.is_some_and(|until| until > now)
    }
}

/// Fields of a device about to be inserted.
#[derive(Debug, Clone)]
pub struct NewDevice {
    /// Hardware address.
    pub mac: Mac,
    /// Secret key.
    pub key: DeviceKey,
    /// Hardware type.
    pub device_type: u32,
    /// Name of the hardware type.
    pub title: String,
    /// Address the registration came from.
    pub ip: String,
}

/// One stored value of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueEntry {
    /// Store-assigned identifier.
    pub id: EntryId,
    /// Owning device.
    pub device: DeviceId,
    /// Key name, e.g. `color`.
    pub title: String,
    /// String-encoded payload.
    pub raw_value: String,
    /// Whether writes to this key append instead of overwriting.
    /// Fixed by the first write of the key.
    pub history_enabled: bool,
    /// Creation time. Overwrites keep the original time.
    pub created_at: DateTime<Utc>,
}

/// A value about to be stored.
#[derive(Debug, Clone)]
pub struct NewValueEntry {
    /// Owning device.
    pub device: DeviceId,
    /// Key name.
    pub title: String,
    /// String-encoded payload.
    pub raw_value: String,
    /// History policy, used only if the key has no entry yet.
    pub history_enabled: bool,
}

/// Abstract record store holding devices and their value entries.
///
/// Implementations must be safe to share between request handlers, and
/// every method must be atomic with respect to the others: request
/// handlers never read a record and write it back as a whole.
/// Lookups never return soft-deleted devices.
pub trait RecordStore: Send + Sync {
    /// Inserts a device and assigns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MacTaken`] if a non-deleted device already uses
    /// the mac.
    fn insert_device(&self, new: NewDevice) -> Result<Device, StoreError>;

    /// Returns the non-deleted device with the given id.
    fn device(&self, id: DeviceId) -> Option<Device>;

    /// Returns the non-deleted device with the given mac.
    fn device_by_mac(&self, mac: &Mac) -> Option<Device>;

    /// Returns the non-deleted devices owned by `owner`, ordered by id.
    fn devices_owned_by(&self, owner: UserId) -> Vec<Device>;

    /// Applies `apply` to a non-deleted device in place and returns the
    /// result.
    ///
    /// `apply` runs once, while no other writer can touch the record, so it
    /// should change only the fields it owns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`] if the device does not exist
    /// or is deleted.
    fn update_device(
        &self,
        id: DeviceId,
        apply: &mut dyn FnMut(&mut Device),
    ) -> Result<Device, StoreError>;

    /// Returns every value entry of a device ordered by creation time.
    fn entries(&self, device: DeviceId) -> Vec<ValueEntry>;

    /// Stores a value under the history policy of its key.
    ///
    /// If the key already has an entry, its policy wins: a history key gets
    /// a new entry appended and any other key is overwritten in place. A
    /// key without entries is created with `new.history_enabled`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`] if the device does not exist
    /// or is deleted.
    fn put_entry(&self, new: NewValueEntry) -> Result<ValueEntry, StoreError>;
}

#[cfg(test)]
pub(crate) mod interleave;
