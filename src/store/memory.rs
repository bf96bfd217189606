// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process record store with JSON snapshots.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{Device, NewDevice, NewValueEntry, RecordStore, ValueEntry};
use crate::error::StoreError;
use crate::types::{DeviceId, EntryId, Mac, UserId};

/// Record store keeping all tables in memory.
///
/// Ids are allocated sequentially starting at 1. The whole store can be
/// written to and restored from a JSON snapshot, which is how the server
/// binary survives restarts.
///
/// # Thread Safety
///
/// All tables sit behind a single `parking_lot::RwLock`; every trait method
/// takes the lock once, so each operation is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    devices: BTreeMap<DeviceId, Device>,
    /// Entries per device, in insertion order.
    entries: BTreeMap<DeviceId, Vec<ValueEntry>>,
    next_device: u64,
    next_entry: u64,
}

/// On-disk form of a [`MemoryStore`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    devices: Vec<Device>,
    entries: Vec<ValueEntry>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from a snapshot file.
    ///
    /// A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_snapshot(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(Self::new());
        }

        let contents = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;
        tracing::info!(
            path = %path.display(),
            devices = snapshot.devices.len(),
            entries = snapshot.entries.len(),
            "Loaded snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Writes the whole store to a snapshot file, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = {
            let tables = self.tables.read();
            Snapshot {
                devices: tables.devices.values().cloned().collect(),
                entries: tables.entries.values().flatten().cloned().collect(),
            }
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, contents)?;

        tracing::info!(path = %path.display(), "Saved snapshot");
        Ok(())
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut tables = Tables::default();

        for device in snapshot.devices {
            tables.next_device = tables.next_device.max(device.id.value());
            tables.devices.insert(device.id, device);
        }
        for entry in snapshot.entries {
            tables.next_entry = tables.next_entry.max(entry.id.value());
            tables.entries.entry(entry.device).or_default().push(entry);
        }
        for entries in tables.entries.values_mut() {
            entries.sort_by_key(|e| e.id);
        }

        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Returns the number of device records, deleted ones included.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.tables.read().devices.len()
    }
}

impl RecordStore for MemoryStore {
    fn insert_device(&self, new: NewDevice) -> Result<Device, StoreError> {
        let mut tables = self.tables.write();

        if tables
            .devices
            .values()
            .any(|d| !d.deleted && d.mac == new.mac)
        {
            return Err(StoreError::MacTaken(new.mac));
        }

        tables.next_device += 1;
        let device = Device {
            id: DeviceId::new(tables.next_device),
            mac: new.mac,
            key: new.key,
            device_type: new.device_type,
            title: new.title,
            ip: new.ip,
            online_until: None,
            owner: None,
            deleted: false,
            created_at: Utc::now(),
        };
        tables.devices.insert(device.id, device.clone());
        Ok(device)
    }

    fn device(&self, id: DeviceId) -> Option<Device> {
        self.tables
            .read()
            .devices
            .get(&id)
            .filter(|d| !d.deleted)
            .cloned()
    }

    fn device_by_mac(&self, mac: &Mac) -> Option<Device> {
        self.tables
            .read()
            .devices
            .values()
            .find(|d| !d.deleted && &d.mac == mac)
            .cloned()
    }

    fn devices_owned_by(&self, owner: UserId) -> Vec<Device> {
        self.tables
            .read()
            .devices
            .values()
            .filter(|d| !d.deleted && d.owner == Some(owner))
            .cloned()
            .collect()
    }

    fn update_device(
        &self,
        id: DeviceId,
        apply: &mut dyn FnMut(&mut Device),
    ) -> Result<Device, StoreError> {
        let mut tables = self.tables.write();
        let device = tables
            .devices
            .get_mut(&id)
            .filter(|d| !d.deleted)
            .ok_or(StoreError::DeviceNotFound)?;
        apply(device);
        Ok(device.clone())
    }

    fn entries(&self, device: DeviceId) -> Vec<ValueEntry> {
        let mut entries = self
            .tables
            .read()
            .entries
            .get(&device)
            .cloned()
            .unwrap_or_default();
        // Stable sort: entries created in the same instant keep id order.
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    fn put_entry(&self, new: NewValueEntry) -> Result<ValueEntry, StoreError> {
        let mut tables = self.tables.write();
        if !tables.devices.get(&new.device).is_some_and(|d| !d.deleted) {
            return Err(StoreError::DeviceNotFound);
        }

        let existing = tables
            .entries
            .get_mut(&new.device)
            .and_then(|entries| entries.iter_mut().find(|e| e.title == new.title));
        let history_enabled = match existing {
            Some(entry) if !entry.history_enabled => {
                entry.raw_value = new.raw_value;
                return Ok(entry.clone());
            }
            Some(_) => true,
            None => new.history_enabled,
        };

        tables.next_entry += 1;
        let entry = ValueEntry {
            id: EntryId::new(tables.next_entry),
            device: new.device,
            title: new.title,
            raw_value: new.raw_value,
            history_enabled,
            created_at: Utc::now(),
        };
        tables
            .entries
            .entry(entry.device)
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }
}
