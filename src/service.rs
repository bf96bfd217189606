// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Composition root of the synchronization subsystem.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::codec;
use crate::config::SyncConfig;
use crate::error::{Error, Result, StoreError};
use crate::heartbeat::HeartbeatTracker;
use crate::notify::{Delivery, NotificationBus};
use crate::registry::WaitOutcome;
use crate::store::{
    Device, DeviceValueStore, MemoryStore, NewDevice, RecordStore, ValueMap, ValueSnapshot,
    ValueWrite,
};
use crate::types::{DeviceId, DeviceKey, Mac, RequestId, UserId};

/// First-contact provisioning request of a device.
///
/// # Examples
///
/// ```
/// use homepoll::service::Registration;
/// use homepoll::types::Mac;
///
/// let registration = Registration::new(Mac::new("aa:bb:cc").unwrap(), "10.0.0.2", 1)
///     .with_value("color", "255,0,0,255", false)
///     .with_value("temp", "21.5,40", true);
/// assert_eq!(registration.values.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Registration {
    /// Hardware address.
    pub mac: Mac,
    /// Address the device contacted the server from.
    pub ip: String,
    /// Hardware type.
    pub device_type: u32,
    /// Initial values, each carrying its history policy.
    pub values: Vec<ValueWrite>,
}

impl Registration {
    /// Creates a registration without initial values.
    #[must_use]
    pub fn new(mac: Mac, ip: impl Into<String>, device_type: u32) -> Self {
        Self {
            mac,
            ip: ip.into(),
            device_type,
            values: Vec::new(),
        }
    }

    /// Adds an initial value.
    #[must_use]
    pub fn with_value(
        mut self,
        title: impl Into<String>,
        raw_value: impl Into<String>,
        history: bool,
    ) -> Self {
        self.values
            .push(ValueWrite::new(title, raw_value).with_history(history));
        self
    }
}

/// Credentials echoed back after a successful device authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCredentials {
    /// Normalized hardware address.
    pub mac: Mac,
    /// Secret key.
    pub key: DeviceKey,
}

/// A device as listed on its owner's dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDevice {
    /// Device id.
    pub id: DeviceId,
    /// Hardware address.
    pub mac: Mac,
    /// Hardware type.
    pub device_type: u32,
    /// Name of the hardware type.
    pub title: String,
    /// Whether the heartbeat deadline lies in the future.
    pub online: bool,
    /// Heartbeat deadline.
    pub online_until: Option<DateTime<Utc>>,
    /// Decoded values.
    pub values: ValueMap,
}

/// Who a long-poll request waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    /// A device waiting for commands addressed to it.
    Device(DeviceId),
    /// A user dashboard waiting for changes on any owned device.
    User(UserId),
}

/// Number of registered waiters per scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WaiterCounts {
    /// Waiters in the device scope.
    pub device: usize,
    /// Waiters in the user scope.
    pub user: usize,
}

/// Device synchronization service.
///
/// Owns the record store, the value store, both long-poll registries and
/// the heartbeat tracker. Request handlers receive it explicitly; there is
/// no process-wide state.
///
/// # Examples
///
/// ```
/// use homepoll::{DeviceSync, SyncConfig};
/// use homepoll::service::Registration;
/// use homepoll::store::ValueWrite;
/// use homepoll::types::Mac;
///
/// # fn main() -> homepoll::Result<()> {
/// let sync = DeviceSync::in_memory(SyncConfig::default());
///
/// let mac = Mac::new("aa:bb:cc")?;
/// let key = sync.register_device(
///     Registration::new(mac.clone(), "10.0.0.2", 1).with_value("color", "0,0,0,255", false),
/// )?;
///
/// let device = sync.identify_device(&mac, key.as_str())?;
/// sync.write_values(device.id, &[ValueWrite::new("color", "255,0,0,255")])?;
/// # Ok(())
/// # }
/// ```
pub struct DeviceSync {
    records: Arc<dyn RecordStore>,
    values: DeviceValueStore,
    bus: NotificationBus,
    heartbeat: HeartbeatTracker,
    config: SyncConfig,
}

impl DeviceSync {
    /// Creates the service on top of a record store.
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>, config: SyncConfig) -> Self {
        Self {
            values: DeviceValueStore::new(Arc::clone(&records)),
            heartbeat: HeartbeatTracker::new(Arc::clone(&records), config.heartbeat_ttl),
            bus: NotificationBus::new(),
            records,
            config,
        }
    }

    /// Creates the service on top of a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory(config: SyncConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the value store.
    #[must_use]
    pub fn values(&self) -> &DeviceValueStore {
        &self.values
    }

    /// Returns the notification bus.
    #[must_use]
    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Returns the heartbeat tracker.
    #[must_use]
    pub fn heartbeat(&self) -> &HeartbeatTracker {
        &self.heartbeat
    }

    /// Returns the number of registered waiters per scope.
    #[must_use]
    pub fn waiter_counts(&self) -> WaiterCounts {
        WaiterCounts {
            device: self.bus.devices().lookup_all().len(),
            user: self.bus.users().lookup_all().len(),
        }
    }

    // =========================================================================
    // Device lifecycle
    // =========================================================================

    /// Registers a new device and seeds its initial values.
    ///
    /// Registration counts as a device contact, so the device starts out
    /// online. Returns the freshly minted key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] if the ip is empty,
    /// [`Error::DeviceAuthorized`] if a non-deleted device already uses the
    /// mac, and a value error if an initial value does not decode.
    pub fn register_device(&self, registration: Registration) -> Result<DeviceKey> {
        let Registration {
            mac,
            ip,
            device_type,
            values,
        } = registration;

        if ip.trim().is_empty() {
            return Err(Error::bad_request("missing ip"));
        }
        // Validate before inserting so a bad value leaves no device behind.
        for write in &values {
            codec::canonicalize(&write.title, &write.raw_value)?;
        }

        let key = DeviceKey::generate();
        let device = self
            .records
            .insert_device(NewDevice {
                mac,
                key: key.clone(),
                device_type,
                title: self.config.device_type_title(device_type),
                ip,
            })
            .map_err(|e| match e {
                StoreError::MacTaken(_) => Error::DeviceAuthorized,
                other => other.into(),
            })?;

        if !values.is_empty() {
            self.values.write_batch(device.id, &values)?;
        }
        self.heartbeat.touch(device.id)?;

        tracing::info!(
            device_id = %device.id,
            mac = %device.mac,
            device_type,
            values = values.len(),
            "Device registered"
        );
        Ok(key)
    }

    /// Re-validates a device at startup, records its address and extends
    /// its heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnauthorized`] if no non-deleted device has
    /// this `(mac, key)` pair.
    pub fn authorize_device(&self, mac: &Mac, key: &str, ip: &str) -> Result<DeviceCredentials> {
        let device = self.authenticate(mac, key)?;
        self.records
            .update_device(device.id, &mut |record| record.ip = ip.to_string())
            .map_err(|_| Error::DeviceUnauthorized)?;
        self.touch(device.id)?;

        tracing::info!(device_id = %device.id, %mac, ip, "Device authorized");
        Ok(DeviceCredentials {
            mac: device.mac,
            key: device.key,
        })
    }

    /// Resolves a device from its `(mac, key)` pair and extends its
    /// heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnauthorized`] if no non-deleted device has
    /// this pair.
    pub fn identify_device(&self, mac: &Mac, key: &str) -> Result<Device> {
        let mut device = self.authenticate(mac, key)?;
        device.online_until = Some(self.touch(device.id)?);
        Ok(device)
    }

    /// Extends the heartbeat of an authenticated device. A device deleted
    /// since it was authenticated is no longer authorized.
    fn touch(&self, device: DeviceId) -> Result<DateTime<Utc>> {
        self.heartbeat.touch(device).map_err(|e| match e {
            Error::Store(StoreError::DeviceNotFound) => Error::DeviceUnauthorized,
            other => other,
        })
    }

    fn authenticate(&self, mac: &Mac, key: &str) -> Result<Device> {
        self.records
            .device_by_mac(mac)
            .filter(|device| device.key.matches(key))
            .ok_or_else(|| {
                tracing::debug!(%mac, "Device credentials rejected");
                Error::DeviceUnauthorized
            })
    }

    // =========================================================================
    // Ownership
    // =========================================================================

    /// Attaches a device to a user.
    ///
    /// Claiming a device the user already owns succeeds again. The user's
    /// long-poll waiters are notified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnauthorized`] on a credential mismatch and
    /// [`Error::BadRequest`] if another user owns the device.
    pub fn claim_device(&self, user: UserId, mac: &Mac, key: &str) -> Result<Device> {
        let device = self.authenticate(mac, key)?;

        let mut claimed = false;
        let device = self
            .records
            .update_device(device.id, &mut |record| {
                if record.owner.is_none() {
                    record.owner = Some(user);
                    claimed = true;
                }
            })
            .map_err(|_| Error::DeviceUnauthorized)?;
        if device.owner != Some(user) {
            return Err(Error::bad_request("device already has an owner"));
        }
        if !claimed {
            return Ok(device);
        }

        self.bus.publish_update(device.id, device.owner);

        tracing::info!(device_id = %device.id, %user, "Device claimed");
        Ok(device)
    }

    /// Soft-deletes a device owned by `user`.
    ///
    /// Pending device waits end without an update; the owner's waiters are
    /// notified.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`] if the user owns no device
    /// with this mac.
    pub fn release_device(&self, user: UserId, mac: &Mac) -> Result<()> {
        let device = self
            .records
            .device_by_mac(mac)
            .filter(|device| device.owner == Some(user))
            .ok_or(StoreError::DeviceNotFound)?;

        let mut released = false;
        self.records.update_device(device.id, &mut |record| {
            if record.owner == Some(user) {
                record.deleted = true;
                released = true;
            }
        })?;
        if !released {
            return Err(StoreError::DeviceNotFound.into());
        }
        self.bus.publish_removal(device.id, Some(user));

        tracing::info!(device_id = %device.id, %user, "Device released");
        Ok(())
    }

    /// Returns the user's device with the given mac, or the user's first
    /// device when no mac is given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnauthorized`] if the user does not own the
    /// requested device and [`Error::BadRequest`] if the user owns none.
    pub fn device_for_user(&self, user: UserId, mac: Option<&Mac>) -> Result<Device> {
        let owned = self.records.devices_owned_by(user);
        match mac {
            Some(mac) => owned
                .into_iter()
                .find(|device| &device.mac == mac)
                .ok_or(Error::DeviceUnauthorized),
            None => owned
                .into_iter()
                .next()
                .ok_or_else(|| Error::bad_request("user has no devices")),
        }
    }

    /// Lists every device owned by `user` with its decoded values.
    ///
    /// # Errors
    ///
    /// Returns a value error if a stored composite value does not decode.
    pub fn user_devices(&self, user: UserId) -> Result<Vec<UserDevice>> {
        let now = Utc::now();
        self.records
            .devices_owned_by(user)
            .into_iter()
            .map(|device| -> Result<UserDevice> {
                Ok(UserDevice {
                    values: self.values.read_all(device.id)?,
                    online: device.is_online_at(now),
                    id: device.id,
                    mac: device.mac,
                    device_type: device.device_type,
                    title: device.title,
                    online_until: device.online_until,
                })
            })
            .collect()
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Returns all decoded values of a device.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`] if the device does not exist.
    pub fn read_values(&self, device: DeviceId) -> Result<ValueMap> {
        self.values.read_all(device)
    }

    /// Returns the decoded view or history of one key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`] or [`StoreError::InvalidKey`].
    pub fn read_value(&self, device: DeviceId, title: &str) -> Result<ValueSnapshot> {
        self.values.read_key(device, title)
    }

    /// Applies a batch of writes and notifies the device's waiters and its
    /// owner's waiters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`] if the device does not exist,
    /// or any error of [`DeviceValueStore::write_batch`]. Nothing is
    /// published when the batch fails validation.
    pub fn write_values(&self, device: DeviceId, writes: &[ValueWrite]) -> Result<Delivery> {
        let record = self
            .records
            .device(device)
            .ok_or(StoreError::DeviceNotFound)?;
        self.values.write_batch(device, writes)?;
        Ok(self.bus.publish_update(device, record.owner))
    }

    // =========================================================================
    // Long-poll
    // =========================================================================

    /// Waits for the next change of `subject`, bounded by the configured
    /// long-poll timeout.
    ///
    /// The waiter is registered when the returned future is first polled
    /// and unregistered when it completes or is dropped.
    pub async fn long_poll(&self, subject: Subject, request_id: RequestId) -> WaitOutcome {
        let timeout = self.config.longpoll_timeout;
        match subject {
            Subject::Device(device) => {
                self.bus
                    .devices()
                    .connect(device, request_id)
                    .wait(timeout)
                    .await
            }
            Subject::User(user) => self.bus.users().connect(user, request_id).wait(timeout).await,
        }
    }
}

impl std::fmt::Debug for DeviceSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSync")
            .field("bus", &self.bus)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
