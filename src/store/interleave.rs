// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Record store wrapper that lets a test run a competing request between a
//! read and the write that follows it.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Device, MemoryStore, NewDevice, NewValueEntry, RecordStore, ValueEntry};
use crate::error::StoreError;
use crate::types::{DeviceId, Mac, UserId};

type Hook = Box<dyn FnOnce(&MemoryStore) + Send>;

/// Which kind of read triggers an armed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Read {
    /// Device record lookups.
    Device,
    /// Value entry listings.
    Entries,
}

/// Delegates to a [`MemoryStore`] and runs an armed hook once, right after
/// the next read of the chosen kind returns.
pub(crate) struct InterleavedStore {
    inner: Arc<MemoryStore>,
    hook: Mutex<Option<(Read, Hook)>>,
}

impl InterleavedStore {
    pub(crate) fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            hook: Mutex::new(None),
        }
    }

    /// Arms `hook` to run after the next read of kind `on`.
    pub(crate) fn after_next(
        &self,
        on: Read,
        hook: impl FnOnce(&MemoryStore) + Send + 'static,
    ) {
        *self.hook.lock() = Some((on, Box::new(hook)));
    }

    /// Returns true once the armed hook has run.
    pub(crate) fn hook_ran(&self) -> bool {
        self.hook.lock().is_none()
    }

    fn read<T>(&self, kind: Read, value: T) -> T {
        let hook = {
            let mut armed = self.hook.lock();
            match armed.take() {
                Some((on, hook)) if on == kind => Some(hook),
                other => {
                    *armed = other;
                    None
                }
            }
        };
        if let Some(hook) = hook {
            hook(&self.inner);
        }
        value
    }
}

impl RecordStore for InterleavedStore {
    fn insert_device(&self, new: NewDevice) -> Result<Device, StoreError> {
        self.inner.insert_device(new)
    }

    fn device(&self, id: DeviceId) -> Option<Device> {
        self.read(Read::Device, self.inner.device(id))
    }

    fn device_by_mac(&self, mac: &Mac) -> Option<Device> {
        self.read(Read::Device, self.inner.device_by_mac(mac))
    }

    fn devices_owned_by(&self, owner: UserId) -> Vec<Device> {
        self.read(Read::Device, self.inner.devices_owned_by(owner))
    }

    fn update_device(
        &self,
        id: DeviceId,
        apply: &mut dyn FnMut(&mut Device),
    ) -> Result<Device, StoreError> {
        self.inner.update_device(id, apply)
    }

    fn entries(&self, device: DeviceId) -> Vec<ValueEntry> {
        self.read(Read::Entries, self.inner.entries(device))
    }

    fn put_entry(&self, new: NewValueEntry) -> Result<ValueEntry, StoreError> {
        self.inner.put_entry(new)
    }
}
