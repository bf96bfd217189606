// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fan-out of change notifications to long-poll waiters.

use crate::registry::{Notification, PendingWaiter, SubjectId, SubscriptionRegistry};
use crate::types::{DeviceId, UserId};

/// Count of waiters resolved by a [`NotificationBus::publish_update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Waiters resolved in the device scope.
    pub device: usize,
    /// Waiters resolved in the user scope.
    pub user: usize,
}

impl Delivery {
    /// Returns the total number of waiters resolved.
    #[must_use]
    pub fn total(&self) -> usize {
        self.device + self.user
    }
}

/// Owns the device and user registries and notifies both after a change.
///
/// Cloning is cheap; clones share the same registries.
///
/// # Examples
///
/// ```
/// use homepoll::notify::NotificationBus;
/// use homepoll::types::{DeviceId, RequestId, UserId};
///
/// let bus = NotificationBus::new();
/// let _device = bus.devices().connect(DeviceId::new(1), RequestId::random());
/// let _user = bus.users().connect(UserId::new(7), RequestId::random());
///
/// let delivery = bus.publish_update(DeviceId::new(1), Some(UserId::new(7)));
/// assert_eq!(delivery.total(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct NotificationBus {
    devices: SubscriptionRegistry<DeviceId>,
    users: SubscriptionRegistry<UserId>,
}

impl NotificationBus {
    /// Creates a bus with two empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: SubscriptionRegistry::new("device"),
            users: SubscriptionRegistry::new("user"),
        }
    }

    /// Returns the registry of devices waiting for commands.
    #[must_use]
    pub fn devices(&self) -> &SubscriptionRegistry<DeviceId> {
        &self.devices
    }

    /// Returns the registry of users waiting for live updates.
    #[must_use]
    pub fn users(&self) -> &SubscriptionRegistry<UserId> {
        &self.users
    }

    /// Notifies every waiter of `device` and, if the device has an owner,
    /// every waiter of that user.
    ///
    /// Each waiter answers with [`Notification::Update`] exactly once. The
    /// device scope is resolved before the user scope.
    pub fn publish_update(&self, device: DeviceId, owner: Option<UserId>) -> Delivery {
        let delivery = Delivery {
            device: resolve_all(self.devices.notify(device), Notification::Update),
            user: owner.map_or(0, |user| {
                resolve_all(self.users.notify(user), Notification::Update)
            }),
        };
        tracing::debug!(
            %device,
            owner = ?owner.map(|u| u.value()),
            device_waiters = delivery.device,
            user_waiters = delivery.user,
            "Published update"
        );
        delivery
    }

    /// Ends the waits of a device that is going away.
    ///
    /// Device waiters answer with [`Notification::NoUpdate`]; the owner's
    /// waiters answer with [`Notification::Update`] since their device list
    /// changed.
    pub fn publish_removal(&self, device: DeviceId, owner: Option<UserId>) -> Delivery {
        let delivery = Delivery {
            device: resolve_all(self.devices.notify(device), Notification::NoUpdate),
            user: owner.map_or(0, |user| {
                resolve_all(self.users.notify(user), Notification::Update)
            }),
        };
        tracing::debug!(
            %device,
            device_waiters = delivery.device,
            user_waiters = delivery.user,
            "Published removal"
        );
        delivery
    }

    /// Ends every pending wait in both scopes with
    /// [`Notification::NoUpdate`].
    ///
    /// Used on shutdown so unbounded waits do not hold the server open.
    pub fn close_all(&self) -> Delivery {
        let delivery = Delivery {
            device: resolve_all(self.devices.drain(), Notification::NoUpdate),
            user: resolve_all(self.users.drain(), Notification::NoUpdate),
        };
        tracing::info!(
            device_waiters = delivery.device,
            user_waiters = delivery.user,
            "Closed all waiters"
        );
        delivery
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_all<K: SubjectId>(
    waiters: Vec<PendingWaiter<K>>,
    notification: Notification,
) -> usize {
    waiters
        .into_iter()
        .map(|waiter| waiter.resolve(notification))
        .filter(|delivered| *delivered)
        .count()
}
