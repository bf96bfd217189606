// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Waiter bookkeeping keyed by subject id.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::{LongPoll, Notification};
use crate::types::{DeviceId, RequestId, UserId};

/// Identity a waiter is registered under.
pub trait SubjectId: Copy + Eq + Hash + fmt::Display + Send + 'static {}

impl SubjectId for DeviceId {}
impl SubjectId for UserId {}

/// Registry-assigned identifier of a single waiter.
///
/// Unlike a [`RequestId`], which the client may reuse, a `WaiterId` is
/// unique for the lifetime of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

impl WaiterId {
    /// Returns the raw value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Waiter({})", self.0)
    }
}

struct Waiter {
    id: WaiterId,
    request_id: RequestId,
    connected_at: DateTime<Utc>,
    sender: oneshot::Sender<Notification>,
}

/// Diagnostic view of a registered waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaiterInfo<K> {
    /// Subject the waiter is registered under.
    pub subject: K,
    /// Registry-assigned id.
    pub waiter_id: WaiterId,
    /// Client-side request id.
    pub request_id: RequestId,
    /// Registration time.
    pub connected_at: DateTime<Utc>,
}

/// A waiter removed from the registry by [`SubscriptionRegistry::notify`].
///
/// Resolving it delivers the payload to the suspended request. Dropping it
/// unresolved ends the request without a payload.
#[derive(Debug)]
pub struct PendingWaiter<K> {
    subject: K,
    request_id: RequestId,
    sender: oneshot::Sender<Notification>,
}

impl<K: SubjectId> PendingWaiter<K> {
    /// Returns the subject the waiter was registered under.
    #[must_use]
    pub fn subject(&self) -> K {
        self.subject
    }

    /// Returns the client-side request id.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Delivers `notification` to the waiting request.
    ///
    /// Returns `false` if the request already went away.
    pub fn resolve(self, notification: Notification) -> bool {
        self.sender.send(notification).is_ok()
    }
}

/// Registry of long-poll waiters keyed by subject id.
///
/// Lookup by subject is a hash map access; several waiters may coexist for
/// the same subject (one per browser tab, for instance).
///
/// # Delivery discipline
///
/// [`notify`](Self::notify) removes the subject's waiters and hands them to
/// the caller in one critical section. A waiter is therefore delivered at
/// most once, and a later [`disconnect`](Self::disconnect) for it is a
/// harmless no-op. Waiters connected after the snapshot are not part of it.
///
/// # Thread Safety
///
/// One `parking_lot::Mutex` per registry guards all mutation. Cloning is
/// cheap and clones share the same waiters.
pub struct SubscriptionRegistry<K: SubjectId> {
    scope: &'static str,
    waiters: Arc<Mutex<HashMap<K, Vec<Waiter>>>>,
    next_id: Arc<AtomicU64>,
}

impl<K: SubjectId> SubscriptionRegistry<K> {
    /// Creates an empty registry. `scope` labels log events.
    #[must_use]
    pub fn new(scope: &'static str) -> Self {
        Self {
            scope,
            waiters: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Returns the scope label.
    #[must_use]
    pub fn scope(&self) -> &'static str {
        self.scope
    }

    /// Registers a waiter for `subject`.
    ///
    /// Never fails. The returned [`LongPoll`] is the waiting side; dropping
    /// it before a notification unregisters the waiter.
    pub fn connect(&self, subject: K, request_id: RequestId) -> LongPoll<K> {
        let (sender, receiver) = oneshot::channel();
        let id = WaiterId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let count = {
            let mut waiters = self.waiters.lock();
            let list = waiters.entry(subject).or_default();
            list.push(Waiter {
                id,
                request_id: request_id.clone(),
                connected_at: Utc::now(),
                sender,
            });
            list.len()
        };

        tracing::debug!(
            scope = self.scope,
            %subject,
            request_id = %request_id,
            waiters = count,
            "Waiter connected"
        );
        LongPoll::new(self.clone(), subject, id, request_id, receiver)
    }

    /// Removes the waiters of `subject` carrying `request_id` without
    /// delivering anything.
    ///
    /// Returns `true` if a waiter was removed. Calling it for a waiter that
    /// is already gone is a no-op.
    pub fn disconnect(&self, subject: K, request_id: &RequestId) -> bool {
        let removed = self.remove_where(subject, |w| &w.request_id == request_id);
        if removed {
            tracing::debug!(
                scope = self.scope,
                %subject,
                request_id = %request_id,
                "Waiter disconnected"
            );
        }
        removed
    }

    /// Removes one waiter by its registry id.
    pub(crate) fn remove(&self, subject: K, id: WaiterId) -> bool {
        self.remove_where(subject, |w| w.id == id)
    }

    fn remove_where(&self, subject: K, pred: impl Fn(&Waiter) -> bool) -> bool {
        let mut waiters = self.waiters.lock();
        let Some(list) = waiters.get_mut(&subject) else {
            return false;
        };
        let before = list.len();
        list.retain(|w| !pred(w));
        let removed = list.len() != before;
        if list.is_empty() {
            waiters.remove(&subject);
        }
        removed
    }

    /// Takes every waiter currently registered under `subject`.
    ///
    /// The waiters leave the registry; the caller resolves each one.
    #[must_use]
    pub fn notify(&self, subject: K) -> Vec<PendingWaiter<K>> {
        let taken = self.waiters.lock().remove(&subject).unwrap_or_default();
        tracing::debug!(
            scope = self.scope,
            %subject,
            waiters = taken.len(),
            "Notifying waiters"
        );
        taken
            .into_iter()
            .map(|w| PendingWaiter {
                subject,
                request_id: w.request_id,
                sender: w.sender,
            })
            .collect()
    }

    /// Takes every waiter of every subject.
    #[must_use]
    pub fn drain(&self) -> Vec<PendingWaiter<K>> {
        let taken = std::mem::take(&mut *self.waiters.lock());
        taken
            .into_iter()
            .flat_map(|(subject, list)| {
                list.into_iter().map(move |w| PendingWaiter {
                    subject,
                    request_id: w.request_id,
                    sender: w.sender,
                })
            })
            .collect()
    }

    /// Returns a snapshot of every registered waiter.
    #[must_use]
    pub fn lookup_all(&self) -> Vec<WaiterInfo<K>> {
        self.waiters
            .lock()
            .iter()
            .flat_map(|(subject, list)| {
                list.iter().map(|w| WaiterInfo {
                    subject: *subject,
                    waiter_id: w.id,
                    request_id: w.request_id.clone(),
                    connected_at: w.connected_at,
                })
            })
            .collect()
    }

    /// Returns the number of registered waiters.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().values().map(Vec::len).sum()
    }

    /// Returns the number of waiters registered under `subject`.
    #[must_use]
    pub fn waiters_for(&self, subject: K) -> usize {
        self.waiters.lock().get(&subject).map_or(0, Vec::len)
    }
}

impl<K: SubjectId> Clone for SubscriptionRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope,
            waiters: Arc::clone(&self.waiters),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<K: SubjectId> fmt::Debug for SubscriptionRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("scope", &self.scope)
            .field("waiters", &self.waiter_count())
            .finish()
    }
}
