// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The waiting side of a long-poll request.

use std::time::Duration;

use tokio::sync::oneshot;

use super::{Notification, SubjectId, SubscriptionRegistry, WaiterId};
use crate::types::RequestId;

/// How a long-poll wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A notification was delivered.
    Notified(Notification),
    /// The timeout elapsed first; the waiter has been removed.
    TimedOut,
    /// The waiter was taken by a notifier that never resolved it.
    Abandoned,
}

impl WaitOutcome {
    /// Returns the payload to answer the request with.
    ///
    /// Anything other than a delivered notification answers with
    /// [`Notification::NoUpdate`].
    #[must_use]
    pub fn into_notification(self) -> Notification {
        match self {
            Self::Notified(notification) => notification,
            Self::TimedOut | Self::Abandoned => Notification::NoUpdate,
        }
    }
}

/// A registered waiter, returned by [`SubscriptionRegistry::connect`].
///
/// Dropping a `LongPoll` before it resolves removes the waiter from the
/// registry. Request handlers rely on this: when the client disconnects, the
/// server drops the handler future and with it the guard.
#[derive(Debug)]
pub struct LongPoll<K: SubjectId> {
    registry: SubscriptionRegistry<K>,
    subject: K,
    id: WaiterId,
    request_id: RequestId,
    receiver: oneshot::Receiver<Notification>,
}

impl<K: SubjectId> LongPoll<K> {
    pub(super) fn new(
        registry: SubscriptionRegistry<K>,
        subject: K,
        id: WaiterId,
        request_id: RequestId,
        receiver: oneshot::Receiver<Notification>,
    ) -> Self {
        Self {
            registry,
            subject,
            id,
            request_id,
            receiver,
        }
    }

    /// Returns the subject this waiter is registered under.
    #[must_use]
    pub fn subject(&self) -> K {
        self.subject
    }

    /// Returns the registry-assigned waiter id.
    #[must_use]
    pub fn id(&self) -> WaiterId {
        self.id
    }

    /// Returns the client-side request id.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Suspends until notified or until `timeout` elapses.
    ///
    /// `None` waits without bound.
    pub async fn wait(mut self, timeout: Option<Duration>) -> WaitOutcome {
        let received = match timeout {
            Some(limit) => {
                if let Ok(received) = tokio::time::timeout(limit, &mut self.receiver).await {
                    received
                } else {
                    self.registry.remove(self.subject, self.id);
                    tracing::debug!(
                        scope = self.registry.scope(),
                        subject = %self.subject,
                        request_id = %self.request_id,
                        "Long-poll timed out"
                    );
                    // A notifier may have taken the waiter just before the removal.
                    return match self.receiver.try_recv() {
                        Ok(notification) => WaitOutcome::Notified(notification),
                        Err(_) => WaitOutcome::TimedOut,
                    };
                }
            }
            None => (&mut self.receiver).await,
        };

        match received {
            Ok(notification) => WaitOutcome::Notified(notification),
            Err(_) => WaitOutcome::Abandoned,
        }
    }
}

impl<K: SubjectId> Drop for LongPoll<K> {
    fn drop(&mut self) {
        if self.registry.remove(self.subject, self.id) {
            tracing::debug!(
                scope = self.registry.scope(),
                subject = %self.subject,
                request_id = %self.request_id,
                "Long-poll dropped before delivery"
            );
        }
    }
}
