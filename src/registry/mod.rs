// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Long-poll subscription registry.
//!
//! A long-poll request registers a waiter under a *subject id* and suspends
//! until it is notified, its client goes away, or a timeout elapses. Two
//! independent registries exist per process: one keyed by [`DeviceId`]
//! (devices waiting for commands) and one keyed by [`UserId`] (dashboards
//! waiting for live updates).
//!
//! # Overview
//!
//! - [`SubscriptionRegistry`] - Map from subject id to its active waiters
//! - [`LongPoll`] - The waiting side, returned by `connect`; dropping it
//!   unregisters the waiter
//! - [`PendingWaiter`] - A waiter taken out of the registry by `notify`,
//!   ready to be resolved with a payload
//! - [`Notification`] - The payload a long-poll request answers with
//!
//! The registry is content-agnostic: it answers "who is waiting for subject
//! X", never "what changed". The caller of `notify` builds the payload.
//!
//! # Examples
//!
//! ```
//! use homepoll::registry::{Notification, SubscriptionRegistry, WaitOutcome};
//! use homepoll::types::{DeviceId, RequestId};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = SubscriptionRegistry::<DeviceId>::new("device");
//! let waiter = registry.connect(DeviceId::new(5), RequestId::random());
//!
//! for pending in registry.notify(DeviceId::new(5)) {
//!     pending.resolve(Notification::Update);
//! }
//!
//! assert_eq!(waiter.wait(None).await, WaitOutcome::Notified(Notification::Update));
//! # }
//! ```
//!
//! [`DeviceId`]: crate::types::DeviceId
//! [`UserId`]: crate::types::UserId

mod long_poll;
mod subscription;

pub use long_poll::{LongPoll, WaitOutcome};
pub use subscription::{PendingWaiter, SubjectId, SubscriptionRegistry, WaiterId, WaiterInfo};

use serde::{Deserialize, Serialize};

/// Payload a long-poll request is answered with.
///
/// Serializes as `{"event": "update"}` or `{"event": "none"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Notification {
    /// State of the subject changed; the client should re-read.
    Update,
    /// The wait ended without a change.
    #[serde(rename = "none")]
    NoUpdate,
}
