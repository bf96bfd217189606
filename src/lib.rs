// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `homepoll` - Device state synchronization for home-automation controllers.
//!
//! Devices (lights, color strips, thermostats) and user dashboards talk to
//! the server over plain HTTP. Instead of polling repeatedly, a client can
//! *long-poll*: the request is held open until the state it cares about
//! changes, then answered with `{"event": "update"}`.
//!
//! # Components
//!
//! - [`codec`]: Encoding of composite values (`color`, `effect`, `temp`)
//! - [`store`]: Record store abstraction and the per-device value store,
//!   which applies history policy and the color/effect exclusion rule
//! - [`registry`]: Long-poll waiters keyed by device or user id
//! - [`notify`]: Fan-out of a change to the device's and owner's waiters
//! - [`heartbeat`]: Rolling "online until" deadline per device
//! - [`service`]: The [`DeviceSync`] composition root tying it together
//! - `server`: axum routes (feature `server`, enabled by default)
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use homepoll::{DeviceSync, SyncConfig};
//! use homepoll::registry::{Notification, WaitOutcome};
//! use homepoll::service::{Registration, Subject};
//! use homepoll::store::ValueWrite;
//! use homepoll::types::{Mac, RequestId};
//!
//! #[tokio::main]
//! async fn main() -> homepoll::Result<()> {
//!     let sync = Arc::new(DeviceSync::in_memory(SyncConfig::default()));
//!
//!     let mac = Mac::new("aa:bb:cc")?;
//!     let key = sync.register_device(
//!         Registration::new(mac.clone(), "10.0.0.2", 1).with_value("color", "0,0,0,255", false),
//!     )?;
//!     let device = sync.identify_device(&mac, key.as_str())?;
//!
//!     // The device long-polls for changes.
//!     let waiter = {
//!         let sync = Arc::clone(&sync);
//!         tokio::spawn(async move {
//!             sync.long_poll(Subject::Device(device.id), RequestId::random()).await
//!         })
//!     };
//!     while sync.waiter_counts().device == 0 {
//!         tokio::task::yield_now().await;
//!     }
//!
//!     sync.write_values(device.id, &[ValueWrite::new("color", "255,0,0,255")])?;
//!     assert_eq!(
//!         waiter.await.unwrap(),
//!         WaitOutcome::Notified(Notification::Update)
//!     );
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod notify;
pub mod registry;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod store;
pub mod types;

pub use config::SyncConfig;
pub use error::{Error, Result, StoreError, ValueError};
pub use notify::{Delivery, NotificationBus};
pub use registry::{Notification, SubscriptionRegistry, WaitOutcome};
pub use service::{DeviceSync, Subject};
pub use store::{DeviceValueStore, MemoryStore, RecordStore};
