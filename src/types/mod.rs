// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identifier and credential types.
//!
//! # Types
//!
//! - [`DeviceId`] - Sequential id of a registered device
//! - [`UserId`] - Id of the user account owning devices
//! - [`EntryId`] - Sequential id of a stored value entry
//! - [`RequestId`] - Distinguishes concurrent long-poll requests
//! - [`Mac`] - Normalized hardware address
//! - [`DeviceKey`] - Secret minted at device registration

mod ids;
mod mac;

pub use ids::{DeviceId, EntryId, RequestId, UserId};
pub use mac::{DeviceKey, Mac};
