// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device value store with history policy and derived views.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{NewValueEntry, RecordStore, ValueEntry};
use crate::codec::{self, DecodedValue, EffectValue, ValueKey};
use crate::error::{Result, StoreError};
use crate::types::DeviceId;

/// Current state of one key as exposed to readers.
///
/// Serializes as the decoded value itself, or as an array of
/// `{value, createdAt}` for history-enabled keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValueSnapshot {
    /// Single current value of a key without history.
    Current(DecodedValue),
    /// Every value ever written to a history-enabled key, oldest first.
    History(Vec<HistoryItem>),
}

/// One element of a key's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    /// Decoded value.
    pub value: DecodedValue,
    /// Time the value was written.
    pub created_at: DateTime<Utc>,
}

/// Decoded values of a device keyed by title.
pub type ValueMap = BTreeMap<String, ValueSnapshot>;

/// A single write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueWrite {
    /// Key name.
    pub title: String,
    /// String-encoded payload.
    pub raw_value: String,
    /// History policy to use if the key has never been written.
    /// Ignored for existing keys.
    pub history: Option<bool>,
}

impl ValueWrite {
    /// Creates a write request.
    #[must_use]
    pub fn new(title: impl Into<String>, raw_value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            raw_value: raw_value.into(),
            history: None,
        }
    }

    /// Sets the history policy used on the key's first write.
    #[must_use]
    pub fn with_history(mut self, enabled: bool) -> Self {
        self.history = Some(enabled);
        self
    }
}

/// Store of current and historical device values.
///
/// Wraps a [`RecordStore`] and keeps every value rule in one place:
///
/// - The history flag of a key is fixed by its first write. Keys with
///   history append a new entry per write; others hold exactly one entry
///   that is overwritten in place.
/// - Composite values (`color`, `effect`, `temp`) are validated on write and
///   stored in canonical form.
/// - Writing `color` deactivates the device's effect (`"-1,0"`), and on the
///   read side an active effect replaces the color view.
///
/// No values are cached; every call goes to the record store.
#[derive(Clone)]
pub struct DeviceValueStore {
    store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for DeviceValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceValueStore").finish_non_exhaustive()
    }
}

impl DeviceValueStore {
    /// Creates a value store on top of a record store.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Returns every entry of a device ordered by creation time.
    ///
    /// History-enabled keys contribute their full list, others one entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`] if the device does not exist.
    pub fn read(&self, device: DeviceId) -> Result<Vec<ValueEntry>> {
        if self.store.device(device).is_none() {
            return Err(StoreError::DeviceNotFound.into());
        }
        Ok(self.store.entries(device))
    }

    /// Returns the decoded view of one key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`] if the device does not exist and
    /// [`StoreError::InvalidKey`] if the key was never written.
    pub fn read_key(&self, device: DeviceId, title: &str) -> Result<ValueSnapshot> {
        let entries = self.read(device)?;
        if !entries.iter().any(|e| e.title == title) {
            return Err(StoreError::InvalidKey(title.to_string()).into());
        }
        project(&entries)?
            .remove(title)
            .ok_or_else(|| StoreError::InvalidKey(title.to_string()).into())
    }

    /// Returns the decoded views of all keys of a device.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`] if the device does not exist.
    pub fn read_all(&self, device: DeviceId) -> Result<ValueMap> {
        project(&self.read(device)?)
    }

    /// Writes one value.
    ///
    /// `history` decides the key's policy if it has never been written.
    ///
    /// # Errors
    ///
    /// See [`write_batch`](Self::write_batch).
    pub fn write(
        &self,
        device: DeviceId,
        title: &str,
        raw_value: &str,
        history: Option<bool>,
    ) -> Result<()> {
        self.write_batch(
            device,
            &[ValueWrite {
                title: title.to_string(),
                raw_value: raw_value.to_string(),
                history,
            }],
        )
    }

    /// Writes several values of one device.
    ///
    /// Every write is validated before any is applied. Writing `color`
    /// deactivates an existing `effect` entry, unless the same batch writes
    /// `effect` explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeviceNotFound`] if the device does not exist,
    /// [`StoreError::InvalidKey`] if a key was never written and carries no
    /// history policy, and [`ValueError::Malformed`](crate::error::ValueError)
    /// if a composite value does not decode.
    pub fn write_batch(&self, device: DeviceId, writes: &[ValueWrite]) -> Result<()> {
        // Policy of every key known so far. The record store re-checks the
        // policy under its own lock, so a concurrent first write of the same
        // key cannot create a second entry.
        let mut policies: HashMap<String, bool> = self
            .read(device)?
            .into_iter()
            .map(|entry| (entry.title, entry.history_enabled))
            .collect();

        let mut planned = Vec::with_capacity(writes.len() + 1);
        for write in writes {
            let raw = codec::canonicalize(&write.title, &write.raw_value)?;
            let history = match (policies.get(&write.title), write.history) {
                (Some(&known), _) => known,
                (None, Some(hint)) => hint,
                (None, None) => return Err(StoreError::InvalidKey(write.title.clone()).into()),
            };
            policies.insert(write.title.clone(), history);
            planned.push((write.title.clone(), raw, history));
        }

        let writes_color = planned.iter().any(|(t, _, _)| t == ValueKey::COLOR);
        let writes_effect = planned.iter().any(|(t, _, _)| t == ValueKey::EFFECT);
        if writes_color
            && !writes_effect
            && let Some(&history) = policies.get(ValueKey::EFFECT)
        {
            planned.push((
                ValueKey::EFFECT.to_string(),
                codec::encode(&DecodedValue::Effect(EffectValue::INACTIVE)),
                history,
            ));
        }

        for (title, raw_value, history_enabled) in planned {
            self.store.put_entry(NewValueEntry {
                device,
                title: title.clone(),
                raw_value,
                history_enabled,
            })?;
            tracing::debug!(%device, title = %title, "Wrote device value");
        }

        Ok(())
    }
}

/// Builds the reader-facing views from a device's ordered entries.
fn project(entries: &[ValueEntry]) -> Result<ValueMap> {
    let effect = entries
        .iter()
        .rev()
        .find(|e| e.title == ValueKey::EFFECT)
        .map(|e| codec::decode(&e.title, &e.raw_value))
        .transpose()?
        .and_then(|value| match value {
            DecodedValue::Effect(effect) => Some(effect),
            _ => None,
        });

    let mut map = ValueMap::new();
    for entry in entries {
        let value = match codec::decode(&entry.title, &entry.raw_value)? {
            DecodedValue::Color(color) => codec::color_view(color, effect),
            other => other,
        };

        if entry.history_enabled {
            let item = HistoryItem {
                value,
                created_at: entry.created_at,
            };
            // The history flag is fixed per key, so a key never mixes both shapes.
            if let ValueSnapshot::History(items) = map
                .entry(entry.title.clone())
                .or_insert_with(|| ValueSnapshot::History(Vec::new()))
            {
                items.push(item);
            }
        } else {
            map.insert(entry.title.clone(), ValueSnapshot::Current(value));
        }
    }
    Ok(map)
}
