// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded views of composite device values.

use serde::{Deserialize, Serialize};

/// Key family a value title belongs to.
///
/// The family decides how the raw string is decoded. Titles are matched
/// exactly; anything that is not a known family is an opaque key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKey {
    /// `color`: `"r,g,b,a"`.
    Color,
    /// `effect`: `"effect,a"`.
    Effect,
    /// `temp`: `"temp,hud"`.
    Temp,
    /// Any other title; the raw string is the value.
    Other,
}

impl ValueKey {
    /// Title of the color key.
    pub const COLOR: &'static str = "color";
    /// Title of the effect key.
    pub const EFFECT: &'static str = "effect";
    /// Title of the temperature key.
    pub const TEMP: &'static str = "temp";

    /// Returns the family of `title`.
    #[must_use]
    pub fn of(title: &str) -> Self {
        match title {
            Self::COLOR => Self::Color,
            Self::EFFECT => Self::Effect,
            Self::TEMP => Self::Temp,
            _ => Self::Other,
        }
    }
}

/// RGBA color with 8-bit channels.
///
/// # Examples
///
/// ```
/// use homepoll::codec::ColorValue;
///
/// let red = ColorValue::new(255, 0, 0, 255);
/// assert_eq!(red.r, 255);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorValue {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha (brightness) channel.
    pub a: u8,
}

impl ColorValue {
    /// Creates a color from its four channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Light effect selection.
///
/// An effect number of `-1` means no effect is running; the plain color is
/// shown instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectValue {
    /// Effect number, or `-1` when inactive.
    pub effect: i32,
    /// Alpha (brightness) channel used while the effect runs.
    pub a: u8,
}

impl EffectValue {
    /// The inactive effect, stored as `"-1,0"`.
    pub const INACTIVE: Self = Self { effect: -1, a: 0 };

    /// Creates an effect value.
    #[must_use]
    pub const fn new(effect: i32, a: u8) -> Self {
        Self { effect, a }
    }

    /// Returns true if an effect is running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.effect != -1
    }
}

/// Temperature and humidity reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempValue {
    /// Temperature.
    pub temp: f64,
    /// Humidity.
    pub hud: f64,
}

impl TempValue {
    /// Creates a reading.
    #[must_use]
    pub const fn new(temp: f64, hud: f64) -> Self {
        Self { temp, hud }
    }
}

/// A decoded device value.
///
/// Serializes without a tag, so a color becomes `{"r":..,"g":..,"b":..,"a":..}`
/// and an opaque value stays a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    /// A color view.
    Color(ColorValue),
    /// An effect view. Also used for `color` while an effect is active.
    Effect(EffectValue),
    /// A temperature view.
    Temp(TempValue),
    /// An opaque value.
    Text(String),
}

impl DecodedValue {
    /// Returns the key family this value encodes to.
    #[must_use]
    pub const fn key(&self) -> ValueKey {
        match self {
            Self::Color(_) => ValueKey::Color,
            Self::Effect(_) => ValueKey::Effect,
            Self::Temp(_) => ValueKey::Temp,
            Self::Text(_) => ValueKey::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_titles_map_to_families() {
        assert_eq!(ValueKey::of("color"), ValueKey::Color);
        assert_eq!(ValueKey::of("effect"), ValueKey::Effect);
        assert_eq!(ValueKey::of("temp"), ValueKey::Temp);
        assert_eq!(ValueKey::of("Color"), ValueKey::Other);
        assert_eq!(ValueKey::of("mode"), ValueKey::Other);
    }

    #[test]
    fn inactive_effect() {
        assert!(!EffectValue::INACTIVE.is_active());
        assert!(EffectValue::new(0, 10).is_active());
    }

    #[test]
    fn decoded_values_serialize_untagged() {
        let color = DecodedValue::Color(ColorValue::new(1, 2, 3, 4));
        assert_eq!(
            serde_json::to_value(&color).unwrap(),
            serde_json::json!({"r": 1, "g": 2, "b": 3, "a": 4})
        );

        let text = DecodedValue::Text("auto".to_string());
        assert_eq!(serde_json::to_value(&text).unwrap(), serde_json::json!("auto"));
    }
}
