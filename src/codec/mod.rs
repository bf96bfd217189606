// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Encoding and decoding of string-serialized device values.
//!
//! Every device value is stored as a string. A few titles carry composite
//! values with a fixed comma-separated layout:
//!
//! | Title    | Raw form      | Decoded view           |
//! |----------|---------------|------------------------|
//! | `color`  | `r,g,b,a`     | `{r, g, b, a}`         |
//! | `effect` | `effect,a`    | `{effect, a}`          |
//! | `temp`   | `temp,hud`    | `{temp, hud}`          |
//! | other    | anything      | the raw string         |
//!
//! [`encode`] is the exact inverse of [`decode`] for every family.
//!
//! # Color and effect
//!
//! A running effect replaces the color on the read side: [`color_view`]
//! returns the effect view while the device's effect is active. The write
//! side of the same rule lives in
//! [`DeviceValueStore::write`](crate::store::DeviceValueStore::write).
//!
//! # Examples
//!
//! ```
//! use homepoll::codec::{self, ColorValue, DecodedValue};
//!
//! let value = codec::decode("color", "255,0,0,255").unwrap();
//! assert_eq!(value, DecodedValue::Color(ColorValue::new(255, 0, 0, 255)));
//! assert_eq!(codec::encode(&value), "255,0,0,255");
//! ```

mod views;

pub use views::{ColorValue, DecodedValue, EffectValue, TempValue, ValueKey};

use std::str::FromStr;

use crate::error::ValueError;

/// Decodes the raw value stored under `title`.
///
/// Components may carry surrounding whitespace.
///
/// # Errors
///
/// Returns [`ValueError::Malformed`] if a composite value has the wrong
/// number of components, or a component does not parse or is out of range.
pub fn decode(title: &str, raw: &str) -> Result<DecodedValue, ValueError> {
    match ValueKey::of(title) {
        ValueKey::Color => {
            let [r, g, b, a] = split(title, raw)?;
            Ok(DecodedValue::Color(ColorValue::new(
                number(title, raw, r)?,
                number(title, raw, g)?,
                number(title, raw, b)?,
                number(title, raw, a)?,
            )))
        }
        ValueKey::Effect => {
            let [effect, a] = split(title, raw)?;
            Ok(DecodedValue::Effect(EffectValue::new(
                number(title, raw, effect)?,
                number(title, raw, a)?,
            )))
        }
        ValueKey::Temp => {
            let [temp, hud] = split(title, raw)?;
            let temp: f64 = number(title, raw, temp)?;
            let hud: f64 = number(title, raw, hud)?;
            if !temp.is_finite() || !hud.is_finite() {
                return Err(malformed(title, raw));
            }
            Ok(DecodedValue::Temp(TempValue::new(temp, hud)))
        }
        ValueKey::Other => Ok(DecodedValue::Text(raw.to_string())),
    }
}

/// Encodes a decoded value back into its raw string form.
#[must_use]
pub fn encode(value: &DecodedValue) -> String {
    match value {
        DecodedValue::Color(c) => format!("{},{},{},{}", c.r, c.g, c.b, c.a),
        DecodedValue::Effect(e) => format!("{},{}", e.effect, e.a),
        DecodedValue::Temp(t) => format!("{},{}", t.temp, t.hud),
        DecodedValue::Text(s) => s.clone(),
    }
}

/// Validates `raw` for `title` and returns its canonical form.
///
/// # Errors
///
/// Returns [`ValueError::Malformed`] if `raw` does not decode.
pub fn canonicalize(title: &str, raw: &str) -> Result<String, ValueError> {
    decode(title, raw).map(|value| encode(&value))
}

/// Returns the exposed view of a color given the device's current effect.
///
/// An active effect suppresses the RGBA components and exposes
/// `{effect, a}` instead.
#[must_use]
pub fn color_view(color: ColorValue, effect: Option<EffectValue>) -> DecodedValue {
    match effect {
        Some(effect) if effect.is_active() => DecodedValue::Effect(effect),
        _ => DecodedValue::Color(color),
    }
}

fn split<'a, const N: usize>(title: &str, raw: &'a str) -> Result<[&'a str; N], ValueError> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    parts.try_into().map_err(|_| malformed(title, raw))
}

fn number<T: FromStr>(title: &str, raw: &str, part: &str) -> Result<T, ValueError> {
    part.parse().map_err(|_| malformed(title, raw))
}

fn malformed(title: &str, raw: &str) -> ValueError {
    ValueError::Malformed {
        key: title.to_string(),
        raw: raw.to_string(),
    }
}
