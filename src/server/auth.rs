// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User session resolution.

use std::collections::HashMap;

use axum::http::{HeaderMap, header};

use super::params::Params;
use crate::error::{Error, Result};
use crate::types::UserId;

/// Resolves an access token to the user it was issued for.
///
/// Token issuance and validation live outside this crate; the server only
/// needs to know which user a request acts for.
pub trait SessionResolver: Send + Sync {
    /// Returns the user of a valid token, or `None`.
    fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Session resolver backed by a fixed token table.
///
/// # Examples
///
/// ```
/// use homepoll::server::{SessionResolver, StaticSessions};
/// use homepoll::types::UserId;
///
/// let sessions = StaticSessions::new().with_session("secret", UserId::new(9));
/// assert_eq!(sessions.resolve("secret"), Some(UserId::new(9)));
/// assert_eq!(sessions.resolve("other"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticSessions {
    tokens: HashMap<String, UserId>,
}

impl StaticSessions {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `token` to `user`.
    #[must_use]
    pub fn with_session(mut self, token: impl Into<String>, user: UserId) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }

    /// Returns the number of known tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no token is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl SessionResolver for StaticSessions {
    fn resolve(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).copied()
    }
}

/// Extracts the token from an `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the user of a request, if it presents a token at all.
///
/// The header wins over the `access_token` query parameter. A token that
/// does not resolve is an error, not an anonymous request.
pub(super) fn session_user(
    resolver: &dyn SessionResolver,
    headers: &HeaderMap,
    params: &Params,
) -> Result<Option<UserId>> {
    let Some(token) = bearer_token(headers).or_else(|| params.get("access_token")) else {
        return Ok(None);
    };
    resolver.resolve(token).map(Some).ok_or(Error::Unauthorized)
}

/// Like [`session_user`], but a missing token is also rejected.
pub(super) fn require_user(
    resolver: &dyn SessionResolver,
    headers: &HeaderMap,
    params: &Params,
) -> Result<UserId> {
    session_user(resolver, headers, params)?.ok_or(Error::Unauthorized)
}
