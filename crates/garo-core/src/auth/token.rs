// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Bearer token lifecycle: sign-in, silent refresh, fallback to sign-in

use super::provider::{AuthFlow, AuthenticationResult, IdentityProvider, TokenLifetime};
use crate::clock::{Clock, SystemClock};
use crate::config::Credentials;
use crate::errors::AuthError;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_LIFETIME_SECS: u64 = 3600;
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Cached token material.
///
/// Whenever `access_token` is set, `expires_at` is set too.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenState")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

enum TokenAction {
    Cached(String),
    Refresh(Option<String>),
    SignIn,
}

pub struct TokenManager {
    credentials: Credentials,
    provider: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    state: Mutex<TokenState>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(credentials: Credentials, provider: Arc<dyn IdentityProvider>) -> Self {
        Self::with_clock(credentials, provider, Arc::new(SystemClock))
    }

    pub fn with_clock(
        credentials: Credentials,
        provider: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            provider,
            clock,
            state: Mutex::new(TokenState::default()),
        }
    }

    /// Seed the cache, e.g. with a token restored by the host
    #[must_use]
    pub fn with_state(self, state: TokenState) -> Self {
        *self.state.lock() = state;
        self
    }

    pub fn state(&self) -> TokenState {
        self.state.lock().clone()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Return a token valid for at least the refresh margin, authenticating if needed
    pub async fn ensure_valid_token(&self) -> Result<String, AuthError> {
        match self.next_action() {
            TokenAction::Cached(token) => Ok(token),
            TokenAction::Refresh(Some(refresh_token)) => {
                match self.refresh(refresh_token).await {
                    Ok(token) => Ok(token),
                    Err(e) => {
                        warn!("⚠️ [GARO AUTH] Token refresh failed, signing in again: {}", e);
                        self.sign_in().await
                    }
                }
            }
            TokenAction::Refresh(None) => {
                debug!("[GARO AUTH] No refresh token available, signing in");
                self.sign_in().await
            }
            TokenAction::SignIn => self.sign_in().await,
        }
    }

    /// Drop the access token so the next call authenticates from scratch
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.access_token = None;
        state.expires_at = None;
    }

    fn next_action(&self) -> TokenAction {
        let state = self.state.lock();
        match (&state.access_token, state.expires_at) {
            (Some(token), Some(expires_at)) => {
                if self.clock.now() > expires_at - TimeDelta::minutes(REFRESH_MARGIN_MINUTES) {
                    TokenAction::Refresh(state.refresh_token.clone())
                } else {
                    TokenAction::Cached(token.clone())
                }
            }
            _ => TokenAction::SignIn,
        }
    }

    /// Full username/password sign-in; replaces all token material
    pub async fn sign_in(&self) -> Result<String, AuthError> {
        debug!("[GARO AUTH] Authenticating with Garo cloud API");

        let result = self
            .provider
            .initiate_auth(AuthFlow::UserPassword {
                username: self.credentials.username.clone(),
                password: self.credentials.password.clone(),
            })
            .await?;

        let lifetime = match result.expires_in {
            TokenLifetime::Seconds(secs) => secs,
            TokenLifetime::Missing => DEFAULT_LIFETIME_SECS,
            TokenLifetime::Invalid(ref raw) => {
                warn!(
                    "⚠️ [GARO AUTH] Unparseable token lifetime '{}', assuming {}s",
                    raw, DEFAULT_LIFETIME_SECS
                );
                DEFAULT_LIFETIME_SECS
            }
        };
        let expires_at = self.expires_at(lifetime);

        let AuthenticationResult {
            access_token,
            refresh_token,
            ..
        } = result;

        let mut state = self.state.lock();
        state.access_token = Some(access_token.clone());
        state.refresh_token = refresh_token;
        state.expires_at = Some(expires_at);
        drop(state);

        info!(
            "✅ [GARO AUTH] Authentication successful, token expires at {}",
            expires_at
        );
        Ok(access_token)
    }

    async fn refresh(&self, refresh_token: String) -> Result<String, AuthError> {
        debug!("[GARO AUTH] Refreshing access token");

        let result = self
            .provider
            .initiate_auth(AuthFlow::RefreshToken { refresh_token })
            .await?;

        let lifetime = match result.expires_in {
            TokenLifetime::Seconds(secs) => secs,
            TokenLifetime::Missing => DEFAULT_LIFETIME_SECS,
            TokenLifetime::Invalid(raw) => {
                return Err(AuthError::MalformedResponse(format!(
                    "refresh returned unparseable lifetime '{raw}'"
                )));
            }
        };
        let expires_at = self.expires_at(lifetime);

        let mut state = self.state.lock();
        state.access_token = Some(result.access_token.clone());
        state.expires_at = Some(expires_at);
        if let Some(rotated) = result.refresh_token {
            state.refresh_token = Some(rotated);
        }
        drop(state);

        debug!("[GARO AUTH] Token refreshed, expires at {}", expires_at);
        Ok(result.access_token)
    }

    fn expires_at(&self, lifetime_secs: u64) -> DateTime<Utc> {
        let now = self.clock.now();
        i64::try_from(lifetime_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
