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

//! First-setup credential check

use thiserror::Error;
use tracing::{error, info};

use crate::client::{GaroClient, StationApi};
use crate::config::BridgeConfig;
use crate::errors::ApiError;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid credentials: {0}")]
    InvalidAuth(String),

    #[error("cannot connect: {0}")]
    CannotConnect(String),
}

/// Sign in and list a single station to prove the credentials work
pub async fn validate_credentials(config: &BridgeConfig) -> Result<(), ValidationError> {
    let client = GaroClient::from_config(config).map_err(|e| classify(&e))?;
    validate_with(&client).await
}

pub async fn validate_with(api: &dyn StationApi) -> Result<(), ValidationError> {
    match api.charging_stations(Some(1)).await {
        Ok(_) => {
            info!("✅ [GARO AUTH] Credentials validated");
            Ok(())
        }
        Err(e) => {
            error!("❌ [GARO AUTH] Connection test failed: {}", e);
            Err(classify(&e))
        }
    }
}

/// Separate credential problems from connectivity problems
pub fn classify(err: &ApiError) -> ValidationError {
    let message = err.to_string();
    let invalid = match err {
        ApiError::Auth(auth) => auth.is_invalid_credentials(),
        ApiError::AuthExpired { .. } => true,
        ApiError::Http { .. }
        | ApiError::Timeout { .. }
        | ApiError::Transport(_)
        | ApiError::ConfigurationRejected { .. }
        | ApiError::InvalidValue(_)
        | ApiError::Config(_) => false,
    } || err.status() == Some(401)
        || message.contains("401")
        || message.contains("Unauthorized")
        || message.contains("InvalidParameterException");

    if invalid {
        ValidationError::InvalidAuth(message)
    } else {
        ValidationError::CannotConnect(message)
    }
}
