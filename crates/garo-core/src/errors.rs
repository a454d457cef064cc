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

//! Error types for the Garo bridge

use serde_json::Value;
use thiserror::Error;

/// Identity provider error codes that mean the credentials themselves are bad
const CREDENTIAL_ERROR_CODES: &[&str] = &[
    "NotAuthorizedException",
    "UserNotFoundException",
    "InvalidParameterException",
    "PasswordResetRequiredException",
    "UserNotConfirmedException",
];

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials ({code}): {message}")]
    InvalidCredentials { code: String, message: String },

    #[error("identity provider error ({code}): {message}")]
    Provider { code: String, message: String },

    #[error("cannot reach identity provider: {0}")]
    Connection(String),

    #[error("malformed identity provider response: {0}")]
    MalformedResponse(String),
}

impl AuthError {
    /// Classify a provider error code into the matching variant
    pub fn from_provider_code(code: &str, message: impl Into<String>) -> Self {
        // Cognito may prefix the code with a namespace ("...#NotAuthorizedException")
        let code = code.rsplit('#').next().unwrap_or(code);
        if CREDENTIAL_ERROR_CODES.contains(&code) {
            Self::InvalidCredentials {
                code: code.to_owned(),
                message: message.into(),
            }
        } else {
            Self::Provider {
                code: code.to_owned(),
                message: message.into(),
            }
        }
    }

    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, Self::InvalidCredentials { .. })
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("access token rejected by API (status {status})")]
    AuthExpired { status: u16 },

    #[error("API returned status {status}")]
    Http { status: u16, body: Option<Value> },

    #[error("{method} {path} timed out after {secs}s")]
    Timeout {
        method: String,
        path: String,
        secs: u64,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("configuration change rejected by charging station: {key}={value}")]
    ConfigurationRejected { key: String, value: String },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthExpired { status } | Self::Http { status, .. } => Some(*status),
            Self::Auth(_)
            | Self::Timeout { .. }
            | Self::Transport(_)
            | Self::ConfigurationRejected { .. }
            | Self::InvalidValue(_)
            | Self::Config(_) => None,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Failure of a whole refresh cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("station directory fetch failed: {0}")]
    Directory(#[source] ApiError),

    #[error("station directory fetch timed out after {secs}s")]
    DirectoryTimeout { secs: u64 },
}
