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

//! Identity provider (AWS Cognito `InitiateAuth`) client

use crate::config::Credentials;
use crate::errors::AuthError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error};

const AMZ_JSON: &str = "application/x-amz-json-1.1";
const INITIATE_AUTH_TARGET: &str = "AWSCognitoIdentityProviderService.InitiateAuth";

/// Grant requested from the identity provider
#[derive(Clone, PartialEq, Eq)]
pub enum AuthFlow {
    UserPassword { username: String, password: String },
    RefreshToken { refresh_token: String },
}

impl AuthFlow {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserPassword { .. } => "USER_PASSWORD_AUTH",
            Self::RefreshToken { .. } => "REFRESH_TOKEN_AUTH",
        }
    }

    fn parameters(&self) -> Value {
        match self {
            Self::UserPassword { username, password } => json!({
                "USERNAME": username,
                "PASSWORD": password,
            }),
            Self::RefreshToken { refresh_token } => json!({
                "REFRESH_TOKEN": refresh_token,
            }),
        }
    }
}

impl std::fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Token lifetime as declared by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLifetime {
    Missing,
    Seconds(u64),
    Invalid(String),
}

impl TokenLifetime {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::Number(n)) => match n.as_u64() {
                Some(secs) if secs > 0 => Self::Seconds(secs),
                _ => Self::Invalid(n.to_string()),
            },
            Some(Value::String(s)) => match s.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Self::Seconds(secs),
                _ => Self::Invalid(s.clone()),
            },
            Some(other) => Self::Invalid(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AuthenticationResult {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: TokenLifetime,
}

impl std::fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationResult")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn initiate_auth(&self, flow: AuthFlow) -> Result<AuthenticationResult, AuthError>;
}

#[derive(Deserialize)]
struct InitiateAuthResponse {
    #[serde(rename = "AuthenticationResult")]
    authentication_result: Option<WireAuthenticationResult>,
    #[serde(rename = "ChallengeName")]
    challenge_name: Option<String>,
}

#[derive(Deserialize)]
struct WireAuthenticationResult {
    #[serde(rename = "AccessToken")]
    access_token: Option<String>,
    #[serde(rename = "RefreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "ExpiresIn")]
    expires_in: Option<Value>,
}

/// Cognito user pool client speaking the public `InitiateAuth` JSON protocol
#[derive(Debug, Clone)]
pub struct CognitoIdentityProvider {
    client: Client,
    endpoint: String,
    client_id: String,
}

impl CognitoIdentityProvider {
    pub fn new(endpoint: impl Into<String>, client_id: impl Into<String>) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
        })
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self, AuthError> {
        Self::new(
            credentials.identity_endpoint(),
            credentials.cognito_client_id.clone(),
        )
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn initiate_auth(&self, flow: AuthFlow) -> Result<AuthenticationResult, AuthError> {
        debug!("🔐 [GARO AUTH] InitiateAuth {}", flow.name());

        let body = json!({
            "AuthFlow": flow.name(),
            "ClientId": self.client_id,
            "AuthParameters": flow.parameters(),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", AMZ_JSON)
            .header("X-Amz-Target", INITIATE_AUTH_TARGET)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| AuthError::Connection(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Connection(e.to_string()))?;

        if !status.is_success() {
            let error_body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            let code = error_body
                .get("__type")
                .and_then(Value::as_str)
                .unwrap_or("UnknownError");
            let message = error_body
                .get("message")
                .or_else(|| error_body.get("Message"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            error!(
                "❌ [GARO AUTH] {} rejected with status {}: {}",
                flow.name(),
                status,
                code
            );
            return Err(AuthError::from_provider_code(code, message));
        }

        let parsed: InitiateAuthResponse = serde_json::from_str(&text)
            .map_err(|e| AuthError::MalformedResponse(format!("InitiateAuth body: {e}")))?;

        let Some(result) = parsed.authentication_result else {
            let challenge = parsed.challenge_name.unwrap_or_else(|| "none".to_owned());
            return Err(AuthError::Provider {
                code: "ChallengeRequired".to_owned(),
                message: format!("provider requested challenge {challenge}"),
            });
        };

        let access_token = result.access_token.ok_or_else(|| {
            AuthError::MalformedResponse("AuthenticationResult without AccessToken".to_owned())
        })?;

        Ok(AuthenticationResult {
            access_token,
            refresh_token: result.refresh_token,
            expires_in: TokenLifetime::from_value(result.expires_in.as_ref()),
        })
    }
}
