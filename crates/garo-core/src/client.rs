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

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::auth::{CognitoIdentityProvider, TokenManager};
use crate::config::{BridgeConfig, Credentials, RetryConfig, TimeoutConfig};
use crate::errors::{ApiError, ApiResult};
use crate::listing::ApiResponse;

const OWNER_CONTEXT: &str = "Owner";

/// The station API surface the bridge consumes.
///
/// Implemented over HTTP by [`GaroClient`]; the aggregator, poller and
/// coordinator only ever see this trait.
#[async_trait]
pub trait StationApi: Send + Sync {
    /// `GET /charging-stations` in owner context with relationships included
    async fn charging_stations(&self, limit: Option<u32>) -> ApiResult<ApiResponse>;

    async fn latest_meter_values(
        &self,
        station_id: &str,
        connector_id: u32,
    ) -> ApiResult<ApiResponse>;

    async fn connector_status(&self, station_id: &str) -> ApiResult<ApiResponse>;

    async fn configuration(&self, station_id: &str) -> ApiResult<ApiResponse>;

    async fn transactions(&self, station_id: &str, connector_id: u32) -> ApiResult<ApiResponse>;

    /// Look up the owner of a single id-token
    async fn users(&self, id_token: &str) -> ApiResult<ApiResponse>;

    /// Ask the station to report fresh meter values
    async fn trigger_meter_values(
        &self,
        station_id: &str,
        connector_id: u32,
    ) -> ApiResult<ApiResponse>;

    /// Raw configuration write; see [`StationApi::set_configuration`]
    async fn change_configuration(
        &self,
        station_id: &str,
        key: &str,
        value: &str,
    ) -> ApiResult<ApiResponse>;

    /// Write one configuration variable, failing only if the station rejects it
    async fn set_configuration(
        &self,
        station_id: &str,
        key: &str,
        value: &str,
    ) -> ApiResult<ApiResponse> {
        info!(
            "🔧 [GARO API] Setting configuration {}={} for station {}",
            key, value, station_id
        );

        let response = self.change_configuration(station_id, key, value).await?;
        match configuration_status(&response, key) {
            ConfigurationStatus::Accepted => {
                info!("✅ [GARO API] Configuration accepted: {}={}", key, value);
            }
            ConfigurationStatus::Rejected => {
                error!(
                    "❌ [GARO API] Configuration rejected for {}: {}={}",
                    station_id, key, value
                );
                return Err(ApiError::ConfigurationRejected {
                    key: key.to_owned(),
                    value: value.to_owned(),
                });
            }
            ConfigurationStatus::Other(status) => {
                warn!(
                    "⚠️ [GARO API] Unknown configuration status '{}' for {}={}",
                    status, key, value
                );
            }
            ConfigurationStatus::KeyMissing => {
                warn!(
                    "⚠️ [GARO API] Configuration key '{}' not in response status for {}",
                    key, station_id
                );
            }
            ConfigurationStatus::NoStatus => {
                warn!("⚠️ [GARO API] Configuration response has no status map");
            }
        }
        Ok(response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigurationStatus {
    Accepted,
    Rejected,
    Other(String),
    KeyMissing,
    NoStatus,
}

fn configuration_status(response: &ApiResponse, key: &str) -> ConfigurationStatus {
    let Some(Value::Object(statuses)) = response.as_json().and_then(|v| v.get("status")) else {
        return ConfigurationStatus::NoStatus;
    };
    match statuses.get(key) {
        None => ConfigurationStatus::KeyMissing,
        Some(Value::String(s)) if s == "Accepted" => ConfigurationStatus::Accepted,
        Some(Value::String(s)) if s == "Rejected" => ConfigurationStatus::Rejected,
        Some(Value::String(s)) => ConfigurationStatus::Other(s.clone()),
        Some(other) => ConfigurationStatus::Other(other.to_string()),
    }
}

/// Authenticated HTTP client for the Garo end-user API
#[derive(Debug)]
pub struct GaroClient {
    client: Client,
    base_url: String,
    tokens: Arc<TokenManager>,
    call_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl GaroClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenManager>) -> ApiResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to create HTTP client: {e}")))?;

        let retry = RetryConfig::default();
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            tokens,
            call_timeout: Duration::from_secs(TimeoutConfig::default().call_secs),
            max_retries: retry.max_retries,
            retry_delay: retry.retry_delay(),
        })
    }

    /// Build a client plus its Cognito-backed token manager from configuration
    pub fn from_config(config: &BridgeConfig) -> ApiResult<Self> {
        let provider = CognitoIdentityProvider::from_credentials(&config.credentials)?;
        let tokens = Arc::new(TokenManager::new(
            config.credentials.clone(),
            Arc::new(provider),
        ));
        Ok(Self::new(config.credentials.api_base_url.clone(), tokens)?
            .with_call_timeout(Duration::from_secs(config.timeouts.call_secs))
            .with_retry_config(config.retry.max_retries, config.retry.retry_delay()))
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set custom retry configuration
    #[must_use]
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn credentials(&self) -> &Credentials {
        self.tokens.credentials()
    }

    /// One authenticated call bounded by the per-call timeout
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ApiResult<ApiResponse> {
        let secs = self.call_timeout.as_secs();
        match tokio::time::timeout(self.call_timeout, self.call_inner(&method, path, query, body))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                error!("⏱️ [GARO API] {} {} timed out after {}s", method, path, secs);
                Err(ApiError::Timeout {
                    method: method.to_string(),
                    path: path.to_owned(),
                    secs,
                })
            }
        }
    }

    async fn call_inner(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ApiResult<ApiResponse> {
        let token = self.tokens.ensure_valid_token().await?;
        let url = format!("{}{}", self.base_url, path);

        debug!("🌐 [GARO API] {} {}", method, path);

        let response = self
            .retry_request(|| {
                let mut request = self.client.request(method.clone(), &url).bearer_auth(&token);
                if let Some(body) = body {
                    request = request.json(body);
                } else if !query.is_empty() {
                    request = request.query(query);
                }
                request.send()
            })
            .await?;

        let status = response.status();
        debug!("   Status: {}", status);
        debug!("   Headers: {:?}", response.headers());

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.without_url()))?;
        debug!("   Response length: {} chars", text.len());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!(
                    "❌ [GARO API] Token rejected for {} {} (status {})",
                    method, path, status
                );
                self.tokens.invalidate();
                Err(ApiError::AuthExpired {
                    status: status.as_u16(),
                })
            }
            status if status.as_u16() >= 400 => {
                error!(
                    "❌ [GARO API] {} {} failed with status {}",
                    method, path, status
                );
                Err(ApiError::Http {
                    status: status.as_u16(),
                    body: serde_json::from_str(&text).ok(),
                })
            }
            _ => {
                let response = ApiResponse::from_text(text);
                if response.is_raw() {
                    warn!(
                        "⚠️ [GARO API] {} {} returned a non-JSON body, keeping raw text",
                        method, path
                    );
                }
                Ok(response)
            }
        }
    }

    /// Retry transport failures with exponential backoff.
    ///
    /// Errors are stripped of their URL, which can carry id-tokens.
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> ApiResult<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await.map_err(reqwest::Error::without_url) {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!("Request failed after {} attempts: {}", attempts, e);
                    return Err(ApiError::Transport(e));
                }
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    fn station_query(station_id: &str, connector_id: u32) -> Vec<(&'static str, String)> {
        vec![
            ("context", OWNER_CONTEXT.to_owned()),
            ("charging_station_id", station_id.to_owned()),
            ("connector_id", connector_id.to_string()),
        ]
    }
}

#[async_trait]
impl StationApi for GaroClient {
    async fn charging_stations(&self, limit: Option<u32>) -> ApiResult<ApiResponse> {
        let mut query = vec![
            ("context", OWNER_CONTEXT.to_owned()),
            ("include_relationships", "true".to_owned()),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        self.call(Method::GET, "/charging-stations", &query, None)
            .await
    }

    async fn latest_meter_values(
        &self,
        station_id: &str,
        connector_id: u32,
    ) -> ApiResult<ApiResponse> {
        self.call(
            Method::GET,
            "/meter-values/latest",
            &Self::station_query(station_id, connector_id),
            None,
        )
        .await
    }

    async fn connector_status(&self, station_id: &str) -> ApiResult<ApiResponse> {
        let query = [
            ("context", OWNER_CONTEXT.to_owned()),
            ("charging_station_id", station_id.to_owned()),
        ];
        self.call(
            Method::GET,
            &format!("/charging-stations/{station_id}/connector-status"),
            &query,
            None,
        )
        .await
    }

    async fn configuration(&self, station_id: &str) -> ApiResult<ApiResponse> {
        self.call(
            Method::GET,
            &format!("/charging-stations/{station_id}/configuration"),
            &[],
            None,
        )
        .await
    }

    async fn transactions(&self, station_id: &str, connector_id: u32) -> ApiResult<ApiResponse> {
        self.call(
            Method::GET,
            "/transactions",
            &Self::station_query(station_id, connector_id),
            None,
        )
        .await
    }

    async fn users(&self, id_token: &str) -> ApiResult<ApiResponse> {
        let query = [
            ("role", OWNER_CONTEXT.to_owned()),
            ("id_tokens", id_token.to_owned()),
        ];
        self.call(Method::GET, "/users", &query, None).await
    }

    async fn trigger_meter_values(
        &self,
        station_id: &str,
        connector_id: u32,
    ) -> ApiResult<ApiResponse> {
        let body = json!({
            "requested_message": "MeterValues",
            "connector_id": connector_id,
        });
        self.call(
            Method::PUT,
            &format!("/actions/trigger-message/{station_id}"),
            &[],
            Some(&body),
        )
        .await
    }

    async fn change_configuration(
        &self,
        station_id: &str,
        key: &str,
        value: &str,
    ) -> ApiResult<ApiResponse> {
        let body = json!({
            "configuration_variables": [{"key": key, "value": value}],
        });
        self.call(
            Method::PUT,
            &format!("/actions/change-configuration/{station_id}"),
            &[],
            Some(&body),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthFlow, AuthenticationResult, IdentityProvider, TokenLifetime};
    use crate::errors::AuthError;
    use mockito::{Matcher, Server};
    use parking_lot::Mutex;
    use tokio::net::TcpListener;

    /// Hands out numbered tokens and counts sign-ins
    #[derive(Default)]
    struct CountingProvider {
        grants: Mutex<u32>,
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        async fn initiate_auth(&self, _flow: AuthFlow) -> Result<AuthenticationResult, AuthError> {
            let mut grants = self.grants.lock();
            *grants += 1;
            Ok(AuthenticationResult {
                access_token: format!("token-{grants}"),
                refresh_token: None,
                expires_in: TokenLifetime::Seconds(3600),
            })
        }
    }

    fn client_for(server: &Server) -> (GaroClient, Arc<CountingProvider>) {
        client_at(server.url())
    }

    fn client_at(base_url: String) -> (GaroClient, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider::default());
        let tokens = Arc::new(TokenManager::new(
            Credentials::new("owner@example.com", "secret"),
            provider.clone(),
        ));
        let client = GaroClient::new(base_url, tokens)
            .unwrap()
            .with_retry_config(1, Duration::from_millis(1));
        (client, provider)
    }

    #[tokio::test]
    async fn test_silent_server_hits_call_timeout() {
        // Accepts connections and never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let (client, _) = client_at(format!("http://{addr}"));
        let client = client.with_call_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = client.configuration("st-1").await.unwrap_err();

        assert!(
            matches!(err, ApiError::Timeout { ref method, ref path, .. }
                if method == "GET" && path == "/charging-stations/st-1/configuration"),
            "unexpected error: {err:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        holder.abort();
    }

    #[tokio::test]
    async fn test_dropped_connections_are_retried_with_backoff() {
        // Accepts and immediately closes every connection
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(Mutex::new(0_u32));
        let counter = accepted.clone();
        let closer = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                *counter.lock() += 1;
                drop(socket);
            }
        });

        let (client, _) = client_at(format!("http://{addr}"));
        let client = client.with_retry_config(3, Duration::from_millis(20));

        let started = std::time::Instant::now();
        let err = client.users("TAG-SECRET").await.unwrap_err();

        assert!(matches!(err, ApiError::Transport(_)), "unexpected error: {err:?}");
        assert_eq!(*accepted.lock(), 3);
        // 20ms then 40ms between the three attempts
        assert!(started.elapsed() >= Duration::from_millis(60));
        // The id-token rides in the query string and must not leak through the error
        assert!(!err.to_string().contains("TAG-SECRET"));
        closer.abort();
    }

    #[tokio::test]
    async fn test_refused_connection_surfaces_transport_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let (client, provider) = client_at(format!("http://{addr}"));
        let client = client.with_retry_config(2, Duration::from_millis(10));

        let started = std::time::Instant::now();
        let err = client.users("TAG-1").await.unwrap_err();

        match err {
            ApiError::Transport(ref e) => {
                assert!(e.is_connect());
                assert!(e.url().is_none());
            }
            ref other => panic!("unexpected error: {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(*provider.grants.lock(), 1);
    }

    #[tokio::test]
    async fn test_directory_request_shape() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/charging-stations")
            .match_header("authorization", "Bearer token-1")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("context".into(), "Owner".into()),
                Matcher::UrlEncoded("include_relationships".into(), "true".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"items":[{"id":"A"}]}"#)
            .create_async()
            .await;

        let (client, _) = client_for(&server);
        let response = client.charging_stations(Some(1)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.as_json(), Some(&json!({"items": [{"id": "A"}]})));
    }

    #[tokio::test]
    async fn test_meter_values_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/meter-values/latest")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("context".into(), "Owner".into()),
                Matcher::UrlEncoded("charging_station_id".into(), "st-1".into()),
                Matcher::UrlEncoded("connector_id".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let (client, _) = client_for(&server);
        client.latest_meter_values("st-1", 1).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_reused_across_calls() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/charging-stations/st-1/configuration")
            .match_header("authorization", "Bearer token-1")
            .with_status(200)
            .with_body("[]")
            .expect(2)
            .create_async()
            .await;

        let (client, provider) = client_for(&server);
        client.configuration("st-1").await.unwrap();
        client.configuration("st-1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(*provider.grants.lock(), 1);
    }

    #[tokio::test]
    async fn test_non_json_body_becomes_raw_sentinel() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/charging-stations/st-1/connector-status")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;

        let (client, _) = client_for(&server);
        let response = client.connector_status("st-1").await.unwrap();
        assert_eq!(response, ApiResponse::Raw("OK".to_owned()));
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/transactions")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"detail":"not found"}"#)
            .create_async()
            .await;

        let (client, _) = client_for(&server);
        let err = client.transactions("st-1", 1).await.unwrap_err();
        match err {
            ApiError::Http { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, Some(json!({"detail": "not found"})));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_token() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/users")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let (client, provider) = client_for(&server);
        let err = client.users("TAG-1").await.unwrap_err();
        assert!(matches!(err, ApiError::AuthExpired { status: 401 }));
        assert!(client.tokens().state().access_token.is_none());

        // Next call signs in again
        let _ = client.users("TAG-1").await;
        assert_eq!(*provider.grants.lock(), 2);
    }

    #[tokio::test]
    async fn test_trigger_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/actions/trigger-message/st-1")
            .match_body(Matcher::Json(json!({
                "requested_message": "MeterValues",
                "connector_id": 1
            })))
            .with_status(200)
            .with_body(r#"{"status":"Accepted"}"#)
            .create_async()
            .await;

        let (client, _) = client_for(&server);
        client.trigger_meter_values("st-1", 1).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_configuration_accepted() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/actions/change-configuration/st-1")
            .match_body(Matcher::Json(json!({
                "configuration_variables": [{"key": "GaroOwnerMaxCurrent", "value": "16"}]
            })))
            .with_status(200)
            .with_body(r#"{"status":{"GaroOwnerMaxCurrent":"Accepted"}}"#)
            .create_async()
            .await;

        let (client, _) = client_for(&server);
        let response = client
            .set_configuration("st-1", "GaroOwnerMaxCurrent", "16")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            response.as_json(),
            Some(&json!({"status": {"GaroOwnerMaxCurrent": "Accepted"}}))
        );
    }

    #[tokio::test]
    async fn test_set_configuration_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/actions/change-configuration/st-1")
            .with_status(200)
            .with_body(r#"{"status":{"GaroOwnerMaxCurrent":"Rejected"}}"#)
            .create_async()
            .await;

        let (client, _) = client_for(&server);
        let err = client
            .set_configuration("st-1", "GaroOwnerMaxCurrent", "40")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ConfigurationRejected { ref key, .. } if key == "GaroOwnerMaxCurrent"));
    }

    #[test]
    fn test_configuration_status_classification() {
        let status = |body: Value| configuration_status(&ApiResponse::Json(body), "K");
        assert_eq!(status(json!({"status": {"K": "Accepted"}})), ConfigurationStatus::Accepted);
        assert_eq!(status(json!({"status": {"K": "Rejected"}})), ConfigurationStatus::Rejected);
        assert_eq!(
            status(json!({"status": {"K": "RebootRequired"}})),
            ConfigurationStatus::Other("RebootRequired".to_owned())
        );
        assert_eq!(status(json!({"status": {}})), ConfigurationStatus::KeyMissing);
        assert_eq!(status(json!({})), ConfigurationStatus::NoStatus);
        assert_eq!(
            configuration_status(&ApiResponse::Raw("x".to_owned()), "K"),
            ConfigurationStatus::NoStatus
        );
    }
}
