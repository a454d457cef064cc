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

//! Per-station fan-out for each resource type.
//!
//! Stations are visited one after another so the shared token manager never
//! refreshes concurrently. A failing station is logged and left out of that
//! resource's map; it never affects its siblings.
//!
//! Each resource type runs under a [`FetchBudget`]. Every station gets an even
//! share of whatever time is left, so one slow station is cut off at its share
//! and the stations already fetched keep their results.

use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::client::StationApi;
use crate::config::TriggerConfig;
use crate::errors::{ApiError, ApiResult};
use crate::listing::{ApiResponse, Listing};
use crate::models::{
    ConfigurationItem, ConnectorStatus, MeterReading, Station, Transaction, UserIdentity,
    decode_each,
};
use crate::snapshot::{latest_per_key, most_recent_transaction};
use crate::trigger::MeterTriggerPoller;

/// Decoded station directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directory {
    pub count: usize,
    pub stations: Vec<Station>,
}

impl Directory {
    pub fn from_response(response: &ApiResponse) -> Self {
        let entries = Listing::decode_or_warn(response, "charging stations");
        let count = entries.len();
        Self {
            count,
            stations: decode_each(entries, "charging station"),
        }
    }

    pub fn eligible(&self) -> Vec<Station> {
        self.stations.iter().filter(|s| s.is_eligible()).cloned().collect()
    }
}

/// Time allowed for one resource type across all of its stations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBudget {
    deadline: Instant,
}

impl FetchBudget {
    pub fn new(limit: Duration) -> Self {
        Self::until(Instant::now() + limit)
    }

    pub fn until(deadline: Instant) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Deadline for the next station: an even share of the time left
    pub fn next_share(&self, stations_left: usize) -> Instant {
        let now = Instant::now();
        let left = u32::try_from(stations_left.max(1)).unwrap_or(u32::MAX);
        now + self.deadline.saturating_duration_since(now) / left
    }
}

pub struct StationResourceAggregator {
    api: Arc<dyn StationApi>,
    poller: MeterTriggerPoller,
    connector_id: u32,
}

impl std::fmt::Debug for StationResourceAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationResourceAggregator")
            .field("poller", &self.poller)
            .field("connector_id", &self.connector_id)
            .finish_non_exhaustive()
    }
}

impl StationResourceAggregator {
    pub fn new(api: Arc<dyn StationApi>, trigger: &TriggerConfig, connector_id: u32) -> Self {
        Self {
            poller: MeterTriggerPoller::new(api.clone(), trigger),
            api,
            connector_id,
        }
    }

    /// Use a custom poller (tests inject one with a recording sleeper)
    #[must_use]
    pub fn with_poller(mut self, poller: MeterTriggerPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Fetch the station directory; errors propagate
    pub async fn fetch_directory(&self) -> ApiResult<Directory> {
        let response = self.api.charging_stations(None).await?;
        let directory = Directory::from_response(&response);
        let eligible = directory.stations.iter().filter(|s| s.is_eligible()).count();
        info!(
            "📋 [GARO API] Directory lists {} stations, {} eligible",
            directory.count, eligible
        );
        Ok(directory)
    }

    /// Trigger, wait for and read meter values station by station.
    ///
    /// The trigger wait may use at most half of a station's share so the
    /// final read always gets the rest.
    pub async fn fetch_meter_values(
        &self,
        stations: &[Station],
        budget: FetchBudget,
    ) -> BTreeMap<String, BTreeMap<String, MeterReading>> {
        let mut all = BTreeMap::new();
        for (visited, station) in stations.iter().enumerate() {
            let until = budget.next_share(stations.len() - visited);
            let now = Instant::now();
            let wait_until = now + until.saturating_duration_since(now) / 2;

            let confirmed = tokio::time::timeout_at(
                wait_until,
                self.poller.trigger_and_wait(&station.id, self.connector_id),
            )
            .await
            .unwrap_or(false);
            if !confirmed {
                warn!(
                    "⚠️ [GARO POLL] Reading meter values of {} without a confirmed trigger",
                    station.display_name()
                );
            }

            let read = self.api.latest_meter_values(&station.id, self.connector_id);
            if let Some(response) = within_share("meter values", station, until, read).await {
                let readings: Vec<MeterReading> =
                    decode_each(meter_entries(&response), "meter reading");
                debug!(
                    "[GARO API] {} meter readings for {}",
                    readings.len(),
                    station.display_name()
                );
                all.insert(station.id.clone(), latest_per_key(readings));
            }
        }
        debug!("Retrieved meter values for {}/{} stations", all.len(), stations.len());
        all
    }

    pub async fn fetch_connector_statuses(
        &self,
        stations: &[Station],
        budget: FetchBudget,
    ) -> BTreeMap<String, Vec<ConnectorStatus>> {
        let mut all = BTreeMap::new();
        for (visited, station) in stations.iter().enumerate() {
            let until = budget.next_share(stations.len() - visited);
            let call = self.api.connector_status(&station.id);
            if let Some(response) = within_share("connector status", station, until, call).await {
                let entries = Listing::decode_or_warn(&response, "connector status");
                all.insert(station.id.clone(), decode_each(entries, "connector status"));
            }
        }
        debug!("Retrieved connector status for {}/{} stations", all.len(), stations.len());
        all
    }

    pub async fn fetch_configurations(
        &self,
        stations: &[Station],
        budget: FetchBudget,
    ) -> BTreeMap<String, Vec<ConfigurationItem>> {
        let mut all = BTreeMap::new();
        for (visited, station) in stations.iter().enumerate() {
            let until = budget.next_share(stations.len() - visited);
            let call = self.api.configuration(&station.id);
            if let Some(response) = within_share("configuration", station, until, call).await {
                let entries = Listing::decode_or_warn(&response, "configuration");
                all.insert(station.id.clone(), decode_each(entries, "configuration item"));
            }
        }
        debug!("Retrieved configuration for {}/{} stations", all.len(), stations.len());
        all
    }

    /// Most recently started transaction per station
    pub async fn fetch_transactions(
        &self,
        stations: &[Station],
        budget: FetchBudget,
    ) -> BTreeMap<String, Transaction> {
        let mut all = BTreeMap::new();
        for (visited, station) in stations.iter().enumerate() {
            let until = budget.next_share(stations.len() - visited);
            let call = self.api.transactions(&station.id, self.connector_id);
            if let Some(response) = within_share("transactions", station, until, call).await {
                let entries = Listing::decode_or_warn(&response, "transactions");
                let transactions: Vec<Transaction> = decode_each(entries, "transaction");
                if let Some(latest) = most_recent_transaction(transactions) {
                    all.insert(station.id.clone(), latest);
                }
            }
        }
        debug!("Retrieved transactions for {}/{} stations", all.len(), stations.len());
        all
    }

    /// One lookup per distinct id-token, results merged
    pub async fn fetch_users(
        &self,
        id_tokens: &[String],
        budget: FetchBudget,
    ) -> BTreeMap<String, UserIdentity> {
        let mut unique: Vec<&String> = id_tokens.iter().collect();
        unique.sort();
        unique.dedup();

        let mut users = BTreeMap::new();
        for (visited, id_token) in unique.iter().enumerate() {
            let until = budget.next_share(unique.len() - visited);
            // id-tokens stay out of the log
            match tokio::time::timeout_at(until, self.api.users(id_token)).await {
                Ok(Ok(response)) => users.extend(decode_user_map(&response)),
                Ok(Err(e)) => warn!("⚠️ [GARO API] User lookup failed: {}", e),
                Err(_) => warn!("⏱️ [GARO API] User lookup ran past its time share"),
            }
        }
        debug!("Retrieved {} users for {} id-tokens", users.len(), unique.len());
        users
    }
}

/// Run one station's call until its share of the budget runs out
async fn within_share<T>(
    resource: &str,
    station: &Station,
    until: Instant,
    call: impl Future<Output = ApiResult<T>>,
) -> Option<T> {
    match tokio::time::timeout_at(until, call).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            log_station_failure(resource, station, &e);
            None
        }
        Err(_) => {
            warn!(
                "⏱️ [GARO API] {} for station {} ({}) ran past its time share",
                resource,
                station.display_name(),
                station.id
            );
            None
        }
    }
}

fn log_station_failure(resource: &str, station: &Station, e: &ApiError) {
    error!(
        "❌ [GARO API] Failed to get {} for station {} ({}): {}",
        resource,
        station.display_name(),
        station.id,
        e
    );
}

/// Meter readings come back as a list shape or wrapped in `measures`
fn meter_entries(response: &ApiResponse) -> Vec<Value> {
    let listing = Listing::decode(response);
    if listing.is_recognized() {
        return listing.into_vec();
    }
    if let Some(Value::Array(measures)) = response.as_json().and_then(|v| v.get("measures")) {
        return measures.clone();
    }
    warn!("⚠️ [GARO API] Unexpected meter values response shape, treating as empty");
    Vec::new()
}

/// `/users` answers with an `id_token -> user` object
fn decode_user_map(response: &ApiResponse) -> BTreeMap<String, UserIdentity> {
    let Some(Value::Object(map)) = response.as_json() else {
        warn!("⚠️ [GARO API] Unexpected users response shape, ignoring");
        return BTreeMap::new();
    };
    map.iter()
        .filter(|(_, user)| user.is_object())
        .filter_map(|(token, user)| {
            serde_json::from_value::<UserIdentity>(user.clone())
                .ok()
                .map(|user| (token.clone(), user))
        })
        .collect()
}
