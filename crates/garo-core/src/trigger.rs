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

//! Trigger-then-poll for fresh meter values

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::StationApi;
use crate::clock::{Sleeper, TokioSleeper};
use crate::config::TriggerConfig;
use crate::listing::{ApiResponse, Listing};

/// Measurement that shows a triggered report has arrived
pub const SENTINEL_MEASURE: &str = "Current.Offered";

pub struct MeterTriggerPoller {
    api: Arc<dyn StationApi>,
    sleeper: Arc<dyn Sleeper>,
    max_attempts: u32,
    delay: Duration,
}

impl std::fmt::Debug for MeterTriggerPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterTriggerPoller")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl MeterTriggerPoller {
    pub fn new(api: Arc<dyn StationApi>, config: &TriggerConfig) -> Self {
        Self {
            api,
            sleeper: Arc::new(TokioSleeper),
            max_attempts: config.max_attempts.max(1),
            delay: config.delay(),
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Request a meter report and wait until the sentinel measurement shows up.
    ///
    /// Returns `false` when the attempt budget runs out. Neither a rejected
    /// trigger nor a failed poll aborts the loop.
    pub async fn trigger_and_wait(&self, station_id: &str, connector_id: u32) -> bool {
        debug!(
            "📡 [GARO POLL] Triggering meter values for {} connector {}",
            station_id, connector_id
        );
        if let Err(e) = self.api.trigger_meter_values(station_id, connector_id).await {
            warn!(
                "⚠️ [GARO POLL] Trigger request for {} failed, polling anyway: {}",
                station_id, e
            );
        }

        for attempt in 1..=self.max_attempts {
            match self.api.latest_meter_values(station_id, connector_id).await {
                Ok(response) if contains_sentinel(&response) => {
                    debug!(
                        "✅ [GARO POLL] {} found on attempt {} for {}",
                        SENTINEL_MEASURE, attempt, station_id
                    );
                    return true;
                }
                Ok(_) => {
                    debug!(
                        "[GARO POLL] {} not reported yet (attempt {}/{}) for {}",
                        SENTINEL_MEASURE, attempt, self.max_attempts, station_id
                    );
                }
                Err(e) => {
                    warn!(
                        "⚠️ [GARO POLL] Poll attempt {}/{} failed for {}: {}",
                        attempt, self.max_attempts, station_id, e
                    );
                }
            }

            if attempt < self.max_attempts {
                self.sleeper.sleep(self.delay).await;
            }
        }

        warn!(
            "⚠️ [GARO POLL] {} not found after {} attempts for {}",
            SENTINEL_MEASURE, self.max_attempts, station_id
        );
        false
    }
}

/// Whether a latest-values response carries the sentinel measurement.
///
/// Accepts both the `measures: [{name}]` form and a list of readings keyed
/// by `measure_name`.
pub fn contains_sentinel(response: &ApiResponse) -> bool {
    let Some(body) = response.as_json() else {
        return false;
    };

    let named = |entry: &Value, field: &str| {
        entry.get(field).and_then(Value::as_str) == Some(SENTINEL_MEASURE)
    };

    if let Some(Value::Array(measures)) = body.get("measures")
        && measures.iter().any(|m| named(m, "name"))
    {
        return true;
    }

    Listing::decode_value(body)
        .into_vec()
        .iter()
        .any(|entry| named(entry, "measure_name"))
}
