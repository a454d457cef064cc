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

//! Refresh cycle driver.
//!
//! One cycle: fetch the directory (mandatory), then every per-station
//! resource type under its own time budget, then merge into a fresh
//! [`Snapshot`]. Only the directory can fail the cycle. Stations that error
//! or run out of time are left out of their resource type's map; the
//! stations finished before them are kept.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::aggregator::{FetchBudget, StationResourceAggregator};
use crate::client::StationApi;
use crate::config::{BridgeConfig, TimeoutConfig};
use crate::errors::{ApiResult, CycleError};
use crate::listing::ApiResponse;
use crate::snapshot::{Snapshot, unique_id_tokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclePhase {
    Idle,
    FetchingDirectory,
    FetchingResources,
    Merging,
    Done,
    Failed,
}

pub struct RefreshCoordinator {
    api: Arc<dyn StationApi>,
    aggregator: StationResourceAggregator,
    timeouts: TimeoutConfig,
    snapshot: Option<Arc<Snapshot>>,
    last_update_success: bool,
    phase: CyclePhase,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("phase", &self.phase)
            .field("last_update_success", &self.last_update_success)
            .field("has_snapshot", &self.snapshot.is_some())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    pub fn new(api: Arc<dyn StationApi>, config: &BridgeConfig) -> Self {
        let aggregator = StationResourceAggregator::new(
            api.clone(),
            &config.trigger,
            config.polling.connector_id,
        );
        Self::with_aggregator(api, aggregator, config.timeouts.clone())
    }

    pub fn with_aggregator(
        api: Arc<dyn StationApi>,
        aggregator: StationResourceAggregator,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            api,
            aggregator,
            timeouts,
            snapshot: None,
            last_update_success: false,
            phase: CyclePhase::Idle,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success
    }

    /// Latest successfully built snapshot, even if the last cycle failed
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.clone()
    }

    /// Snapshot usable by consumers: present only while the last cycle succeeded
    pub fn available_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.clone().filter(|_| self.last_update_success)
    }

    /// Run one refresh cycle.
    ///
    /// Taking `&mut self` keeps cycles on one coordinator from overlapping.
    pub async fn refresh(&mut self) -> Result<Arc<Snapshot>, CycleError> {
        let started = Instant::now();
        info!("🔄 [GARO CYCLE] Starting refresh cycle");

        self.phase = CyclePhase::FetchingDirectory;
        let count_secs = self.timeouts.count_secs;
        let directory = match tokio::time::timeout(
            Duration::from_secs(count_secs),
            self.aggregator.fetch_directory(),
        )
        .await
        {
            Ok(Ok(directory)) => directory,
            Ok(Err(e)) => return Err(self.fail(CycleError::Directory(e))),
            Err(_) => return Err(self.fail(CycleError::DirectoryTimeout { secs: count_secs })),
        };

        let stations = directory.eligible();
        debug!("[GARO CYCLE] Polling {} eligible stations", stations.len());

        self.phase = CyclePhase::FetchingResources;
        let meter_values = self
            .aggregator
            .fetch_meter_values(&stations, budget(self.timeouts.meter_values_secs))
            .await;
        let connector_statuses = self
            .aggregator
            .fetch_connector_statuses(&stations, budget(self.timeouts.connector_status_secs))
            .await;
        let configurations = self
            .aggregator
            .fetch_configurations(&stations, budget(self.timeouts.configuration_secs))
            .await;
        let transactions = self
            .aggregator
            .fetch_transactions(&stations, budget(self.timeouts.transactions_secs))
            .await;

        let id_tokens = unique_id_tokens(transactions.values());
        let users = if id_tokens.is_empty() {
            Default::default()
        } else {
            self.aggregator
                .fetch_users(&id_tokens, budget(self.timeouts.user_info_secs))
                .await
        };

        self.phase = CyclePhase::Merging;
        let snapshot = Arc::new(Snapshot {
            station_count: directory.count,
            stations: directory.stations,
            meter_values,
            connector_statuses,
            configurations,
            transactions,
            users,
        });

        self.snapshot = Some(snapshot.clone());
        self.last_update_success = true;
        self.phase = CyclePhase::Done;

        info!(
            "✅ [GARO CYCLE] Refresh complete in {:.1}s: {} stations, meters for {}, status for {}, config for {}, {} transactions",
            started.elapsed().as_secs_f64(),
            snapshot.station_count,
            snapshot.meter_values.len(),
            snapshot.connector_statuses.len(),
            snapshot.configurations.len(),
            snapshot.transactions.len()
        );
        Ok(snapshot)
    }

    /// Write one configuration variable on a station
    pub async fn set_configuration(
        &self,
        station_id: &str,
        key: &str,
        value: &str,
    ) -> ApiResult<ApiResponse> {
        self.api.set_configuration(station_id, key, value).await
    }

    pub fn api(&self) -> &Arc<dyn StationApi> {
        &self.api
    }

    fn fail(&mut self, e: CycleError) -> CycleError {
        error!("❌ [GARO CYCLE] Refresh failed: {}", e);
        self.last_update_success = false;
        self.phase = CyclePhase::Failed;
        e
    }
}

fn budget(secs: u64) -> FetchBudget {
    FetchBudget::new(Duration::from_secs(secs))
}
