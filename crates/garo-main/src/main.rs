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

//! garo-bridge - runs the Garo refresh coordinator on a fixed interval

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use garo_core::writable::encode_configuration_value;
use garo_core::{
    BridgeConfig, GaroClient, RefreshCoordinator, Snapshot, StationApi, ValidationError,
    validate_credentials,
};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("info,garo_core=debug,garo_main=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = BridgeConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    info!("🚀 Starting Garo bridge");
    info!("📋 Configuration Summary:");
    info!("   API: {}", config.credentials.api_base_url);
    info!("   Update interval: {}s", config.polling.update_interval_secs);
    info!("   Connector: {}", config.polling.connector_id);

    match cli.command() {
        Command::Run => run(&config).await,
        Command::Once => once(&config).await,
        Command::Validate => validate(&config).await,
        Command::SetConfig {
            station,
            key,
            value,
        } => set_config(&config, &station, &key, &value).await,
    }
}

fn build_coordinator(config: &BridgeConfig) -> Result<RefreshCoordinator> {
    let client = GaroClient::from_config(config).context("Failed to create Garo client")?;
    let api: Arc<dyn StationApi> = Arc::new(client);
    Ok(RefreshCoordinator::new(api, config))
}

async fn run(config: &BridgeConfig) -> Result<()> {
    let mut coordinator = build_coordinator(config)?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
    };
    run_until(&mut coordinator, config.polling.update_interval(), shutdown).await;
    Ok(())
}

/// Refresh every `period` until `shutdown` resolves, even mid-cycle
async fn run_until(
    coordinator: &mut RefreshCoordinator,
    period: Duration,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received, abandoning refresh in progress");
                break;
            }
            result = coordinator.refresh() => result,
        };

        match result {
            Ok(snapshot) => log_summary(&snapshot),
            Err(e) => {
                error!("Refresh cycle error: {e}");
                if coordinator.snapshot().is_some() {
                    warn!("Previous snapshot retained, marked unavailable until next success");
                }
            }
        }
    }

    info!("Shutting down");
}

async fn once(config: &BridgeConfig) -> Result<()> {
    let mut coordinator = build_coordinator(config)?;
    let snapshot = coordinator.refresh().await?;
    println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
    Ok(())
}

async fn validate(config: &BridgeConfig) -> Result<()> {
    match validate_credentials(config).await {
        Ok(()) => {
            println!("Credentials OK");
            Ok(())
        }
        Err(ValidationError::InvalidAuth(reason)) => {
            anyhow::bail!("Invalid username or password: {reason}")
        }
        Err(ValidationError::CannotConnect(reason)) => {
            anyhow::bail!("Cannot connect to the Garo cloud: {reason}")
        }
    }
}

async fn set_config(config: &BridgeConfig, station: &str, key: &str, value: &str) -> Result<()> {
    let encoded = encode_configuration_value(key, value)?;
    let coordinator = build_coordinator(config)?;
    let response = coordinator.set_configuration(station, key, &encoded).await?;
    if let Some(body) = response.as_json() {
        println!("{}", serde_json::to_string_pretty(body)?);
    }
    Ok(())
}

fn log_summary(snapshot: &Snapshot) {
    for station in snapshot.eligible_stations() {
        let status = snapshot
            .primary_connector(&station.id)
            .map_or_else(|| "unknown".to_owned(), |c| String::from(c.status.clone()));
        let energy = snapshot
            .transaction_energy_wh(&station.id)
            .map_or_else(|| "-".to_owned(), |wh| format!("{:.2} kWh", wh / 1000.0));
        info!(
            "   🔌 {}: connector {}, last session {}",
            station.display_name(),
            status,
            energy
        );
    }
}
