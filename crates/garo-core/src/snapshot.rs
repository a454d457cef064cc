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

//! The per-cycle station snapshot and its read accessors.
//!
//! A snapshot is built once per successful refresh cycle and never patched.
//! Maps are ordered so two cycles over identical upstream data produce
//! snapshots that compare (and serialize) identically.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config_value::ConfigValue;
use crate::models::{
    ConfigurationItem, ConnectorStatus, MeterReading, Station, Transaction, UserIdentity,
};

/// Meter reading holding the cumulative imported energy, in Wh
pub const ENERGY_REGISTER_MEASURE: &str = "Energy.Active.Import.Register";

/// Connector surfaced to consumers
pub const PRIMARY_CONNECTOR_ID: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Number of stations in the directory, eligible or not
    pub station_count: usize,
    /// Full directory listing
    pub stations: Vec<Station>,
    /// station id -> meter key -> latest reading
    pub meter_values: BTreeMap<String, BTreeMap<String, MeterReading>>,
    pub connector_statuses: BTreeMap<String, Vec<ConnectorStatus>>,
    pub configurations: BTreeMap<String, Vec<ConfigurationItem>>,
    /// Most recently started transaction per station
    pub transactions: BTreeMap<String, Transaction>,
    /// id-token -> user
    pub users: BTreeMap<String, UserIdentity>,
}

impl Snapshot {
    pub fn eligible_stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter().filter(|s| s.is_eligible())
    }

    pub fn station(&self, station_id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == station_id)
    }

    pub fn meter_readings(&self, station_id: &str) -> Option<&BTreeMap<String, MeterReading>> {
        self.meter_values.get(station_id)
    }

    /// Latest reading addressed by its stable key string
    pub fn meter_reading(&self, station_id: &str, key: &str) -> Option<&MeterReading> {
        self.meter_values.get(station_id)?.get(key)
    }

    pub fn meter_value(&self, station_id: &str, key: &str) -> Option<f64> {
        self.meter_reading(station_id, key)?.measure_value
    }

    pub fn connector_status(&self, station_id: &str, connector_id: u32) -> Option<&ConnectorStatus> {
        self.connector_statuses
            .get(station_id)?
            .iter()
            .find(|c| c.connector_id == connector_id)
    }

    pub fn primary_connector(&self, station_id: &str) -> Option<&ConnectorStatus> {
        self.connector_status(station_id, PRIMARY_CONNECTOR_ID)
    }

    pub fn configuration_item(&self, station_id: &str, key: &str) -> Option<&ConfigurationItem> {
        self.configurations
            .get(station_id)?
            .iter()
            .find(|item| item.key == key)
    }

    pub fn configuration_value(&self, station_id: &str, key: &str) -> Option<ConfigValue> {
        let raw = self.configuration_item(station_id, key)?.value.as_deref()?;
        Some(ConfigValue::parse(raw))
    }

    pub fn latest_transaction(&self, station_id: &str) -> Option<&Transaction> {
        self.transactions.get(station_id)
    }

    /// Energy delivered by the station's latest transaction, in Wh.
    ///
    /// A finished transaction reports `meter_stop - meter_start`. An ongoing
    /// one uses the live energy register, or 0 when no usable reading exists.
    pub fn transaction_energy_wh(&self, station_id: &str) -> Option<f64> {
        let tx = self.latest_transaction(station_id)?;
        let start = tx.meter_start?;

        if let Some(stop) = tx.meter_stop {
            return Some(stop - start);
        }

        match self.meter_value(station_id, ENERGY_REGISTER_MEASURE) {
            Some(current) if current >= start => Some(current - start),
            _ => Some(0.0),
        }
    }

    /// Display name of whoever started the latest transaction, falling back
    /// to the raw id-token when the user is unknown
    pub fn transaction_user_name(&self, station_id: &str) -> Option<String> {
        let id_token = self.latest_transaction(station_id)?.id_token.as_deref()?;
        self.users
            .get(id_token)
            .and_then(UserIdentity::display_name)
            .or_else(|| Some(id_token.to_owned()))
    }

    /// Distinct id-tokens referenced by retained transactions, sorted
    pub fn referenced_id_tokens(&self) -> Vec<String> {
        unique_id_tokens(self.transactions.values())
    }
}

/// Keep only the newest reading per meter key
pub fn latest_per_key(readings: Vec<MeterReading>) -> BTreeMap<String, MeterReading> {
    let mut latest: BTreeMap<String, MeterReading> = BTreeMap::new();
    for reading in readings {
        let key = reading.key().to_string();
        match latest.get(&key) {
            Some(existing) if existing.time_str() >= reading.time_str() => {}
            _ => {
                latest.insert(key, reading);
            }
        }
    }
    latest
}

/// Pick the transaction with the greatest start time; the first one wins ties
pub fn most_recent_transaction(transactions: Vec<Transaction>) -> Option<Transaction> {
    transactions.into_iter().fold(None, |best, tx| match best {
        Some(best) if start_key(&best) >= start_key(&tx) => Some(best),
        _ => Some(tx),
    })
}

fn start_key(tx: &Transaction) -> Option<&str> {
    tx.start_time.as_deref()
}

pub fn unique_id_tokens<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Vec<String> {
    let mut tokens: Vec<String> = transactions
        .into_iter()
        .filter_map(|tx| tx.id_token.clone())
        .filter(|token| !token.is_empty())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}
