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

//! Typed views of the Garo cloud API payloads.
//!
//! Upstream payloads are loosely typed: numbers arrive as strings, ids as
//! either, and most fields may be absent. Every field is therefore optional
//! and decoded leniently, so one odd field never drops a whole record.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Charging station as listed by the station directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub uid: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub load_interface: Option<bool>,
    #[serde(default)]
    pub charging_unit: Option<ChargingUnit>,
    #[serde(default)]
    pub status: Option<StationStatus>,
}

impl Station {
    /// Only real charge points are polled; load-management relays and stations
    /// that do not declare the flag are skipped
    pub fn is_eligible(&self) -> bool {
        self.load_interface == Some(false)
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.uid.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargingUnit {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub serial_number: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub vendor_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationStatus {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub connection: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub registration: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub installation: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub configuration: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub firmware_update: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub heartbeat_timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub last_firmware_update_check: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub configuration_sync_required: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub using_proxy: Option<bool>,
}

/// One entry of `/meter-values/latest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    #[serde(alias = "name", deserialize_with = "lenient::string")]
    pub measure_name: String,
    #[serde(default, alias = "value", deserialize_with = "lenient::opt_f64")]
    pub measure_value: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub phase: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub location: Option<String>,
    #[serde(default, alias = "timestamp", deserialize_with = "lenient::opt_string")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub connector_id: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub transaction_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub context: Option<String>,
}

impl MeterReading {
    pub fn key(&self) -> MeterKey {
        MeterKey {
            measure_name: self.measure_name.clone(),
            phase: self.phase.clone(),
            location: self.location.clone(),
        }
    }

    pub fn time_str(&self) -> &str {
        self.time.as_deref().unwrap_or_default()
    }
}

/// Identity of a meter series within one station
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MeterKey {
    pub measure_name: String,
    pub phase: Option<String>,
    pub location: Option<String>,
}

impl MeterKey {
    pub fn new(measure_name: &str, phase: Option<&str>, location: Option<&str>) -> Self {
        Self {
            measure_name: measure_name.to_owned(),
            phase: phase.map(str::to_owned),
            location: location.map(str::to_owned),
        }
    }
}

/// Stable string form: `<measure>[_phase_<p>][_loc_<l>]`
impl fmt::Display for MeterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.measure_name)?;
        if let Some(phase) = self.phase.as_deref().filter(|p| !p.is_empty()) {
            write!(f, "_phase_{phase}")?;
        }
        if let Some(location) = self.location.as_deref().filter(|l| !l.is_empty()) {
            write!(f, "_loc_{location}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectorState {
    Available,
    Preparing,
    Charging,
    SuspendedEv,
    SuspendedEvse,
    Finishing,
    Reserved,
    Occupied,
    Unavailable,
    Faulted,
    Other(String),
}

impl From<String> for ConnectorState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Available" => Self::Available,
            "Preparing" => Self::Preparing,
            "Charging" => Self::Charging,
            "SuspendedEV" => Self::SuspendedEv,
            "SuspendedEVSE" => Self::SuspendedEvse,
            "Finishing" => Self::Finishing,
            "Reserved" => Self::Reserved,
            "Occupied" => Self::Occupied,
            "Unavailable" => Self::Unavailable,
            "Faulted" => Self::Faulted,
            _ => Self::Other(raw),
        }
    }
}

impl From<ConnectorState> for String {
    fn from(state: ConnectorState) -> Self {
        match state {
            ConnectorState::Available => "Available".to_owned(),
            ConnectorState::Preparing => "Preparing".to_owned(),
            ConnectorState::Charging => "Charging".to_owned(),
            ConnectorState::SuspendedEv => "SuspendedEV".to_owned(),
            ConnectorState::SuspendedEvse => "SuspendedEVSE".to_owned(),
            ConnectorState::Finishing => "Finishing".to_owned(),
            ConnectorState::Reserved => "Reserved".to_owned(),
            ConnectorState::Occupied => "Occupied".to_owned(),
            ConnectorState::Unavailable => "Unavailable".to_owned(),
            ConnectorState::Faulted => "Faulted".to_owned(),
            ConnectorState::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorStatus {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient::u32")]
    pub connector_id: u32,
    pub status: ConnectorState,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub limited: bool,
}

/// One charging station configuration variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationItem {
    #[serde(deserialize_with = "lenient::string")]
    pub key: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub value: Option<String>,
    #[serde(default, alias = "readonly", deserialize_with = "lenient::opt_string")]
    pub mutability: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub last_modified: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub last_synced_with_charging_station: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionState {
    Started,
    Updated,
    Finished,
    Stopped,
    Authorized,
    Preparing,
    Other(String),
}

impl From<String> for TransactionState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Started" => Self::Started,
            "Updated" => Self::Updated,
            "Finished" => Self::Finished,
            "Stopped" => Self::Stopped,
            "Authorized" => Self::Authorized,
            "Preparing" => Self::Preparing,
            _ => Self::Other(raw),
        }
    }
}

impl From<TransactionState> for String {
    fn from(state: TransactionState) -> Self {
        match state {
            TransactionState::Started => "Started".to_owned(),
            TransactionState::Updated => "Updated".to_owned(),
            TransactionState::Finished => "Finished".to_owned(),
            TransactionState::Stopped => "Stopped".to_owned(),
            TransactionState::Authorized => "Authorized".to_owned(),
            TransactionState::Preparing => "Preparing".to_owned(),
            TransactionState::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default)]
    pub state: Option<TransactionState>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub connector_id: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id_token: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub meter_start: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub meter_stop: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub locale: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub virtual_id_token: Option<String>,
}

impl UserIdentity {
    /// "First Last", either name alone, or the local part of the email
    pub fn display_name(&self) -> Option<String> {
        let first = self.first_name.as_deref().filter(|s| !s.is_empty());
        let last = self.last_name.as_deref().filter(|s| !s.is_empty());
        match (first, last) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(name), None) | (None, Some(name)) => Some(name.to_owned()),
            (None, None) => self
                .email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .filter(|local| !local.is_empty())
                .map(str::to_owned),
        }
    }
}

/// Decode each element independently, skipping the ones that do not fit
pub fn decode_each<T: serde::de::DeserializeOwned>(values: Vec<Value>, what: &str) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("⚠️ Skipping malformed {} entry: {}", what, e);
                None
            }
        })
        .collect()
}

mod lenient {
    use super::{Deserialize, Deserializer, Value};

    fn value_to_string(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        value_to_string(Value::deserialize(d)?)
            .ok_or_else(|| serde::de::Error::custom("expected a string or number, got null"))
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(value_to_string(Value::deserialize(d)?))
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => Some(b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            _ => None,
        })
    }

    pub fn bool_or_false<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(opt_bool(d)?.unwrap_or(false))
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<u32>().ok(),
            _ => None,
        })
    }

    pub fn u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        opt_u32(d)?.ok_or_else(|| serde::de::Error::custom("expected an unsigned integer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_station_eligibility() {
        let stations: Vec<Station> = decode_each(
            vec![
                json!({"id": "A", "load_interface": false}),
                json!({"id": "B", "load_interface": true}),
                json!({"id": "C"}),
            ],
            "station",
        );
        let eligible: Vec<&str> = stations
            .iter()
            .filter(|s| s.is_eligible())
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(eligible, vec!["A"]);
    }

    #[test]
    fn test_station_display_name_fallbacks() {
        let station: Station =
            serde_json::from_value(json!({"id": "abc", "uid": "GARO-1"})).unwrap();
        assert_eq!(station.display_name(), "GARO-1");

        let station: Station = serde_json::from_value(json!({"id": "abc"})).unwrap();
        assert_eq!(station.display_name(), "abc");
    }

    #[test]
    fn test_meter_reading_lenient_fields() {
        let reading: MeterReading = serde_json::from_value(json!({
            "measure_name": "Current.Import",
            "measure_value": "15.5",
            "unit": "A",
            "phase": "L1",
            "time": "2025-06-01T10:00:00Z",
            "connector_id": "1",
            "transaction_id": 4711,
            "context": "Sample.Periodic"
        }))
        .unwrap();

        assert_eq!(reading.measure_value, Some(15.5));
        assert_eq!(reading.connector_id, Some(1));
        assert_eq!(reading.transaction_id.as_deref(), Some("4711"));
        assert_eq!(reading.key().to_string(), "Current.Import_phase_L1");
    }

    #[test]
    fn test_meter_key_string_form() {
        assert_eq!(MeterKey::new("Voltage", None, None).to_string(), "Voltage");
        assert_eq!(
            MeterKey::new("Current.Import", Some("L2"), Some("Outlet")).to_string(),
            "Current.Import_phase_L2_loc_Outlet"
        );
        assert_eq!(
            MeterKey::new("Temperature", None, Some("Body")).to_string(),
            "Temperature_loc_Body"
        );
    }

    #[test]
    fn test_connector_state_roundtrip_and_unknown() {
        let status: ConnectorStatus = serde_json::from_value(json!({
            "connector_id": 1,
            "status": "SuspendedEV",
            "timestamp": "2025-06-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(status.status, ConnectorState::SuspendedEv);
        assert!(!status.limited);
        assert_eq!(serde_json::to_value(&status.status).unwrap(), json!("SuspendedEV"));

        let odd: ConnectorState = serde_json::from_value(json!("Levitating")).unwrap();
        assert_eq!(odd, ConnectorState::Other("Levitating".to_owned()));
    }

    #[test]
    fn test_transaction_decoding() {
        let tx: Transaction = serde_json::from_value(json!({
            "id": 12,
            "state": "Started",
            "connector_id": 1,
            "id_token": "TAG-1",
            "start_time": "2025-06-01T08:00:00Z",
            "meter_start": 1000
        }))
        .unwrap();
        assert_eq!(tx.id, "12");
        assert_eq!(tx.state, Some(TransactionState::Started));
        assert_eq!(tx.meter_start, Some(1000.0));
        assert!(tx.meter_stop.is_none());
    }

    #[test]
    fn test_configuration_value_kept_as_string() {
        let item: ConfigurationItem = serde_json::from_value(json!({
            "key": "GaroOwnerMaxCurrent",
            "value": 16,
            "mutability": "ReadWrite"
        }))
        .unwrap();
        assert_eq!(item.value.as_deref(), Some("16"));
    }

    #[test]
    fn test_user_display_name() {
        let mut user = UserIdentity {
            first_name: Some("Ada".to_owned()),
            last_name: Some("Lovelace".to_owned()),
            email: Some("ada@example.com".to_owned()),
            ..UserIdentity::default()
        };
        assert_eq!(user.display_name().as_deref(), Some("Ada Lovelace"));

        user.last_name = None;
        assert_eq!(user.display_name().as_deref(), Some("Ada"));

        user.first_name = Some(String::new());
        assert_eq!(user.display_name().as_deref(), Some("ada"));

        user.email = None;
        assert_eq!(user.display_name(), None);
    }

    #[test]
    fn test_decode_each_skips_malformed() {
        let stations: Vec<Station> =
            decode_each(vec![json!({"id": "A"}), json!({"name": "no id"}), json!(3)], "station");
        assert_eq!(stations.len(), 1);
    }
}
