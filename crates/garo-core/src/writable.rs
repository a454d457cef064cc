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

//! Numeric configuration points that may be written back to a station

use serde::Serialize;
use tracing::info;

use crate::client::StationApi;
use crate::config_value::ConfigValue;
use crate::errors::{ApiError, ApiResult};
use crate::listing::ApiResponse;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumberPoint {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

pub const OWNER_MAX_CURRENT: NumberPoint = NumberPoint {
    key: "GaroOwnerMaxCurrent",
    name: "Max Current (Owner)",
    unit: "A",
    min: 6.0,
    max: 32.0,
    step: 1.0,
};

pub const LIGHT_INTENSITY: NumberPoint = NumberPoint {
    key: "LightIntensity",
    name: "Light Intensity",
    unit: "%",
    min: 0.0,
    max: 100.0,
    step: 1.0,
};

pub static NUMBER_POINTS: [NumberPoint; 2] = [OWNER_MAX_CURRENT, LIGHT_INTENSITY];

impl NumberPoint {
    pub fn find(key: &str) -> Option<&'static NumberPoint> {
        NUMBER_POINTS.iter().find(|p| p.key == key)
    }

    /// Check range and step alignment
    pub fn validate(&self, value: f64) -> ApiResult<()> {
        if !value.is_finite() || value < self.min || value > self.max {
            return Err(ApiError::InvalidValue(format!(
                "{} must be between {} and {} {}, got {}",
                self.key, self.min, self.max, self.unit, value
            )));
        }
        let steps = (value - self.min) / self.step;
        if (steps - steps.round()).abs() > 1e-9 {
            return Err(ApiError::InvalidValue(format!(
                "{} must be a multiple of {} {} from {}, got {}",
                self.key, self.step, self.unit, self.min, value
            )));
        }
        Ok(())
    }

    /// Wire form of a value: current limits are whole amperes
    pub fn encode(&self, value: f64) -> String {
        if self.key.contains("Current") {
            #[expect(clippy::cast_possible_truncation)]
            let amps = value.trunc() as i64;
            ConfigValue::Integer(amps).to_string()
        } else {
            ConfigValue::Float(value).to_string()
        }
    }

    /// Current value as reported in a snapshot
    pub fn current_value(&self, snapshot: &Snapshot, station_id: &str) -> Option<f64> {
        snapshot.configuration_value(station_id, self.key)?.as_f64()
    }

    /// Validate, encode and write a value to one station
    pub async fn write(
        &self,
        api: &dyn StationApi,
        station_id: &str,
        value: f64,
    ) -> ApiResult<ApiResponse> {
        self.validate(value)?;
        info!(
            "🔧 [GARO API] Setting {} to {} {} on {}",
            self.name, value, self.unit, station_id
        );
        api.set_configuration(station_id, self.key, &self.encode(value))
            .await
    }
}

/// Encode a free-form value for a configuration write.
///
/// Known number points go through their own validation. Other keys are
/// typed with [`ConfigValue::parse`], which lowercases boolean literals.
pub fn encode_configuration_value(key: &str, raw: &str) -> ApiResult<String> {
    if let Some(point) = NumberPoint::find(key) {
        let value = ConfigValue::parse(raw).as_f64().ok_or_else(|| {
            ApiError::InvalidValue(format!("{key} expects a number, got '{raw}'"))
        })?;
        point.validate(value)?;
        return Ok(point.encode(value));
    }
    Ok(ConfigValue::parse(raw).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfigurationItem;
    use serde_json::json;

    #[test]
    fn test_range_validation() {
        assert!(OWNER_MAX_CURRENT.validate(6.0).is_ok());
        assert!(OWNER_MAX_CURRENT.validate(32.0).is_ok());
        assert!(OWNER_MAX_CURRENT.validate(5.0).is_err());
        assert!(OWNER_MAX_CURRENT.validate(33.0).is_err());
        assert!(OWNER_MAX_CURRENT.validate(f64::NAN).is_err());
        assert!(LIGHT_INTENSITY.validate(0.0).is_ok());
        assert!(LIGHT_INTENSITY.validate(100.5).is_err());
    }

    #[test]
    fn test_step_validation() {
        assert!(OWNER_MAX_CURRENT.validate(16.5).is_err());
        assert!(LIGHT_INTENSITY.validate(42.0).is_ok());
    }

    #[test]
    fn test_encoding() {
        assert_eq!(OWNER_MAX_CURRENT.encode(16.0), "16");
        assert_eq!(LIGHT_INTENSITY.encode(50.0), "50");
        assert_eq!(LIGHT_INTENSITY.encode(12.5), "12.5");
    }

    #[test]
    fn test_encode_configuration_value() {
        assert_eq!(
            encode_configuration_value("GaroOwnerMaxCurrent", "20").unwrap(),
            "20"
        );
        assert!(encode_configuration_value("GaroOwnerMaxCurrent", "64").is_err());
        assert!(encode_configuration_value("LightIntensity", "bright").is_err());
        assert_eq!(
            encode_configuration_value("AuthorizeRemoteTxRequests", "TRUE").unwrap(),
            "true"
        );
        assert_eq!(
            encode_configuration_value("FreeText", "Hello").unwrap(),
            "Hello"
        );
    }

    #[test]
    fn test_current_value_from_snapshot() {
        let mut snapshot = Snapshot::default();
        let items: Vec<ConfigurationItem> = vec![
            serde_json::from_value(json!({"key": "GaroOwnerMaxCurrent", "value": "16"})).unwrap(),
            serde_json::from_value(json!({"key": "LightIntensity", "value": "dim"})).unwrap(),
        ];
        snapshot.configurations.insert("st-1".to_owned(), items);

        assert_eq!(OWNER_MAX_CURRENT.current_value(&snapshot, "st-1"), Some(16.0));
        assert_eq!(LIGHT_INTENSITY.current_value(&snapshot, "st-1"), None);
        assert_eq!(OWNER_MAX_CURRENT.current_value(&snapshot, "st-2"), None);
    }

    #[test]
    fn test_lookup_by_key() {
        assert_eq!(NumberPoint::find("LightIntensity"), Some(&LIGHT_INTENSITY));
        assert!(NumberPoint::find("Unknown").is_none());
    }
}
