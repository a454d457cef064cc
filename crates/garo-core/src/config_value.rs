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

use serde::Serialize;
use std::fmt;

/// Typed view of a string-encoded configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ConfigValue {
    /// Infer the type of a raw value.
    ///
    /// Precedence: boolean literal (case-insensitive), then integer, then
    /// float, and finally the string itself.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Self::Integer(n);
        }
        if let Ok(f) = trimmed.parse::<f64>()
            && f.is_finite()
        {
            return Self::Float(f);
        }
        Self::Text(raw.to_owned())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[expect(clippy::cast_precision_loss)]
            Self::Integer(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Integer(_) | Self::Float(_) | Self::Text(_) => None,
        }
    }
}

/// Wire encoding used when writing a value back
impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        assert_eq!(ConfigValue::parse("32"), ConfigValue::Integer(32));
        assert_eq!(ConfigValue::parse("true"), ConfigValue::Bool(true));
        assert_eq!(ConfigValue::parse("FALSE"), ConfigValue::Bool(false));
        assert_eq!(ConfigValue::parse("3.5"), ConfigValue::Float(3.5));
        assert_eq!(ConfigValue::parse("idle"), ConfigValue::Text("idle".to_owned()));
    }

    #[test]
    fn test_edge_cases() {
        assert_eq!(ConfigValue::parse("-6"), ConfigValue::Integer(-6));
        assert_eq!(ConfigValue::parse(" 16 "), ConfigValue::Integer(16));
        assert_eq!(ConfigValue::parse(""), ConfigValue::Text(String::new()));
        assert_eq!(ConfigValue::parse("1e3"), ConfigValue::Float(1000.0));
        // "NaN" and "inf" parse as f64 but are not useful numbers
        assert_eq!(ConfigValue::parse("NaN"), ConfigValue::Text("NaN".to_owned()));
        assert_eq!(ConfigValue::parse("inf"), ConfigValue::Text("inf".to_owned()));
    }

    #[test]
    fn test_display_is_lowercase_for_bools() {
        assert_eq!(ConfigValue::Bool(true).to_string(), "true");
        assert_eq!(ConfigValue::Integer(16).to_string(), "16");
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(ConfigValue::Integer(16).as_f64(), Some(16.0));
        assert_eq!(ConfigValue::Text("x".to_owned()).as_f64(), None);
        assert_eq!(ConfigValue::Bool(false).as_bool(), Some(false));
    }
}
