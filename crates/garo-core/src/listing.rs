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

//! Response body decoding and list-shape normalisation

use serde_json::Value;

/// Body of a successful API call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(Value),
    /// Body that was not valid JSON, kept verbatim
    Raw(String),
}

impl ApiResponse {
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Raw(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

/// The shapes a list endpoint is known to answer with.
///
/// Tried in a fixed order: `items`, then `data`, then a bare array.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Items(Vec<Value>),
    Data(Vec<Value>),
    Bare(Vec<Value>),
    Unrecognized,
}

impl Listing {
    pub fn decode(response: &ApiResponse) -> Self {
        match response.as_json() {
            Some(value) => Self::decode_value(value),
            None => Self::Unrecognized,
        }
    }

    pub fn decode_value(value: &Value) -> Self {
        if let Some(Value::Array(items)) = value.get("items") {
            return Self::Items(items.clone());
        }
        if let Some(Value::Array(data)) = value.get("data") {
            return Self::Data(data.clone());
        }
        if let Value::Array(bare) = value {
            return Self::Bare(bare.clone());
        }
        Self::Unrecognized
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Items(v) | Self::Data(v) | Self::Bare(v) => v.len(),
            Self::Unrecognized => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Self::Items(v) | Self::Data(v) | Self::Bare(v) => v,
            Self::Unrecognized => Vec::new(),
        }
    }

    /// Decode a list response, warning when the shape is not one we know
    pub fn decode_or_warn(response: &ApiResponse, what: &str) -> Vec<Value> {
        let listing = Self::decode(response);
        if !listing.is_recognized() {
            tracing::warn!("⚠️ [GARO API] Unexpected {} response shape, treating as empty", what);
        }
        listing.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_text_keeps_invalid_json_verbatim() {
        let response = ApiResponse::from_text("<html>gateway</html>".to_owned());
        assert_eq!(response, ApiResponse::Raw("<html>gateway</html>".to_owned()));
        assert!(response.is_raw());

        let response = ApiResponse::from_text(r#"{"ok":true}"#.to_owned());
        assert_eq!(response.as_json(), Some(&json!({"ok": true})));
    }

    #[test]
    fn test_items_shape() {
        let listing = Listing::decode_value(&json!({"items": [1, 2, 3]}));
        assert_eq!(listing, Listing::Items(vec![json!(1), json!(2), json!(3)]));
        assert_eq!(listing.len(), 3);
    }

    #[test]
    fn test_data_shape() {
        let listing = Listing::decode_value(&json!({"data": [{"id": "A"}]}));
        assert!(matches!(listing, Listing::Data(ref v) if v.len() == 1));
    }

    #[test]
    fn test_bare_list_shape() {
        let listing = Listing::decode_value(&json!([{"id": "A"}, {"id": "B"}]));
        assert!(matches!(listing, Listing::Bare(ref v) if v.len() == 2));
    }

    #[test]
    fn test_items_wins_over_data() {
        let listing = Listing::decode_value(&json!({"items": [1], "data": [1, 2]}));
        assert_eq!(listing, Listing::Items(vec![json!(1)]));
    }

    #[test]
    fn test_unknown_shapes_are_empty() {
        for value in [json!({"count": 4}), json!("text"), json!({"items": "nope"}), json!(null)] {
            let listing = Listing::decode_value(&value);
            assert!(!listing.is_recognized());
            assert!(listing.is_empty());
        }
        let raw = ApiResponse::Raw("garbage".to_owned());
        assert!(Listing::decode_or_warn(&raw, "station").is_empty());
    }
}
