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

//! Polling bridge for the Garo charging station cloud API

pub mod aggregator;
pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod config_value;
pub mod coordinator;
pub mod errors;
pub mod listing;
pub mod models;
pub mod snapshot;
pub mod trigger;
pub mod validation;
pub mod writable;

pub use aggregator::{Directory, FetchBudget, StationResourceAggregator};
pub use auth::{CognitoIdentityProvider, IdentityProvider, TokenManager, TokenState};
pub use client::{GaroClient, StationApi};
pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use config::{BridgeConfig, Credentials};
pub use config_value::ConfigValue;
pub use coordinator::{CyclePhase, RefreshCoordinator};
pub use errors::{ApiError, ApiResult, AuthError, CycleError};
pub use listing::{ApiResponse, Listing};
pub use models::{
    ConfigurationItem, ConnectorState, ConnectorStatus, MeterKey, MeterReading, Station,
    Transaction, TransactionState, UserIdentity,
};
pub use snapshot::Snapshot;
pub use trigger::MeterTriggerPoller;
pub use validation::{ValidationError, validate_credentials};
pub use writable::{NUMBER_POINTS, NumberPoint};
