// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Store tunables, loadable from environment variables.

/// Tunables for a store instance.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Maximum purchases admitted concurrently. Further purchase requests
    /// queue in submission order.
    pub max_concurrent_purchases: usize,
    /// Capacity of the event broadcast channel. Slow subscribers past this
    /// lag start losing events (broadcast semantics).
    pub event_buffer: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_concurrent_purchases: 1,
            event_buffer: 64,
        }
    }
}

impl StoreOptions {
    /// Load options from environment variables.
    ///
    /// Optional (with defaults):
    /// - `VENDRA_MAX_CONCURRENT_PURCHASES`: purchase admission bound (default: 1)
    /// - `VENDRA_EVENT_BUFFER`: event channel capacity (default: 64)
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_concurrent_purchases: usize = std::env::var("VENDRA_MAX_CONCURRENT_PURCHASES")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("VENDRA_MAX_CONCURRENT_PURCHASES", "must be a positive integer")
            })?;
        if max_concurrent_purchases == 0 {
            return Err(ConfigError::Invalid(
                "VENDRA_MAX_CONCURRENT_PURCHASES",
                "must be a positive integer",
            ));
        }

        let event_buffer: usize = std::env::var("VENDRA_EVENT_BUFFER")
            .unwrap_or_else(|_| "64".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("VENDRA_EVENT_BUFFER", "must be a positive integer"))?;
        if event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "VENDRA_EVENT_BUFFER",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            max_concurrent_purchases,
            event_buffer,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
