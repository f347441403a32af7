// Copyright 2025 Cowboy AI, LLC.

//! Registry configuration

use std::num::NonZeroUsize;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::MixinResult;

/// Configuration for a [`MixinRegistry`](crate::MixinRegistry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of composed query classes kept in the cache
    pub cache_capacity: usize,
    /// Freeze the registry the first time a query class is resolved
    pub freeze_on_first_resolve: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            freeze_on_first_resolve: false,
        }
    }
}

impl RegistryConfig {
    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> MixinResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// JSON schema describing this configuration
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RegistryConfig)
    }

    /// Set the cache capacity
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Freeze the registry on first resolve
    pub fn freezing_on_first_resolve(mut self) -> Self {
        self.freeze_on_first_resolve = true;
        self
    }

    /// Cache capacity, never zero
    pub(crate) fn capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
