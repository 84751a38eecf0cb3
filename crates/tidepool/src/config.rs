//! Pool manager configuration

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// PoolConfig
// ---------------------------------------------------------------------------

/// Configuration for the pool manager.
///
/// Immutable after construction; validated once at initialization.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfig {
    /// Minimum number of connections in the pool
    pub min_size: usize,
    /// Maximum number of connections in the pool
    pub max_size: usize,
    /// Pool size at startup (before the sizing advisor runs)
    pub initial_size: usize,
    /// Connections allowed beyond the base size under burst load
    pub max_overflow: usize,
    /// Timeout for acquiring a handle from the pool
    pub acquire_timeout: Duration,
    /// Maximum handle age before forced replacement
    pub recycle_age: Duration,
    /// Whether the adaptive scaling loop runs
    pub scaling_enabled: bool,
    /// Minimum time between two applied scaling decisions
    pub scale_cooldown: Duration,
    /// Connections added per scale-up decision
    pub scale_up_step: usize,
    /// Connections removed per scale-down decision
    pub scale_down_step: usize,
    /// Period of the scaling loop
    pub tick_period: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 5,
            max_size: 100,
            initial_size: 10,
            max_overflow: 10,
            acquire_timeout: Duration::from_secs(30),
            recycle_age: Duration::from_secs(3600),
            scaling_enabled: true,
            scale_cooldown: Duration::from_secs(300),
            scale_up_step: 5,
            scale_down_step: 3,
            tick_period: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Validate the configuration, returning an error if any field is out of
    /// range.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when `0 < min_size <= initial_size <=
    /// max_size` does not hold, or any timing/step field is zero where a zero
    /// value would stall the manager.
    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 {
            return Err(Error::configuration("min_size must be greater than 0"));
        }
        if self.min_size > self.max_size {
            return Err(Error::configuration(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.initial_size < self.min_size || self.initial_size > self.max_size {
            return Err(Error::configuration(format!(
                "initial_size ({}) must be within [{}, {}]",
                self.initial_size, self.min_size, self.max_size
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(Error::configuration(
                "acquire_timeout must be greater than zero",
            ));
        }
        if self.tick_period.is_zero() {
            return Err(Error::configuration(
                "tick_period must be greater than zero",
            ));
        }
        if self.scale_up_step == 0 {
            return Err(Error::configuration("scale_up_step must be > 0"));
        }
        if self.scale_down_step == 0 {
            return Err(Error::configuration("scale_down_step must be > 0"));
        }
        Ok(())
    }

    /// Set the size bounds.
    #[must_use]
    pub fn with_bounds(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    /// Set the startup pool size.
    #[must_use]
    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Enable or disable the adaptive scaling loop.
    #[must_use]
    pub fn with_scaling(mut self, enabled: bool) -> Self {
        self.scaling_enabled = enabled;
        self
    }

    /// Set the scaling cooldown.
    #[must_use]
    pub fn with_scale_cooldown(mut self, cooldown: Duration) -> Self {
        self.scale_cooldown = cooldown;
        self
    }

    /// Set the scaling loop period.
    #[must_use]
    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = tick_period;
        self
    }
}

// ---------------------------------------------------------------------------
// HostResources
// ---------------------------------------------------------------------------

/// Host resources consumed by the sizing advisor.
///
/// Discovery itself happens outside the manager; callers pass the two scalars
/// obtained from whatever system-information source they use.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HostResources {
    /// Number of logical CPU cores
    pub cpu_cores: usize,
    /// Total physical memory in megabytes
    pub total_memory_mb: f64,
}

impl HostResources {
    /// Create a new host resource description.
    #[must_use]
    pub fn new(cpu_cores: usize, total_memory_mb: f64) -> Self {
        Self {
            cpu_cores,
            total_memory_mb,
        }
    }
}
