// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Periodic telemetry generator that drifts device variables on a fixed cadence.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Telemetry generator.
//!
//! Every tick writes each configured channel exactly once, in configured
//! order, through the owner write path of the address space. The address
//! space lock is taken per write, so external readers may observe a tick in
//! progress.

use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uasim_proto::{NodeRef, ServiceError, Value};

use crate::address_space::SharedAddressSpace;

/// Source of the value written to a channel on each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelSource {
    /// `baseline + U[0, 1) * amplitude`, rounded to `precision` decimal digits.
    Drift {
        /// Lower bound.
        baseline: f64,
        /// Band width, non-negative.
        amplitude: f64,
        /// Decimal digits kept.
        precision: u32,
    },
    /// Current wall-clock time.
    WallClock,
}

/// One variable driven by the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Target variable.
    pub node: NodeRef,
    /// Value source.
    pub source: ChannelSource,
}

/// Generator cadence and channels.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Interval between ticks.
    pub interval: Duration,
    /// Channels written in order on every tick.
    pub channels: Vec<Channel>,
}

impl GeneratorConfig {
    /// Reject configurations the generator cannot run.
    pub fn validate(&self) -> Result<(), GeneratorError> {
        if self.interval.is_zero() {
            return Err(GeneratorError::Config("tick interval must be positive".into()));
        }
        for channel in &self.channels {
            if let ChannelSource::Drift {
                baseline,
                amplitude,
                ..
            } = channel.source
            {
                if !baseline.is_finite() || !amplitude.is_finite() || amplitude < 0.0 {
                    return Err(GeneratorError::Config(format!(
                        "channel {} has invalid drift (baseline {baseline}, amplitude {amplitude})",
                        channel.node
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Fatal generator failures.
#[derive(Debug, Error, PartialEq)]
pub enum GeneratorError {
    /// The configuration cannot be run.
    #[error("invalid generator config: {0}")]
    Config(String),
    /// A write was rejected; the channel does not match its variable.
    #[error("generator write to {node} failed: {source}")]
    Write {
        /// Channel target.
        node: NodeRef,
        /// Rejection reported by the address space.
        #[source]
        source: ServiceError,
    },
}

/// Periodic task mutating the configured variables.
#[derive(Debug, Clone)]
pub struct TelemetryGenerator {
    space: SharedAddressSpace,
    config: GeneratorConfig,
}

impl TelemetryGenerator {
    /// Bind a generator to an address space.
    pub fn new(space: SharedAddressSpace, config: GeneratorConfig) -> Result<Self, GeneratorError> {
        config.validate()?;
        Ok(Self { space, config })
    }

    /// Configuration driving the generator.
    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Apply a single tick using the supplied random source.
    ///
    /// Returns the values written, in channel order.
    pub fn tick_with<R: Rng>(&self, rng: &mut R) -> Result<Vec<(NodeRef, Value)>, GeneratorError> {
        let mut applied = Vec::with_capacity(self.config.channels.len());
        for channel in &self.config.channels {
            let value = match channel.source {
                ChannelSource::Drift {
                    baseline,
                    amplitude,
                    precision,
                } => Value::Float(round_to(
                    baseline + rng.gen::<f64>() * amplitude,
                    precision,
                )),
                ChannelSource::WallClock => Value::Timestamp(Utc::now()),
            };
            {
                let mut space = self.space.lock().expect("poisoned address space lock");
                space
                    .set_value(&channel.node, value.clone())
                    .map_err(|source| GeneratorError::Write {
                        node: channel.node.clone(),
                        source,
                    })?;
            }
            applied.push((channel.node.clone(), value));
        }
        Ok(applied)
    }

    /// Run until `cancel` fires, returning the number of completed ticks.
    ///
    /// The first tick happens immediately. Cancellation is observed while
    /// waiting for the timer; a tick in progress always completes.
    pub async fn run(self, cancel: CancellationToken) -> Result<u64, GeneratorError> {
        let mut rng = StdRng::from_entropy();
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("telemetry generator cancelled after {ticks} ticks");
                    return Ok(ticks);
                }
                _ = interval.tick() => {
                    let applied = self.tick_with(&mut rng)?;
                    ticks += 1;
                    info!("tick {ticks}: {}", describe(&applied));
                }
            }
        }
    }
}

/// Round `value` to `precision` decimal digits.
#[must_use]
pub fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision.min(15) as i32);
    (value * scale).round() / scale
}

fn describe(applied: &[(NodeRef, Value)]) -> String {
    applied
        .iter()
        .map(|(node, value)| format!("{node}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_keeps_requested_digits() {
        assert_eq!(round_to(25.4567, 2), 25.46);
        assert_eq!(round_to(25.4567, 0), 25.0);
        assert_eq!(round_to(-1.25, 1), -1.3);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = GeneratorConfig {
            interval: Duration::ZERO,
            channels: Vec::new(),
        };
        assert!(matches!(config.validate(), Err(GeneratorError::Config(_))));
    }

    #[test]
    fn negative_amplitude_is_rejected() {
        let config = GeneratorConfig {
            interval: Duration::from_secs(1),
            channels: vec![Channel {
                node: NodeRef::numeric(1, 1),
                source: ChannelSource::Drift {
                    baseline: 0.0,
                    amplitude: -2.0,
                    precision: 1,
                },
            }],
        };
        assert!(config.validate().is_err());
    }
}
