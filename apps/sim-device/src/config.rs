// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load and validate the TOML description of the simulated device.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Device description loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use uasim_proto::{Endpoint, Value, ValueTag};

/// Endpoint advertised when the configuration omits one.
pub const DEFAULT_ENDPOINT: &str = "opc.tcp://0.0.0.0:4840/freeopcua/server/";

/// Namespace URI registered for the device nodes by default.
pub const DEFAULT_NAMESPACE_URI: &str = "http://examples.freeopcua.github.io";

/// Default interval between generator ticks.
pub const DEFAULT_TICK_MS: u64 = 2_000;

/// Errors raised while loading a device configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read device config {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("invalid device config TOML in {path}: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: toml::de::Error,
    },
    /// The configuration parsed but violates a constraint.
    #[error("invalid device config: {0}")]
    Invalid(String),
}

/// Description of the simulated device and its server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Endpoint address the server listens on.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Human-readable server name.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// Namespace URI registered for the device nodes.
    #[serde(default = "default_namespace_uri")]
    pub namespace_uri: String,
    /// Generator tick interval in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Device object and its variables.
    pub device: DeviceSection,
}

/// Device object description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSection {
    /// Browse name of the device object.
    pub name: String,
    /// Variables in creation order.
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
}

/// Variable description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    /// Browse name.
    pub name: String,
    /// Initial value; optional only for clock variables.
    #[serde(default)]
    pub initial: Option<Value>,
    /// Whether external writes are accepted.
    #[serde(default)]
    pub writable: bool,
    /// Random drift applied on every tick.
    #[serde(default)]
    pub drift: Option<DriftConfig>,
    /// Set to wall-clock time on every tick.
    #[serde(default)]
    pub clock: bool,
}

/// Drift parameters: `baseline + U[0, 1) * amplitude`, rounded to `precision` digits.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriftConfig {
    /// Lower bound of the generated value.
    pub baseline: f64,
    /// Width of the random band; must be non-negative.
    pub amplitude: f64,
    /// Decimal digits kept after rounding.
    #[serde(default)]
    pub precision: u32,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_owned()
}

fn default_server_name() -> String {
    "Simulated field device".to_owned()
}

fn default_namespace_uri() -> String {
    DEFAULT_NAMESPACE_URI.to_owned()
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let drifting = |name: &str, initial: f64, baseline: f64, amplitude: f64| VariableConfig {
            name: name.to_owned(),
            initial: Some(Value::Float(initial)),
            writable: true,
            drift: Some(DriftConfig {
                baseline,
                amplitude,
                precision: 2,
            }),
            clock: false,
        };
        Self {
            endpoint: default_endpoint(),
            server_name: default_server_name(),
            namespace_uri: default_namespace_uri(),
            tick_ms: DEFAULT_TICK_MS,
            device: DeviceSection {
                name: "MyDevice".to_owned(),
                variables: vec![
                    drifting("Temperature", 25.0, 20.0, 10.0),
                    drifting("Humidity", 60.0, 50.0, 30.0),
                    drifting("Pressure", 101.3, 101.0, 1.0),
                    VariableConfig {
                        name: "CurrentTime".to_owned(),
                        initial: None,
                        writable: false,
                        drift: None,
                        clock: true,
                    },
                ],
            },
        }
    }
}

impl DeviceConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Endpoint::parse(&self.endpoint).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be greater than zero".into()));
        }
        if self.device.name.is_empty() {
            return Err(ConfigError::Invalid("device name must not be empty".into()));
        }
        let mut seen = Vec::with_capacity(self.device.variables.len());
        for variable in &self.device.variables {
            if seen.contains(&variable.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "variable '{}' is declared twice",
                    variable.name
                )));
            }
            seen.push(variable.name.as_str());
            variable.validate()?;
        }
        Ok(())
    }

    /// Tick interval as a duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl VariableConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid(format!("variable '{}': {reason}", self.name));
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("variable names must not be empty".into()));
        }
        if self.clock && self.drift.is_some() {
            return Err(invalid("clock and drift are mutually exclusive"));
        }
        if self.clock {
            if let Some(initial) = &self.initial {
                if initial.tag() != ValueTag::Timestamp {
                    return Err(invalid("clock variables must start with a Timestamp value"));
                }
            }
            return Ok(());
        }
        let Some(initial) = &self.initial else {
            return Err(invalid("an initial value is required"));
        };
        if let Some(drift) = &self.drift {
            if initial.tag() != ValueTag::Float {
                return Err(invalid("drift requires a Float initial value"));
            }
            if !drift.baseline.is_finite() {
                return Err(invalid("drift baseline must be finite"));
            }
            if !drift.amplitude.is_finite() || drift.amplitude < 0.0 {
                return Err(invalid("drift amplitude must be finite and non-negative"));
            }
        }
        Ok(())
    }
}
