// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Simulated field device: address space, telemetry generator and servers.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Simulated field device.
//!
//! The device publishes a small hierarchical address space rooted at the
//! Objects folder. A [`TelemetryGenerator`] drifts its sensor variables on a
//! fixed cadence while clients browse, read and write it through a
//! [`DeviceServer`], either in-process or over the [`tcp`] line server.

pub mod address_space;
pub mod config;
pub mod device;
pub mod generator;
pub mod server;
pub mod tcp;

pub use address_space::{AddressSpace, SharedAddressSpace};
pub use config::{ConfigError, DeviceConfig, DriftConfig, VariableConfig};
pub use device::{build_device, DeviceLayout};
pub use generator::{Channel, ChannelSource, GeneratorConfig, GeneratorError, TelemetryGenerator};
pub use server::{dispatch, ConnectionClosed, DeviceConnection, DeviceServer};
