// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Build the device object and its variables from configuration.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Builds the device object and its variables into an address space.

use chrono::Utc;
use uasim_proto::{NamespaceIndex, NodeRef, ServiceError, Value};

use crate::address_space::AddressSpace;
use crate::config::DeviceConfig;
use crate::generator::{Channel, ChannelSource, GeneratorConfig};

/// Nodes created for the device and the generator wiring derived from them.
#[derive(Debug, Clone)]
pub struct DeviceLayout {
    /// Namespace holding the device nodes.
    pub namespace: NamespaceIndex,
    /// Device object.
    pub device: NodeRef,
    /// Variables in creation order.
    pub variables: Vec<(String, NodeRef)>,
    /// Channels driving the drifting and clock variables.
    pub generator: GeneratorConfig,
}

impl DeviceLayout {
    /// Look up a variable reference by browse name.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&NodeRef> {
        self.variables
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, node)| node)
    }
}

/// Populate `space` with the configured device below the Objects folder.
pub fn build_device(space: &mut AddressSpace, config: &DeviceConfig) -> Result<DeviceLayout, ServiceError> {
    let namespace = space.register_namespace(&config.namespace_uri);
    let root = space.root().clone();
    let device = space.create_object(&root, namespace, &config.device.name)?;
    let mut variables = Vec::with_capacity(config.device.variables.len());
    let mut channels = Vec::new();
    for variable in &config.device.variables {
        let initial = match (&variable.initial, variable.clock) {
            (Some(value), _) => value.clone(),
            (None, true) => Value::Timestamp(Utc::now()),
            (None, false) => Value::Float(0.0),
        };
        let node = space.create_variable(
            &device,
            namespace,
            &variable.name,
            initial,
            variable.writable,
        )?;
        if variable.clock {
            channels.push(Channel {
                node: node.clone(),
                source: ChannelSource::WallClock,
            });
        } else if let Some(drift) = variable.drift {
            channels.push(Channel {
                node: node.clone(),
                source: ChannelSource::Drift {
                    baseline: drift.baseline,
                    amplitude: drift.amplitude,
                    precision: drift.precision,
                },
            });
        }
        variables.push((variable.name.clone(), node));
    }
    Ok(DeviceLayout {
        namespace,
        device,
        variables,
        generator: GeneratorConfig {
            interval: config.tick_interval(),
            channels,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uasim_proto::{NodeClass, ValueTag};

    #[test]
    fn default_device_has_four_typed_variables() {
        let mut space = AddressSpace::new();
        let layout = build_device(&mut space, &DeviceConfig::default()).expect("build");
        assert_eq!(layout.namespace, 1);
        assert_eq!(space.children(space.root()).unwrap(), vec![layout.device.clone()]);
        assert_eq!(space.browse_name(&layout.device).unwrap(), "MyDevice");

        let temperature = layout.variable("Temperature").expect("temperature");
        assert_eq!(space.read_value(temperature).unwrap(), Value::Float(25.0));
        assert!(space.is_writable(temperature).unwrap());

        let clock = layout.variable("CurrentTime").expect("clock");
        assert_eq!(space.node_class(clock).unwrap(), NodeClass::Variable);
        assert_eq!(space.read_value(clock).unwrap().tag(), ValueTag::Timestamp);
        assert!(!space.is_writable(clock).unwrap());

        assert_eq!(layout.generator.channels.len(), 4);
        assert_eq!(layout.generator.channels[3].source, ChannelSource::WallClock);
    }

    #[test]
    fn building_twice_collides_on_device_name() {
        let mut space = AddressSpace::new();
        build_device(&mut space, &DeviceConfig::default()).expect("first");
        assert!(matches!(
            build_device(&mut space, &DeviceConfig::default()),
            Err(ServiceError::DuplicateBrowseName { .. })
        ));
    }
}
