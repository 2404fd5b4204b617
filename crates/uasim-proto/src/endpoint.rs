// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Parse device endpoint addresses of the form scheme://host:port/path.
// Author: Lukas Bower

//! Device endpoint addresses.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

/// Port used when an endpoint omits one.
pub const DEFAULT_PORT: u16 = 4840;

/// Parsed endpoint address identifying host, port and service path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
    path: String,
}

/// Failure to parse an endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The address is not a URL.
    #[error("invalid endpoint '{address}': {reason}")]
    Malformed {
        /// Offending address.
        address: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// The address has no host component.
    #[error("endpoint '{0}' has no host")]
    MissingHost(String),
}

impl Endpoint {
    /// Parse an endpoint address.
    pub fn parse(address: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(address).map_err(|err| EndpointError::Malformed {
            address: address.to_owned(),
            reason: err.to_string(),
        })?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| EndpointError::MissingHost(address.to_owned()))?;
        let path = if url.path().is_empty() {
            "/".to_owned()
        } else {
            url.path().to_owned()
        };
        Ok(Self {
            scheme: url.scheme().to_owned(),
            host: host.to_owned(),
            port: url.port().unwrap_or(DEFAULT_PORT),
            path,
        })
    }

    /// URL scheme, e.g. `opc.tcp`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Service path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port` form suitable for socket APIs.
    #[must_use]
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Return a copy of the endpoint bound to another host and port.
    #[must_use]
    pub fn with_host_port(&self, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: self.scheme.clone(),
            host: host.into(),
            port,
            path: self.path.clone(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.scheme, self.host, self.port, self.path
        )
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        Self::parse(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_endpoint() {
        let endpoint = Endpoint::parse("opc.tcp://localhost:4840/freeopcua/server/").expect("parse");
        assert_eq!(endpoint.scheme(), "opc.tcp");
        assert_eq!(endpoint.host(), "localhost");
        assert_eq!(endpoint.port(), 4840);
        assert_eq!(endpoint.path(), "/freeopcua/server/");
        assert_eq!(endpoint.socket_address(), "localhost:4840");
    }

    #[test]
    fn missing_port_uses_default() {
        let endpoint = Endpoint::parse("opc.tcp://10.0.0.5/OPCUA/SimulationServer").expect("parse");
        assert_eq!(endpoint.port(), DEFAULT_PORT);
    }

    #[test]
    fn rejects_addresses_without_host() {
        assert!(Endpoint::parse("not an endpoint").is_err());
        assert!(matches!(
            Endpoint::parse("opc.tcp:///path"),
            Err(EndpointError::MissingHost(_))
        ));
    }

    #[test]
    fn rebinding_keeps_scheme_and_path() {
        let endpoint = Endpoint::parse("opc.tcp://0.0.0.0:4840/freeopcua/server/").expect("parse");
        let local = endpoint.with_host_port("127.0.0.1", 5000);
        assert_eq!(local.to_string(), "opc.tcp://127.0.0.1:5000/freeopcua/server/");
    }
}
