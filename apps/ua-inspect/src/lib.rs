// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Address-space inspector: sessions, discovery, browse paths, watches and reports.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Inspector for the simulated device address space.
//!
//! A [`TransportSession`] wraps any [`Transport`] with per-call timeouts and
//! connection-loss tracking. The discovery engine walks the remote tree
//! through that session only, so it runs unchanged against the in-process
//! server used by tests and the TCP line server used by the binaries.

pub mod discovery;
pub mod path;
pub mod report;
pub mod session;
pub mod transport;
pub mod watch;

pub use discovery::{
    discover, Discovery, DiscoveryError, DiscoveryOptions, DiscoveryRecord, FaultKind,
    NamePatterns, NodeFault,
};
pub use path::{locate, split_browse_path, LocateError};
pub use report::{
    report, DiscoverySummary, JsonSink, ReportError, ReportSink, SummaryBuilder, TextSink,
};
pub use session::{ConnectError, SessionOptions, TransportSession};
pub use transport::{
    Connector, InProcessConnector, InProcessTransport, TcpConnector, TcpTransport, Transport,
    TransportError,
};
pub use watch::{watch, watch_until, WatchError, WatchOptions, WatchRound, WatchSample};
