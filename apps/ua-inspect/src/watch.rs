// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Poll variable values on a fixed cadence for a bounded number of rounds.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Poll variable values in fixed-cadence rounds.

use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uasim_proto::{NodeRef, Value};

use crate::report::ReportSink;
use crate::session::TransportSession;
use crate::transport::{Transport, TransportError};

/// Polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Delay between the start of consecutive rounds.
    pub interval: Duration,
    /// Number of rounds to sample.
    pub rounds: u32,
}

impl WatchOptions {
    /// Reject cadences the poller cannot run.
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.interval.is_zero() {
            return Err(WatchError::Config("watch interval must be positive".into()));
        }
        Ok(())
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            rounds: 10,
        }
    }
}

/// One read of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchSample {
    /// Node read.
    pub node: NodeRef,
    /// Value read, or the recoverable failure.
    pub outcome: Result<Value, TransportError>,
}

/// All samples taken in one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchRound {
    /// Round number starting at 1.
    pub round: u32,
    /// Wall-clock time the round started.
    pub started_at: DateTime<Utc>,
    /// Samples in node order.
    pub samples: Vec<WatchSample>,
}

/// Conditions that end a watch early.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The options cannot be run.
    #[error("invalid watch options: {0}")]
    Config(String),
    /// The session lost its connection.
    #[error("watch aborted: {0}")]
    ConnectionLost(TransportError),
    /// The sink failed to record a round.
    #[error("failed to report watch round: {0}")]
    Sink(#[from] io::Error),
}

/// Sample `nodes` for `options.rounds` rounds.
pub async fn watch<T: Transport>(
    session: &TransportSession<T>,
    nodes: &[NodeRef],
    options: WatchOptions,
    sink: &mut dyn ReportSink,
) -> Result<Vec<WatchRound>, WatchError> {
    watch_until(session, nodes, options, sink, &CancellationToken::new()).await
}

/// Like [`watch`], stopping quietly at the next wait once `cancel` fires.
///
/// Rounds completed before cancellation are returned.
pub async fn watch_until<T: Transport>(
    session: &TransportSession<T>,
    nodes: &[NodeRef],
    options: WatchOptions,
    sink: &mut dyn ReportSink,
    cancel: &CancellationToken,
) -> Result<Vec<WatchRound>, WatchError> {
    options.validate()?;
    let mut ticker = time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rounds = Vec::with_capacity(options.rounds as usize);
    for round in 1..=options.rounds {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("watch cancelled before round {round}");
                break;
            }
            _ = ticker.tick() => {}
        }
        let started_at = Utc::now();
        let mut samples = Vec::with_capacity(nodes.len());
        for node in nodes {
            let outcome = match session.read_value(node).await {
                Err(err) if err.is_fatal() => return Err(WatchError::ConnectionLost(err)),
                Err(err) => {
                    warn!("round {round}: reading {node} failed: {err}");
                    Err(err)
                }
                Ok(value) => Ok(value),
            };
            samples.push(WatchSample {
                node: node.clone(),
                outcome,
            });
        }
        let round = WatchRound {
            round,
            started_at,
            samples,
        };
        sink.round(&round)?;
        rounds.push(round);
    }
    Ok(rounds)
}
