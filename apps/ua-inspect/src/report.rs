// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Render discovery records and watch rounds as text or JSON lines.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Report sinks for discovery records, watch rounds and summaries.

use std::io::{self, Write};

use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::discovery::{Discovery, DiscoveryError, DiscoveryRecord, FaultKind};
use crate::transport::Transport;
use crate::watch::WatchRound;

/// Totals for one discovery run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverySummary {
    /// Records produced.
    pub visited: usize,
    /// Records marked as matched.
    pub matched: usize,
    /// Records carrying at least one fault.
    pub faulted: usize,
}

/// Accumulates a [`DiscoverySummary`] from records.
#[derive(Debug, Default)]
pub struct SummaryBuilder {
    summary: DiscoverySummary,
}

impl SummaryBuilder {
    /// Count `record`.
    pub fn observe(&mut self, record: &DiscoveryRecord) {
        self.summary.visited += 1;
        if record.matched {
            self.summary.matched += 1;
        }
        if record.is_faulted() {
            self.summary.faulted += 1;
        }
    }

    /// Totals so far.
    #[must_use]
    pub fn finish(&self) -> DiscoverySummary {
        self.summary
    }
}

/// Destination for discovery output.
pub trait ReportSink {
    /// Emit one discovery record.
    fn record(&mut self, record: &DiscoveryRecord) -> io::Result<()>;

    /// Emit one watch round.
    fn round(&mut self, round: &WatchRound) -> io::Result<()>;

    /// Emit the totals of a completed run.
    fn finish(&mut self, summary: &DiscoverySummary) -> io::Result<()>;
}

/// Failure while streaming a discovery run into a sink.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The run ended early.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// The sink could not be written.
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
}

/// Stream every record of `discovery` into `sink` and finish with the totals.
pub async fn report<T: Transport>(
    mut discovery: Discovery<'_, T>,
    sink: &mut dyn ReportSink,
) -> Result<DiscoverySummary, ReportError> {
    let mut summary = SummaryBuilder::default();
    while let Some(record) = discovery.next().await {
        let record = record?;
        summary.observe(&record);
        sink.record(&record)?;
    }
    let summary = summary.finish();
    info!(
        "discovery visited {} nodes ({} matched, {} faulted)",
        summary.visited, summary.matched, summary.faulted
    );
    sink.finish(&summary)?;
    Ok(summary)
}

/// Indented human-readable listing.
#[derive(Debug)]
pub struct TextSink<W> {
    writer: W,
    matched_only: bool,
}

impl<W: Write> TextSink<W> {
    /// Print every record to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            matched_only: false,
        }
    }

    /// Print only records marked as matched.
    #[must_use]
    pub fn matched_only(mut self, matched_only: bool) -> Self {
        self.matched_only = matched_only;
        self
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for TextSink<W> {
    fn record(&mut self, record: &DiscoveryRecord) -> io::Result<()> {
        if self.matched_only && !record.matched {
            return Ok(());
        }
        let indent = "  ".repeat(record.depth);
        let name = record.browse_name.as_deref().unwrap_or("?");
        let class = record
            .node_class
            .map_or_else(|| "?".to_owned(), |class| class.to_string());
        let marker = if record.matched { " *" } else { "" };
        writeln!(
            self.writer,
            "{indent}Node: {name}, ID: {}, Class: {class}{marker}",
            record.node_ref
        )?;
        if let Some(value) = &record.value {
            writeln!(self.writer, "{indent}  Value: {value}, Type: {}", value.tag())?;
        }
        for fault in &record.faults {
            let label = match fault.kind {
                FaultKind::Browse => "browsing node",
                FaultKind::Children => "listing children",
                FaultKind::Read => "reading value",
            };
            writeln!(self.writer, "{indent}  Error {label}: {}", fault.error)?;
        }
        Ok(())
    }

    fn round(&mut self, round: &WatchRound) -> io::Result<()> {
        writeln!(
            self.writer,
            "Read #{} - {}:",
            round.round,
            round.started_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        for sample in &round.samples {
            match &sample.outcome {
                Ok(value) => writeln!(self.writer, "  {}: {value}", sample.node)?,
                Err(err) => writeln!(self.writer, "  {}: error: {err}", sample.node)?,
            }
        }
        Ok(())
    }

    fn finish(&mut self, summary: &DiscoverySummary) -> io::Result<()> {
        writeln!(
            self.writer,
            "{} nodes visited, {} matched, {} with faults",
            summary.visited, summary.matched, summary.faulted
        )?;
        self.writer.flush()
    }
}

/// One JSON object per line.
#[derive(Debug)]
pub struct JsonSink<W> {
    writer: W,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JsonLine<'a> {
    Record(&'a DiscoveryRecord),
    Round(&'a WatchRound),
    Summary(&'a DiscoverySummary),
}

impl<W: Write> JsonSink<W> {
    /// Write JSON lines to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn emit(&mut self, line: &JsonLine<'_>) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn record(&mut self, record: &DiscoveryRecord) -> io::Result<()> {
        self.emit(&JsonLine::Record(record))
    }

    fn round(&mut self, round: &WatchRound) -> io::Result<()> {
        self.emit(&JsonLine::Round(round))
    }

    fn finish(&mut self, summary: &DiscoverySummary) -> io::Result<()> {
        self.emit(&JsonLine::Summary(summary))?;
        self.writer.flush()
    }
}
