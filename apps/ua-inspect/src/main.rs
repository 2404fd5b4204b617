// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for inspecting a simulated device over TCP.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the address-space inspector.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::LevelFilter;
use tokio_util::sync::CancellationToken;
use uasim_proto::{Endpoint, NodeRef, Value, ValueTag};

use ua_inspect::{
    discover, locate, report, split_browse_path, watch_until, DiscoveryOptions, JsonSink,
    NamePatterns, ReportSink, SessionOptions, TcpConnector, TcpTransport, TextSink,
    TransportSession, WatchOptions,
};

const DEFAULT_ENDPOINT: &str = "opc.tcp://localhost:4840/freeopcua/server/";

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Inspector command-line arguments.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Address-space inspector", long_about = None)]
struct Cli {
    /// Device endpoint.
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: Endpoint,

    /// Bound on establishing the connection, in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    connect_timeout_ms: u64,

    /// Bound on each request, in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    timeout_ms: u64,

    /// Output format for discovery and watch results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging.
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the namespace array.
    Namespaces,
    /// Walk the address space below a node.
    Browse {
        /// Node to start from.
        #[arg(long, default_value_t = NodeRef::objects_folder())]
        root: NodeRef,
        /// Deepest level browsed below the root.
        #[arg(long, default_value_t = 3)]
        depth: usize,
        /// Case-insensitive browse-name pattern; repeatable.
        #[arg(long = "pattern")]
        patterns: Vec<String>,
        /// Print only matched nodes.
        #[arg(long, requires = "patterns")]
        matched_only: bool,
    },
    /// Read a variable value.
    Read {
        /// Variable to read.
        node: NodeRef,
    },
    /// Write a variable value.
    Write {
        /// Variable to write.
        node: NodeRef,
        /// Value text.
        value: String,
        /// Value type; defaults to the type of the current value.
        #[arg(long = "type")]
        tag: Option<ValueTag>,
    },
    /// Resolve a `/`-separated browse path to a node.
    Locate {
        /// Browse path such as `MyDevice/Temperature`.
        path: String,
        /// Node the path starts from.
        #[arg(long, default_value_t = NodeRef::objects_folder())]
        from: NodeRef,
    },
    /// Poll variable values on a fixed cadence.
    Watch {
        /// Variables to sample.
        #[arg(required = true)]
        nodes: Vec<NodeRef>,
        /// Delay between rounds, in milliseconds.
        #[arg(long, default_value_t = 1_000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
        /// Number of rounds.
        #[arg(long, default_value_t = 10)]
        rounds: u32,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn make_sink(format: OutputFormat, matched_only: bool) -> Box<dyn ReportSink> {
    let stdout = io::stdout();
    match format {
        OutputFormat::Text => Box::new(TextSink::new(stdout).matched_only(matched_only)),
        OutputFormat::Json => Box::new(JsonSink::new(stdout)),
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let options = SessionOptions {
        connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
        call_timeout: Duration::from_millis(cli.timeout_ms),
    };
    let session = TransportSession::connect(&TcpConnector, cli.endpoint.clone(), options).await?;
    let outcome = run(&session, cli.command, cli.format).await;
    session.close().await.ok();
    outcome
}

async fn run(
    session: &TransportSession<TcpTransport>,
    command: Command,
    format: OutputFormat,
) -> Result<()> {
    let mut stdout = io::stdout();
    match command {
        Command::Namespaces => {
            for (index, uri) in session.namespace_array().await?.iter().enumerate() {
                writeln!(stdout, "[{index}] {uri}")?;
            }
        }
        Command::Browse {
            root,
            depth,
            patterns,
            matched_only,
        } => {
            let patterns = (!patterns.is_empty()).then(|| NamePatterns::new(&patterns));
            let options = DiscoveryOptions {
                max_depth: depth,
                patterns,
            };
            let discovery = discover(session, root, options).with_cancellation(cancel_on_ctrl_c());
            let mut sink = make_sink(format, matched_only);
            report(discovery, sink.as_mut()).await?;
        }
        Command::Read { node } => {
            let value = session
                .read_value(&node)
                .await
                .with_context(|| format!("failed to read {node}"))?;
            writeln!(stdout, "{node}: {value} ({})", value.tag())?;
        }
        Command::Write { node, value, tag } => {
            let tag = match tag {
                Some(tag) => tag,
                None => session
                    .read_value(&node)
                    .await
                    .with_context(|| format!("failed to read the current type of {node}"))?
                    .tag(),
            };
            let value = Value::parse_as(tag, &value)?;
            session
                .write_value(&node, value.clone())
                .await
                .with_context(|| format!("failed to write {node}"))?;
            writeln!(stdout, "{node} <- {value}")?;
        }
        Command::Locate { path, from } => {
            let segments = split_browse_path(&path);
            let node = locate(session, &from, &segments).await?;
            writeln!(stdout, "{path}: {node}")?;
        }
        Command::Watch {
            nodes,
            interval_ms,
            rounds,
        } => {
            let options = WatchOptions {
                interval: Duration::from_millis(interval_ms),
                rounds,
            };
            let mut sink = make_sink(format, false);
            watch_until(session, &nodes, options, sink.as_mut(), &cancel_on_ctrl_c()).await?;
        }
    }
    Ok(())
}
