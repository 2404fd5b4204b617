// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Run the simulated field device with its telemetry generator and TCP server.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the simulated field device.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, LevelFilter};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uasim_proto::Endpoint;

use sim_device::{build_device, AddressSpace, DeviceConfig, DeviceServer, TelemetryGenerator};

/// Simulated device command-line arguments.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Simulated field device", long_about = None)]
struct Cli {
    /// TOML device description; the built-in MyDevice layout is used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address overriding the host and port of the configured endpoint.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Generator tick interval in milliseconds.
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Enable verbose logging.
    #[arg(long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn load_config(cli: &Cli) -> Result<DeviceConfig> {
    let mut config = match &cli.config {
        Some(path) => DeviceConfig::load(path)
            .with_context(|| format!("failed to load device config {}", path.display()))?,
        None => DeviceConfig::default(),
    };
    if let Some(tick_ms) = cli.tick_ms {
        config.tick_ms = tick_ms;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    let mut endpoint = Endpoint::parse(&config.endpoint).context("invalid endpoint")?;
    if let Some(listen) = cli.listen {
        endpoint = endpoint.with_host_port(listen.ip().to_string(), listen.port());
    }

    let mut space = AddressSpace::new();
    let layout = build_device(&mut space, &config)
        .map_err(|err| anyhow!("failed to build device '{}': {err}", config.device.name))?;
    let space = space.into_shared();
    let generator = TelemetryGenerator::new(space.clone(), layout.generator.clone())?;
    let server = DeviceServer::new(space);

    let listener = TcpListener::bind(endpoint.socket_address())
        .await
        .with_context(|| format!("failed to bind {endpoint}"))?;
    info!(
        "{} serving {} ({} variables) at {endpoint}",
        config.server_name,
        config.device.name,
        layout.variables.len()
    );

    let cancel = CancellationToken::new();
    let mut generator_task = tokio::spawn(generator.run(cancel.child_token()));
    let server_task = tokio::spawn(sim_device::tcp::serve(
        listener,
        server.clone(),
        cancel.child_token(),
    ));

    let finished_early = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("shutting down");
            None
        }
        finished = &mut generator_task => Some(finished),
    };
    cancel.cancel();
    server.shutdown();

    let ticks = match finished_early {
        Some(finished) => finished.context("generator task panicked")??,
        None => generator_task.await.context("generator task panicked")??,
    };
    server_task.await.context("server task panicked")??;
    info!("generator stopped after {ticks} ticks");
    Ok(())
}
