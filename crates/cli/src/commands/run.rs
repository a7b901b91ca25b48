//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{ReconnectPolicy, TrackingBlueprint, VehicleId};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig, TrackMode};

/// Endpoint default when neither the flag nor the file sets one
pub const ENDPOINT_ENV: &str = "FLEET_STREAM_ENDPOINT";

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let mut blueprint = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No configuration file, using defaults");
            TrackingBlueprint::default()
        }
    };

    apply_overrides(&mut blueprint, args, std::env::var(ENDPOINT_ENV).ok());
    config_loader::ConfigLoader::validate(&blueprint)
        .context("Configuration invalid after applying command-line overrides")?;

    let mode = track_mode(&blueprint, args);
    info!(
        endpoint = blueprint.broker.endpoint().unwrap_or("<unset>"),
        mode = ?mode,
        throttle_ms = blueprint.stream.throttle_ms,
        max_path = blueprint.stream.max_path,
        reconnect = blueprint.broker.reconnect.is_some(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint, &mode);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        mode,
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
        request: args.request,
        follow: args.follow.as_deref().map(VehicleId::from),
        render_interval: Duration::from_millis(args.render_interval_ms.max(50)),
        mock: args.mock,
    });

    info!("Starting stream...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Stream run failed")?;

    info!(
        accepted = stats.metrics.total_accepted(),
        received = stats.metrics.total_received(),
        duration_secs = stats.duration.as_secs_f64(),
        "Run completed"
    );
    stats.print_summary();

    info!("Fleet Track finished");
    Ok(())
}

/// Flags override file values; the environment only fills a missing endpoint
fn apply_overrides(blueprint: &mut TrackingBlueprint, args: &RunArgs, env_endpoint: Option<String>) {
    if let Some(endpoint) = &args.endpoint {
        info!(endpoint = %endpoint, "Overriding broker endpoint from CLI");
        blueprint.broker.endpoint = Some(endpoint.clone());
    } else if blueprint.broker.endpoint().is_none() {
        if let Some(endpoint) = env_endpoint.filter(|e| !e.trim().is_empty()) {
            info!(endpoint = %endpoint, "Using broker endpoint from {}", ENDPOINT_ENV);
            blueprint.broker.endpoint = Some(endpoint);
        }
    }

    if !args.vehicles.is_empty() {
        blueprint.vehicles = args.vehicles.iter().map(VehicleId::from).collect();
    }
    if let Some(throttle_ms) = args.throttle_ms {
        blueprint.stream.throttle_ms = throttle_ms;
    }
    if let Some(max_path) = args.max_path {
        blueprint.stream.max_path = max_path;
    }
    if args.debug {
        blueprint.stream.debug = true;
    }
    if args.reconnect && blueprint.broker.reconnect.is_none() {
        blueprint.broker.reconnect = Some(ReconnectPolicy::default());
    }
    if args.request {
        blueprint.stream.request_on_connect = true;
    }
}

fn track_mode(blueprint: &TrackingBlueprint, args: &RunArgs) -> TrackMode {
    if args.all {
        return TrackMode::Single(None);
    }
    match blueprint.vehicles.as_slice() {
        [] if args.multi => TrackMode::Multi(Vec::new()),
        [] => TrackMode::Single(None),
        [one] if !args.multi => TrackMode::Single(Some(one.clone())),
        many => TrackMode::Multi(many.to_vec()),
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &TrackingBlueprint, mode: &TrackMode) {
    println!("\n=== Configuration Summary ===\n");
    println!("Broker:");
    println!(
        "  Endpoint: {}",
        blueprint.broker.endpoint().unwrap_or("(unset, connector disabled)")
    );
    println!("  Publish destination: {}", blueprint.broker.publish_destination);
    match &blueprint.broker.reconnect {
        Some(policy) => println!(
            "  Reconnect: {} attempts, {}ms..{}ms x{}",
            policy.max_attempts, policy.initial_delay_ms, policy.max_delay_ms, policy.multiplier
        ),
        None => println!("  Reconnect: disabled"),
    }

    println!("\nStream:");
    println!("  Throttle: {}ms", blueprint.stream.throttle_ms);
    println!("  Max path: {}", blueprint.stream.max_path);
    println!("  Stale after: {}ms", blueprint.stream.stale_after_ms);

    match mode {
        TrackMode::Single(Some(id)) => println!("\nTracking: {id} (single stream)"),
        TrackMode::Single(None) => println!("\nTracking: all vehicles (shared topic)"),
        TrackMode::Multi(ids) => {
            println!("\nTracking {} vehicles:", ids.len());
            for id in ids {
                println!("  - {id}");
            }
        }
    }

    if !blueprint.stream.by_car {
        warn!("by_car = false: single streams subscribe to the shared topic");
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["fleet-track", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Run(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_endpoint_precedence() {
        let mut bp = TrackingBlueprint::default();
        apply_overrides(&mut bp, &run_args(&[]), Some("ws://env:1/ws".into()));
        assert_eq!(bp.broker.endpoint(), Some("ws://env:1/ws"));

        let mut bp = TrackingBlueprint::default();
        bp.broker.endpoint = Some("ws://file:1/ws".into());
        apply_overrides(&mut bp, &run_args(&[]), Some("ws://env:1/ws".into()));
        assert_eq!(bp.broker.endpoint(), Some("ws://file:1/ws"));

        apply_overrides(
            &mut bp,
            &run_args(&["--endpoint", "ws://flag:1/ws"]),
            Some("ws://env:1/ws".into()),
        );
        assert_eq!(bp.broker.endpoint(), Some("ws://flag:1/ws"));
    }

    #[test]
    fn test_stream_overrides() {
        let mut bp = TrackingBlueprint::default();
        apply_overrides(
            &mut bp,
            &run_args(&["--throttle-ms", "0", "--max-path", "10", "--reconnect"]),
            None,
        );
        assert_eq!(bp.stream.throttle_ms, 0);
        assert_eq!(bp.stream.max_path, 10);
        assert_eq!(bp.broker.reconnect, Some(ReconnectPolicy::default()));
    }

    #[test]
    fn test_track_mode_selection() {
        let mut bp = TrackingBlueprint::default();
        assert_eq!(track_mode(&bp, &run_args(&[])), TrackMode::Single(None));

        bp.vehicles = vec!["a".into()];
        assert_eq!(
            track_mode(&bp, &run_args(&[])),
            TrackMode::Single(Some("a".into()))
        );
        assert_eq!(
            track_mode(&bp, &run_args(&["--multi"])),
            TrackMode::Multi(vec!["a".into()])
        );
        assert_eq!(track_mode(&bp, &run_args(&["--all"])), TrackMode::Single(None));

        bp.vehicles.push("b".into());
        assert_eq!(
            track_mode(&bp, &run_args(&[])),
            TrackMode::Multi(vec!["a".into(), "b".into()])
        );
    }
}
