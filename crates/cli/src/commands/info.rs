//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{resolve_topic, vehicle_topic, TrackingBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    broker: BrokerInfo,
    stream: StreamInfo,
    vehicles: Vec<VehicleInfo>,
}

#[derive(Serialize)]
struct BrokerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    heartbeat_ms: u64,
    connect_timeout_ms: u64,
    publish_destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reconnect_max_attempts: Option<u32>,
}

#[derive(Serialize)]
struct StreamInfo {
    by_car: bool,
    throttle_ms: u64,
    max_path: usize,
    stale_after_ms: u64,
    request_on_connect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic_override: Option<String>,
}

#[derive(Serialize)]
struct VehicleInfo {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args.topics);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args.topics);
    }

    Ok(())
}

/// Topic a vehicle would be subscribed on
fn topic_for(blueprint: &TrackingBlueprint, id: &contracts::VehicleId) -> String {
    if blueprint.vehicles.len() > 1 {
        vehicle_topic(id)
    } else {
        resolve_topic(
            Some(id),
            blueprint.stream.by_car,
            blueprint.stream.topic_override.as_deref(),
        )
    }
}

fn build_config_info(blueprint: &TrackingBlueprint, topics: bool) -> ConfigInfo {
    let broker = &blueprint.broker;
    let stream = &blueprint.stream;

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        broker: BrokerInfo {
            endpoint: broker.endpoint().map(str::to_string),
            heartbeat_ms: broker.heartbeat_ms,
            connect_timeout_ms: broker.connect_timeout_ms,
            publish_destination: broker.publish_destination.clone(),
            reconnect_max_attempts: broker.reconnect.as_ref().map(|r| r.max_attempts),
        },
        stream: StreamInfo {
            by_car: stream.by_car,
            throttle_ms: stream.throttle_ms,
            max_path: stream.max_path,
            stale_after_ms: stream.stale_after_ms,
            request_on_connect: stream.request_on_connect,
            topic_override: stream.topic_override.clone(),
        },
        vehicles: blueprint
            .vehicles
            .iter()
            .map(|id| VehicleInfo {
                id: id.to_string(),
                topic: topics.then(|| topic_for(blueprint, id)),
            })
            .collect(),
    }
}

fn print_config_info(blueprint: &TrackingBlueprint, topics: bool) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Fleet Track Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let broker = &blueprint.broker;
    println!("📡 Broker");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!(
        "   ├─ Endpoint: {}",
        broker.endpoint().unwrap_or("(unset, connector disabled)")
    );
    println!("   ├─ Heartbeat: {}ms", broker.heartbeat_ms);
    println!("   ├─ Publish destination: {}", broker.publish_destination);
    match &broker.reconnect {
        Some(policy) => println!(
            "   └─ Reconnect: up to {} attempts ({}ms → {}ms)",
            policy.max_attempts, policy.initial_delay_ms, policy.max_delay_ms
        ),
        None => println!("   └─ Reconnect: disabled"),
    }

    let stream = &blueprint.stream;
    println!("\n⚙️  Stream");
    println!("   ├─ Per-vehicle topics: {}", stream.by_car);
    println!("   ├─ Throttle: {}ms", stream.throttle_ms);
    println!("   ├─ Max path: {}", stream.max_path);
    println!("   ├─ Stale after: {}ms", stream.stale_after_ms);
    if let Some(ref topic) = stream.topic_override {
        println!("   ├─ Topic override: {}", topic);
    }
    println!("   └─ Request on connect: {}", stream.request_on_connect);

    println!("\n🚗 Vehicles ({})", blueprint.vehicles.len());
    if blueprint.vehicles.is_empty() {
        println!("   └─ (all vehicles on the shared topic)");
    }
    for (i, id) in blueprint.vehicles.iter().enumerate() {
        let is_last = i == blueprint.vehicles.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        if topics {
            println!("   {} {} → {}", prefix, id, topic_for(blueprint, id));
        } else {
            println!("   {} {}", prefix, id);
        }
    }

    println!();
}
