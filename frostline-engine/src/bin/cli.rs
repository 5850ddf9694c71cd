//! Command-line interface for frostline.
//!
//! This binary provides a CLI for inspecting the running engine via the
//! HTTP API.

use std::env;

use anyhow::Result;

use frostline_engine::api_client;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: frostline-cli <command>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  status    Show engine status");
        eprintln!();
        eprintln!("Environment:");
        eprintln!("  FROSTLINE_API_URL    API base URL (default: http://127.0.0.1:7944)");
        std::process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "status" => cmd_status().await?,
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Build an API client, honoring FROSTLINE_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("FROSTLINE_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

/// Print a summary of the current engine state.
async fn cmd_status() -> Result<()> {
    let client = make_client();
    let state = client.get_health().await?;

    println!("Status:      {}", state.status);
    println!("Uptime:      {} s", state.uptime_secs);
    println!(
        "Buffers:     telemetry {}, doors {}, alerts {}",
        state.buffers.telemetry, state.buffers.door_events, state.buffers.alerts
    );
    println!(
        "Counts:      {} defrosting, {} doors open, {} in maintenance",
        state.defrosting, state.doors_open, state.in_maintenance
    );

    if state.sensors.is_empty() {
        println!("Sensors: (none)");
    } else {
        println!("Sensors:");
        for sensor in &state.sensors {
            println!(
                "  - {} [{}] {:.1}°C {:.0}% batt:{}% {} ({}s ago)",
                sensor.name,
                sensor.mac,
                sensor.temp,
                sensor.humidity,
                sensor.battery_percent,
                sensor.status,
                sensor.seconds_since_reading,
            );
        }
    }

    if !state.gateways.is_empty() {
        println!("Gateways:");
        for gateway in &state.gateways {
            println!(
                "  - {} [{}] last seen {}s ago",
                gateway.mac, gateway.source, gateway.seconds_since_seen
            );
        }
    }

    Ok(())
}
