//! Fleet monitor example
//!
//! Run with: cargo run --example monitor [PRINTERS_JSON] [MODELS_JSON] [ARCHIVE_DIR]
//!
//! Examples:
//!   cargo run --example monitor                                   # ./printers.json, ./models.json, ./uploads
//!   cargo run --example monitor config/printers.json config/models.json /srv/uploads
//!
//! printers.json:
//!   [{"id": "p1", "name": "Left", "ip": "192.168.1.40",
//!     "accessCode": "12345678", "serialNumber": "01S00A000000000"}]
//!
//! models.json:
//!   {"benchy": {"modelFile": "benchy.glb"}}
//!
//! Every state change is printed as one JSON line. Press Ctrl+C to close all
//! device sessions and exit.

use std::time::Duration;

use printer_telemetry::{DeviceRegistry, ModelResolver, Monitor, MonitorConfig, MqttTransport};

fn print_usage() {
    eprintln!("Usage: monitor [PRINTERS_JSON] [MODELS_JSON] [ARCHIVE_DIR]");
    eprintln!();
    eprintln!("Defaults: printers.json models.json uploads");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let printers_path = args.get(1).map(String::as_str).unwrap_or("printers.json");
    let models_path = args.get(2).map(String::as_str).unwrap_or("models.json");
    let archive_dir = args.get(3).map(String::as_str).unwrap_or("uploads");

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("printer_telemetry=info".parse()?)
                .add_directive("monitor=debug".parse()?),
        )
        .init();

    // Configuration errors are fatal before any connection is made
    let devices = match DeviceRegistry::load(printers_path) {
        Ok(devices) => devices,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };
    let models = ModelResolver::load(models_path)?;

    let config = MonitorConfig::with_archive_dir(archive_dir).poll_interval(Duration::from_secs(30));

    println!(
        "Monitoring {} printer(s), {} model mapping(s)",
        devices.len(),
        models.len()
    );

    let handle = Monitor::start(config, devices, models, MqttTransport::new());
    let mut updates = handle.subscribe().await?;

    for state in &updates.snapshot {
        println!("{}", serde_json::to_string(state)?);
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(state) => {
                    println!("{}", serde_json::to_string(&state)?);

                    if !state.current_file.is_empty() {
                        if let Some(png) = handle.thumbnail_for_gcode(&state.current_file).await {
                            tracing::debug!(
                                device = %state.id,
                                size = png.len(),
                                "Thumbnail available"
                            );
                        }
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    handle.shutdown().await?;

    Ok(())
}
