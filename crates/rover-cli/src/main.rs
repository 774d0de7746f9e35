//! `roverd` – the rover daemon.
//!
//! 1. Loads `~/.rover/config.toml` (or `$ROVER_CONFIG`), writing the
//!    defaults on first run, then applies `ROVER_*` overrides.
//! 2. Initialises tracing (optionally exporting spans over OTLP).
//! 3. Builds the hardware bundle and assembles the [`Rover`].
//! 4. Serves the cockpit until **Ctrl-C**, then engages the interlock and
//!    stops every subsystem before exiting.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::watch;
use tracing::{info, warn};

use rover_cockpit::CockpitServer;
use rover_hal::RoverHardware;
use rover_hal::sim::SimHardware;
use rover_runtime::{Rover, init_tracing};

use crate::config::{Config, HardwareBackend, HardwareConfig};

fn main() -> ExitCode {
    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    // ── Tracing ───────────────────────────────────────────────────────────
    // Installed before the tokio runtime exists; the OTLP exporter is
    // synchronous.
    let _otel_guard = init_tracing("roverd", cfg.log_format, cfg.otlp_endpoint.as_deref());

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – engaging interlock and shutting down …"
                .yellow()
                .bold()
        );
        let _ = stop_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start tokio runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, stop_rx)) {
        Ok(()) => {
            println!("{}", "  ✓ Rover stopped cleanly.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "roverd".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config, stop_rx: watch::Receiver<bool>) -> Result<(), String> {
    let hw = build_hardware(&cfg.hardware);
    info!(backend = %cfg.hardware.backend, "hardware selected");

    let rover = Rover::assemble(hw, cfg.rover_config())
        .await
        .map_err(|e| format!("rover assembly failed: {e}"))?;
    let rover = Arc::new(rover);

    println!(
        "  Cockpit on {}  (backend: {})\n",
        format!("http://localhost:{}", cfg.http_port).bold().cyan(),
        cfg.hardware.backend.to_string().bold()
    );

    let served = CockpitServer::new(Arc::clone(&rover))
        .with_port(cfg.http_port)
        .with_ack(cfg.ack_commands)
        .run_until(stop_rx)
        .await;

    let failures = rover.shutdown().await;
    for (subsystem, err) in &failures {
        println!("  {} {} did not stop cleanly: {}", "✗".red(), subsystem.bold(), err);
    }

    served.map_err(|e| format!("cockpit server failed: {e}"))?;
    if failures.is_empty() {
        Ok(())
    } else {
        Err(format!("{} subsystem(s) failed to stop", failures.len()))
    }
}

/// Build the driver bundle for the configured backend.
fn build_hardware(hw: &HardwareConfig) -> RoverHardware {
    match hw.backend {
        HardwareBackend::None => RoverHardware::new(),
        HardwareBackend::Sim => {
            let mut sim = SimHardware::new()
                .with_drive_base()
                .with_servo()
                .with_headlight();
            if hw.enable_audio {
                sim = sim.with_audio();
            }
            if hw.enable_video {
                sim = sim.with_camera();
            }
            if hw.enable_display {
                sim = sim.with_display(128, 64);
            }
            sim.build().0
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____                      "#.bold().cyan());
    println!("{}", r#"  / __ \____ _   _____  _____"#.bold().cyan());
    println!("{}", r#" / /_/ / __ \ | / / _ \/ ___/"#.bold().cyan());
    println!("{}", r#"/ _, _/ /_/ / |/ /  __/ /    "#.bold().cyan());
    println!("{}", r#"/_/ |_|\____/|___/\___/_/     "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "roverd".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Rover control plane");
    println!();
}
