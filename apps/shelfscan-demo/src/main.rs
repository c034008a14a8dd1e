//! # shelfscan Demo
//!
//! Runs the scanner against a simulated two-camera device.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  t=0        start()      status events, capabilities                    │
//! │  t=delay    barcode appears in front of the camera                      │
//! │  t=delay+   result event ──► stop() ──► "Scanning stopped."             │
//! │                                                                         │
//! │  Events go to stdout as JSON lines, logs go to stderr.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use shelfscan_capture::sim::{RecordingSink, SimulatedCamera, SimulatedNativeReaderFactory};
use shelfscan_capture::{ChannelEmitter, ScanController, ScanEvent, ScannerConfig};
use shelfscan_core::Symbology;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CODE: &str = "5901234123457";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (stderr, so stdout stays machine-readable)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting shelfscan demo...");

    let code = std::env::var("SHELFSCAN_DEMO_CODE").unwrap_or_else(|_| DEFAULT_CODE.to_string());
    let symbology = symbology_for(&code)?;
    let delay = Duration::from_millis(env_u64("SHELFSCAN_DEMO_DELAY_MS", 1500));
    let timeout = Duration::from_secs(env_u64("SHELFSCAN_DEMO_TIMEOUT_SECS", 30));

    let config = ScannerConfig::load_or_default(None);
    info!(
        cooldown_ms = config.scan.cooldown_ms,
        after_detection = %config.scan.after_detection,
        prefer_native = config.decoder.prefer_native,
        "Configuration loaded"
    );

    let camera = SimulatedCamera::builder()
        .device("sim-front", "Front Camera", false)
        .device("sim-back", "Back Camera", true)
        .open_delay(Duration::from_millis(150))
        .build();

    let (emitter, mut events) = ChannelEmitter::new();
    let scanner = ScanController::builder(config)
        .with_backend(Arc::new(camera.clone()))
        .with_sink(Arc::new(RecordingSink::new()))
        .with_native_reader(Arc::new(SimulatedNativeReaderFactory::new()))
        .with_emitter(Arc::new(emitter))
        .build()
        .context("failed to build scanner")?;

    tokio::spawn(scanner.start());

    // Put the barcode in front of the camera after a while
    let shown = camera.clone();
    let shown_code = code.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match shown.show_code(&shown_code, symbology) {
            Ok(()) => info!(code = %shown_code, %symbology, "Barcode in view"),
            Err(e) => warn!(error = %e, "Could not render barcode"),
        }
    });

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&event)?);

                match event {
                    ScanEvent::Result { .. } | ScanEvent::Error { .. } => break,
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = &mut deadline => {
                warn!(timeout_secs = timeout.as_secs(), "No barcode read before timeout");
                break;
            }
        }
    }

    scanner.stop().await;

    // Flush whatever stop() emitted
    while let Ok(event) = events.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }

    info!(live_handles = camera.live_handles(), "Demo finished");
    Ok(())
}

/// Picks the symbology that can render `code`.
fn symbology_for(code: &str) -> anyhow::Result<Symbology> {
    if !code.chars().all(|c| c.is_ascii_digit()) {
        bail!("demo code must be digits only, got {:?}", code);
    }
    match code.len() {
        13 => Ok(Symbology::Ean13),
        12 => Ok(Symbology::UpcA),
        8 => Ok(Symbology::Ean8),
        n => bail!("demo code must have 8, 12 or 13 digits, got {}", n),
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbology_for() {
        assert_eq!(symbology_for("5901234123457").unwrap(), Symbology::Ean13);
        assert_eq!(symbology_for("036000291452").unwrap(), Symbology::UpcA);
        assert_eq!(symbology_for("96385074").unwrap(), Symbology::Ean8);
        assert!(symbology_for("12345").is_err());
        assert!(symbology_for("SKU-0042").is_err());
    }
}
