//! Console front-end for the Somno updater.
//!
//! Plays the presentation-collaborator role: loads the config, runs one
//! update session, renders the session's events, and exits non-zero when the
//! upgrade could not complete. Ctrl+C cancels the in-flight download.

use std::io::Write;
use std::path::Path;

use somno_updater::{UpdateConfig, UpdateEvent, UpdateSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("Somno updater v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("SOMNO_UPDATER_CONFIG")
        .unwrap_or_else(|_| "updater.toml".to_string());
    let config = UpdateConfig::load_or_default(Path::new(&config_path));

    let session = UpdateSession::new(config);
    let mut events = session.subscribe();

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            render_event(event);
        }
    });

    let plan = match session.check_for_updates().await? {
        Some(plan) => plan,
        None => {
            println!("No updates available.");
            return Ok(());
        }
    };

    println!(
        "Release {} \"{}\" has {} artifact(s) for {}:",
        plan.release_version,
        plan.codename,
        plan.len(),
        plan.platform
    );
    for label in plan.artifact_labels() {
        println!("  - {}", label);
    }

    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling upgrade");
            cancel.cancel();
        }
    });

    let report = session.run_upgrade(plan).await;
    printer.abort();

    if report.cancelled {
        println!("Upgrade cancelled.");
        std::process::exit(130);
    }
    if !report.success {
        eprintln!(
            "Upgrade failed, could not get: {}",
            report.failed_artifacts.join(", ")
        );
        std::process::exit(1);
    }

    println!("Upgrade complete.");
    Ok(())
}

fn render_event(event: UpdateEvent) {
    match event {
        UpdateEvent::ManifestParsed { catalog } => {
            println!("Manifest parsed: {} release(s) known.", catalog.len());
        }
        UpdateEvent::NoUpdateAvailable => {}
        UpdateEvent::UpdateAvailable { .. } => {}
        UpdateEvent::ArtifactProgress {
            index,
            bytes_received,
            bytes_total,
        } => {
            if bytes_total > 0 {
                print!(
                    "\r  artifact {}: {:.3}MB / {:.3}MB",
                    index + 1,
                    bytes_received as f64 / 1_048_576.0,
                    bytes_total as f64 / 1_048_576.0
                );
            } else {
                print!(
                    "\r  artifact {}: {:.3}MB",
                    index + 1,
                    bytes_received as f64 / 1_048_576.0
                );
            }
            let _ = std::io::stdout().flush();
        }
        UpdateEvent::ArtifactExtractProgress {
            index,
            entry_index,
            entry_count,
        } => {
            print!(
                "\r  artifact {}: extracting {}/{}",
                index + 1,
                entry_index,
                entry_count
            );
            let _ = std::io::stdout().flush();
        }
        UpdateEvent::ArtifactComplete { index, success } => {
            println!(
                "\r  artifact {}: {}",
                index + 1,
                if success { "done" } else { "FAILED" }
            );
        }
        UpdateEvent::UpgradeFinished {
            success,
            failed_artifacts,
        } => {
            if !success && !failed_artifacts.is_empty() {
                println!("Failed artifacts: {}", failed_artifacts.join(", "));
            }
        }
    }
}
