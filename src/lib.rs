//! # somno-updater
//!
//! Self-update engine for the Somno desktop application: checks a remote XML
//! release manifest, decides which artifacts the running installation needs,
//! and drives each one through a sequential download → verify → extract
//! pipeline with progress events for the presentation layer.
//!
//! ## Architecture
//! - **manifest.rs**: streaming XML manifest parse into a release catalog
//! - **version.rs**: one numeric-aware comparator for every version path
//! - **resolver.rs**: pure resolution of catalog + platform + versions into
//!   an ordered upgrade plan
//! - **download.rs**: single-artifact HTTP fetch with a bounded, explicit
//!   redirect loop and cooperative cancellation
//! - **verify.rs**: size- or SHA-1-based integrity check of staged files
//! - **extract.rs**: zip extraction with per-entry error accounting
//! - **orchestrator.rs**: the per-artifact state machine and queue driver
//! - **events.rs**: broadcast events and the notification sink trait
//!
//! ## Flow
//! ```text
//! manifest bytes → catalog → plan → [download → verify → extract]* → report
//! ```
//!
//! The presentation layer (CLI, tray applet, anything) constructs an
//! [`UpdateSession`], subscribes to its event channel, and calls
//! [`UpdateSession::check_for_updates`] followed by
//! [`UpdateSession::run_upgrade`]. Cancelling the session's token abandons
//! the in-flight download and halts the queue.

pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod extract;
pub mod manifest;
pub mod orchestrator;
pub mod resolver;
pub mod verify;
pub mod version;

// Re-exports for convenience
pub use config::UpdateConfig;
pub use download::{DownloadController, DownloadOutcome};
pub use error::UpdateError;
pub use events::{LogNotifier, Notifier, UpdateEvent};
pub use extract::ExtractionResult;
pub use manifest::{Artifact, ArtifactKind, Release, ReleaseCatalog};
pub use orchestrator::{ArtifactState, UpgradeOrchestrator, UpgradeReport};
pub use resolver::UpgradePlan;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// One update-check-and-upgrade session.
///
/// Owns the HTTP client shared by the manifest fetch and every artifact
/// download, the event channel, and the cancellation token. The catalog and
/// plan it produces are immutable snapshots discarded when the session ends.
pub struct UpdateSession {
    config: UpdateConfig,
    client: reqwest::Client,
    events: broadcast::Sender<UpdateEvent>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
}

impl UpdateSession {
    pub fn new(config: UpdateConfig) -> Self {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: UpdateConfig, notifier: Arc<dyn Notifier>) -> Self {
        // Redirects stay off: the download controller owns the hop loop.
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client for updater");

        let (events, _) = broadcast::channel(256);

        Self {
            config,
            client,
            events,
            notifier,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Subscribe to session events. Safe to call any number of times.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    /// Token that abandons the in-flight download and halts the queue when
    /// cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fetch (or reuse a fresh cached copy of) the manifest, parse it, and
    /// resolve a plan for this installation.
    ///
    /// Emits `ManifestParsed` and then either `NoUpdateAvailable` or
    /// `UpdateAvailable`. Returns `Ok(None)` when up to date; a parse or
    /// manifest-fetch failure aborts the session with an error.
    pub async fn check_for_updates(&self) -> Result<Option<UpgradePlan>, UpdateError> {
        let bytes = self.load_manifest_bytes().await?;
        let catalog = manifest::parse_manifest(&bytes)?;
        let _ = self.events.send(UpdateEvent::ManifestParsed {
            catalog: catalog.clone(),
        });

        let plan = resolver::resolve(
            &catalog,
            &self.config.platform,
            &self.config.current_app_version,
            &self.config.current_runtime_version,
        );

        match plan {
            None => {
                self.notifier.notify(
                    "Somno updates",
                    "No updates were found for your platform",
                    5000,
                );
                let _ = self.events.send(UpdateEvent::NoUpdateAvailable);
                Ok(None)
            }
            Some(plan) => {
                let release_notes_html = catalog
                    .get(&plan.release_version)
                    .map(|release| {
                        resolver::release_notes_html(
                            release,
                            &plan,
                            &self.config.current_app_version,
                        )
                    })
                    .unwrap_or_default();
                let _ = self.events.send(UpdateEvent::UpdateAvailable {
                    plan: plan.clone(),
                    release_notes_html,
                });
                Ok(Some(plan))
            }
        }
    }

    /// Drive the plan through the download → verify → extract pipeline.
    pub async fn run_upgrade(&self, plan: UpgradePlan) -> UpgradeReport {
        let downloader = DownloadController::new(self.client.clone(), self.config.max_redirects);
        let orchestrator = UpgradeOrchestrator::new(
            &plan,
            self.config.download_dir(),
            downloader,
            self.events.clone(),
            self.cancel.clone(),
        );

        let report = orchestrator.run().await;

        if report.cancelled {
            tracing::info!("[Session] Upgrade cancelled by user");
        } else if report.success {
            self.notifier
                .notify("Somno updates", "Upgrade downloaded and staged", 5000);
        } else {
            self.notifier.notify(
                "Somno updates",
                "Sorry, could not get all necessary files for the upgrade.",
                8000,
            );
        }

        report
    }

    /// Manifest bytes, from the disk cache when it is fresh enough,
    /// otherwise fetched from the server and re-cached.
    async fn load_manifest_bytes(&self) -> Result<Vec<u8>, UpdateError> {
        let cache = self.config.manifest_cache_path();
        if let Some(age) = file_age_secs(&cache) {
            if age < self.config.cache_max_age_secs {
                tracing::info!(
                    "[Session] Using cached manifest ({}s old): {}",
                    age,
                    cache.display()
                );
                return tokio::fs::read(&cache)
                    .await
                    .map_err(|e| UpdateError::io("read", &cache, e));
            }
        }

        self.notifier
            .notify("Somno updates", "Checking for Somno updates", 3000);

        let mut url = self.config.manifest_url();
        let mut hops = 0u32;
        let bytes = loop {
            tracing::info!("[Session] Requesting {}", url);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| UpdateError::from_reqwest(e, &url))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(UpdateError::FileNotFound { url });
            }
            if status.is_redirection() {
                match download::redirect_target(&response, &url) {
                    Some(target) if target != url && hops < self.config.max_redirects => {
                        hops += 1;
                        url = target;
                        continue;
                    }
                    _ => {
                        return Err(UpdateError::TransportError {
                            message: format!("unresolvable redirect from {}", url),
                        });
                    }
                }
            }
            if !status.is_success() {
                return Err(UpdateError::TransportError {
                    message: format!("unexpected HTTP status {} for {}", status, url),
                });
            }
            break response
                .bytes()
                .await
                .map_err(|e| UpdateError::from_reqwest(e, &url))?;
        };

        // Cache refresh failures are not fatal; the manifest is in hand.
        if let Some(parent) = cache.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(e) = tokio::fs::write(&cache, &bytes).await {
            tracing::warn!("[Session] Could not cache manifest: {}", e);
        }

        Ok(bytes.to_vec())
    }
}

/// Seconds since the file was last modified, `None` when unavailable.
fn file_age_secs(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    modified.elapsed().ok().map(|d| d.as_secs())
}
