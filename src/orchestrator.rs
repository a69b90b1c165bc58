//! Upgrade orchestration: drives the plan through the per-artifact
//! pipeline, one artifact at a time.
//!
//! Each queued artifact walks `Pending → Downloading → Verifying →
//! Extracting → Done`, with a `Failed` exit from any active state. Failures
//! stay local: the queue advances to the next Pending artifact and the
//! aggregate verdict is reported once the queue drains. Cancellation
//! abandons the in-flight download and halts the queue without touching the
//! remaining artifacts.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::download::DownloadController;
use crate::error::UpdateError;
use crate::events::UpdateEvent;
use crate::manifest::Artifact;
use crate::resolver::UpgradePlan;
use crate::{extract, verify};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Pending,
    Downloading,
    Verifying,
    Extracting,
    Done,
    Failed,
}

impl ArtifactState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArtifactState::Done | ArtifactState::Failed)
    }

    pub fn can_transition(&self, to: &ArtifactState) -> bool {
        matches!(
            (self, to),
            (ArtifactState::Pending, ArtifactState::Downloading)
                | (ArtifactState::Downloading, ArtifactState::Verifying)
                | (ArtifactState::Verifying, ArtifactState::Extracting)
                | (ArtifactState::Extracting, ArtifactState::Done)
                | (ArtifactState::Pending, ArtifactState::Failed)
                | (ArtifactState::Downloading, ArtifactState::Failed)
                | (ArtifactState::Verifying, ArtifactState::Failed)
                | (ArtifactState::Extracting, ArtifactState::Failed)
        )
    }
}

/// One plan entry plus its pipeline state. The queue is a plain value
/// sequence indexed by position; the presentation layer renders it from the
/// progress events, never the other way around.
#[derive(Debug, Clone)]
pub struct QueuedArtifact {
    pub artifact: Artifact,
    pub state: ArtifactState,
}

impl QueuedArtifact {
    fn label(&self) -> String {
        format!(
            "{} {}",
            self.artifact.kind.display_name(),
            self.artifact.version
        )
    }
}

/// Final verdict for one upgrade session.
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub success: bool,
    pub cancelled: bool,
    /// Labels of the artifacts that ended in `Failed`.
    pub failed_artifacts: Vec<String>,
    pub started_at: String,
    pub finished_at: String,
}

enum StepOutcome {
    Done,
    Failed,
    Cancelled,
}

pub struct UpgradeOrchestrator {
    queue: Vec<QueuedArtifact>,
    download_dir: PathBuf,
    downloader: DownloadController,
    events: broadcast::Sender<UpdateEvent>,
    cancel: CancellationToken,
}

impl UpgradeOrchestrator {
    pub fn new(
        plan: &UpgradePlan,
        download_dir: PathBuf,
        downloader: DownloadController,
        events: broadcast::Sender<UpdateEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let queue = plan
            .artifacts
            .iter()
            .cloned()
            .map(|artifact| QueuedArtifact {
                artifact,
                state: ArtifactState::Pending,
            })
            .collect();

        Self {
            queue,
            download_dir,
            downloader,
            events,
            cancel,
        }
    }

    /// Process the whole queue and report the aggregate outcome.
    pub async fn run(mut self) -> UpgradeReport {
        let started_at = chrono::Utc::now().to_rfc3339();
        let mut cancelled = false;

        while let Some(index) = self.next_pending() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match self.run_artifact(index).await {
                StepOutcome::Done => {
                    self.advance(index, ArtifactState::Done);
                    let _ = self
                        .events
                        .send(UpdateEvent::ArtifactComplete { index, success: true });
                }
                StepOutcome::Failed => {
                    self.advance(index, ArtifactState::Failed);
                    let _ = self
                        .events
                        .send(UpdateEvent::ArtifactComplete { index, success: false });
                }
                StepOutcome::Cancelled => {
                    cancelled = true;
                    break;
                }
            }
        }

        let failed_artifacts: Vec<String> = self
            .queue
            .iter()
            .filter(|q| q.state == ArtifactState::Failed)
            .map(QueuedArtifact::label)
            .collect();
        let success = !cancelled && failed_artifacts.is_empty();

        if cancelled {
            tracing::info!("[Upgrade] Queue halted by cancellation");
        } else {
            tracing::info!(
                "[Upgrade] Finished: success={} failed={:?}",
                success,
                failed_artifacts
            );
            let _ = self.events.send(UpdateEvent::UpgradeFinished {
                success,
                failed_artifacts: failed_artifacts.clone(),
            });
        }

        UpgradeReport {
            success,
            cancelled,
            failed_artifacts,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn next_pending(&self) -> Option<usize> {
        self.queue
            .iter()
            .position(|q| q.state == ArtifactState::Pending)
    }

    fn advance(&mut self, index: usize, to: ArtifactState) {
        let entry = &mut self.queue[index];
        debug_assert!(entry.state.can_transition(&to));
        tracing::debug!(
            "[Upgrade] {} {:?} -> {:?}",
            entry.artifact.filename,
            entry.state,
            to
        );
        entry.state = to;
    }

    /// Download → verify → extract for a single artifact. Failures are
    /// reported through the returned outcome, never as errors.
    async fn run_artifact(&mut self, index: usize) -> StepOutcome {
        let artifact = self.queue[index].artifact.clone();
        tracing::info!(
            "[Upgrade] Processing {} ({} {})",
            artifact.filename,
            artifact.kind.display_name(),
            artifact.version
        );

        self.advance(index, ArtifactState::Downloading);
        let events = self.events.clone();
        let outcome = match self
            .downloader
            .download(&artifact, &self.download_dir, &self.cancel, |received, total| {
                let _ = events.send(UpdateEvent::ArtifactProgress {
                    index,
                    bytes_received: received,
                    bytes_total: total,
                });
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(UpdateError::Cancelled) => return StepOutcome::Cancelled,
            Err(e) => {
                tracing::warn!("[Upgrade] Download failed for {}: {}", artifact.filename, e);
                return StepOutcome::Failed;
            }
        };

        self.advance(index, ArtifactState::Verifying);
        if let Err(e) = verify::verify(&artifact, &outcome.path) {
            // Staged file stays on disk for diagnostics.
            tracing::warn!("[Upgrade] {} failed verification: {}", artifact.filename, e);
            return StepOutcome::Failed;
        }

        self.advance(index, ArtifactState::Extracting);
        let events = self.events.clone();
        let extraction = match extract::extract(
            &outcome.path,
            &self.download_dir,
            |entry_index, entry_count| {
                let _ = events.send(UpdateEvent::ArtifactExtractProgress {
                    index,
                    entry_index,
                    entry_count,
                });
            },
        ) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("[Upgrade] {} failed to extract: {}", artifact.filename, e);
                return StepOutcome::Failed;
            }
        };

        if !extraction.is_clean() {
            // Archive kept so a retry or manual inspection is possible.
            tracing::warn!(
                "[Upgrade] {} extracted with {} entry error(s)",
                artifact.filename,
                extraction.entry_errors
            );
            return StepOutcome::Failed;
        }

        if let Err(e) = std::fs::remove_file(&outcome.path) {
            tracing::warn!(
                "[Upgrade] Could not remove staged archive {}: {}",
                outcome.path.display(),
                e
            );
        }

        StepOutcome::Done
    }
}
