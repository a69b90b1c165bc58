//! Events surfaced to the presentation layer.
//!
//! The core never talks to widgets. Everything the UI needs (catalog
//! arrival, plan availability, per-artifact progress, the final verdict)
//! flows through a broadcast channel the presentation layer subscribes to.
//! Types are serializable so a front-end can forward them over IPC verbatim.

use serde::Serialize;

use crate::manifest::ReleaseCatalog;
use crate::resolver::UpgradePlan;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    /// The manifest parsed cleanly.
    ManifestParsed { catalog: ReleaseCatalog },
    /// Normal terminal state for a check: nothing applicable and newer.
    NoUpdateAvailable,
    /// A plan was resolved; `release_notes_html` is ready to render.
    UpdateAvailable {
        plan: UpgradePlan,
        release_notes_html: String,
    },
    /// Bytes landed for the artifact at `index` in the plan.
    /// `bytes_total` of 0 means the length is unknown (indeterminate).
    ArtifactProgress {
        index: usize,
        bytes_received: u64,
        bytes_total: u64,
    },
    /// Extraction advanced to entry `entry_index` of `entry_count`.
    ArtifactExtractProgress {
        index: usize,
        entry_index: usize,
        entry_count: usize,
    },
    /// The artifact at `index` reached a terminal state.
    ArtifactComplete { index: usize, success: bool },
    /// The whole plan was processed (or the queue was cancelled).
    UpgradeFinished {
        success: bool,
        failed_artifacts: Vec<String>,
    },
}

/// Fire-and-forget notification sink: the slot the host's tray/notification
/// plumbing fills. The core calls it for human-facing moments but never
/// depends on it for correctness.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str, duration_ms: u64);
}

/// Default sink: notifications become log lines.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str, _duration_ms: u64) {
        tracing::info!("[Notify] {}: {}", title, body);
    }
}
