//! Update resolution: decide which artifacts the running installation needs.
//!
//! Pure and deterministic given its inputs; no I/O happens here, which keeps
//! the whole decision table unit-testable without a server.

use serde::{Deserialize, Serialize};

use crate::manifest::{Artifact, ArtifactKind, Release, ReleaseCatalog};
use crate::version;

/// The ordered set of artifacts selected for one upgrade session. Runtime
/// libraries come before the application so dependencies land first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradePlan {
    /// Version of the release the plan was drawn from.
    pub release_version: String,
    pub codename: String,
    pub platform: String,
    pub artifacts: Vec<Artifact>,
}

impl UpgradePlan {
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Display labels for the plan's artifacts ("Application 2.0.0", ...).
    pub fn artifact_labels(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .map(|a| format!("{} {}", a.kind.display_name(), a.version))
            .collect()
    }
}

/// Select the applicable release and the minimal artifact set for it.
///
/// Walks the catalog newest-to-oldest and picks the first release carrying
/// any artifact for `platform`; that release must be strictly newer than the
/// installed application. Within it, the newest RuntimeLibs and Application
/// artifacts are considered (manifest order wins ties), and each is included
/// only when it exceeds the locally installed counterpart.
///
/// Returns `None` when there is nothing to do.
pub fn resolve(
    catalog: &ReleaseCatalog,
    platform: &str,
    current_app_version: &str,
    current_runtime_version: &str,
) -> Option<UpgradePlan> {
    let selected = select_release(catalog, platform)?;

    if !version::is_newer(&selected.version, current_app_version) {
        tracing::info!(
            "[Resolver] Newest release for {} is {}, not newer than installed {}",
            platform,
            selected.version,
            current_app_version
        );
        return None;
    }

    let artifacts = selected.artifacts_for(platform);
    let newest_runtime = newest_of_kind(artifacts, ArtifactKind::RuntimeLibs);
    let newest_app = newest_of_kind(artifacts, ArtifactKind::Application);

    let mut plan_artifacts = Vec::new();
    if let Some(runtime) = newest_runtime {
        if version::is_newer(&runtime.version, current_runtime_version) {
            plan_artifacts.push(runtime.clone());
        }
    }
    if let Some(app) = newest_app {
        if version::is_newer(&app.version, current_app_version) {
            plan_artifacts.push(app.clone());
        }
    }

    if plan_artifacts.is_empty() {
        return None;
    }

    tracing::info!(
        "[Resolver] Release {} \"{}\" selected for {}: {} artifact(s)",
        selected.version,
        selected.codename,
        platform,
        plan_artifacts.len()
    );

    Some(UpgradePlan {
        release_version: selected.version.clone(),
        codename: selected.codename.clone(),
        platform: platform.to_string(),
        artifacts: plan_artifacts,
    })
}

/// Newest-to-oldest scan for the first release with artifacts for `platform`.
fn select_release<'a>(catalog: &'a ReleaseCatalog, platform: &str) -> Option<&'a Release> {
    for version in catalog.versions_newest_first() {
        let release = catalog.get(&version)?;
        if !release.artifacts_for(platform).is_empty() {
            return Some(release);
        }
    }
    None
}

/// Scan in manifest order, keeping the strictly-greatest version; the first
/// of equal versions wins.
fn newest_of_kind(artifacts: &[Artifact], kind: ArtifactKind) -> Option<&Artifact> {
    let mut best: Option<&Artifact> = None;
    for artifact in artifacts.iter().filter(|a| a.kind == kind) {
        match best {
            Some(current) if !version::is_newer(&artifact.version, &current.version) => {}
            _ => best = Some(artifact),
        }
    }
    best
}

/// Assemble the release-notes HTML block surfaced with `UpdateAvailable`.
/// Mirrors what the presentation layer renders: headline, general notes,
/// platform notes, then per-artifact build notes for the planned items.
pub fn release_notes_html(
    release: &Release,
    plan: &UpgradePlan,
    current_app_version: &str,
) -> String {
    let platform = &plan.platform;
    let mut html = String::new();

    let new_version = version::is_newer(&release.version, current_app_version);
    if new_version {
        html.push_str("<h2>A new version of Somno is available!</h2>");
    } else {
        html.push_str("<h2>An update for Somno is available.</h2>");
    }

    html.push_str(&format!(
        "<h3>Somno v{} codename \"{}\"</h3><p>{}</p>",
        release.version,
        release.codename,
        release.general_notes()
    ));

    let platform_notes = release.platform_notes(platform);
    if !platform_notes.is_empty() {
        let mut title = platform.clone();
        if let Some(first) = title.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        html.push_str(&format!(
            "<b>{} platform notes</b><p>{}</p>",
            title, platform_notes
        ));
    }

    for artifact in &plan.artifacts {
        if artifact.notes.is_empty() {
            continue;
        }
        match artifact.kind {
            ArtifactKind::Application => html.push_str(&format!(
                "<b>Somno v{} build notes</b><br/>{}<br/>",
                artifact.version,
                artifact.notes.trim()
            )),
            ArtifactKind::RuntimeLibs => html.push_str(&format!(
                "<b>Runtime libraries update (v{})</b><br/>{}<br/>",
                artifact.version,
                artifact.notes.trim()
            )),
        }
    }

    html
}
