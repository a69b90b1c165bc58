//! Release manifest parsing.
//!
//! The update server publishes an XML manifest (`update.xml`) describing the
//! available releases and their per-platform artifacts:
//!
//! ```xml
//! <updates>
//!   <release version="2.0.0" codename="Moonshine">
//!     <notes platform="">General release notes</notes>
//!     <notes platform="linux">Linux specific notes</notes>
//!     <update platform="linux" type="application" version="2.0.0"
//!             url="http://updates.example.com/somno-2.0.0-linux.zip"
//!             filename="somno-2.0.0-linux.zip" size="10485760"
//!             hash="">Build notes for this artifact</update>
//!     <update platform="linux" type="qtlibs" version="5.1" ... />
//!   </release>
//! </updates>
//! ```
//!
//! Parsing is a streaming pass over the XML events. Unknown elements and
//! attributes are ignored for forward compatibility with richer manifests;
//! only malformed XML is fatal.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::UpdateError;
use crate::version;

/// Artifact category. `manifest_key` values mirror the `type` attribute on
/// `<update>` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The application package itself.
    Application,
    /// The bundled UI runtime libraries the application links against.
    RuntimeLibs,
}

impl ArtifactKind {
    pub fn manifest_key(&self) -> &'static str {
        match self {
            ArtifactKind::Application => "application",
            ArtifactKind::RuntimeLibs => "qtlibs",
        }
    }

    pub fn from_manifest_key(key: &str) -> Option<Self> {
        match key {
            "application" => Some(ArtifactKind::Application),
            "qtlibs" => Some(ArtifactKind::RuntimeLibs),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ArtifactKind::Application => "Application",
            ArtifactKind::RuntimeLibs => "Runtime libraries",
        }
    }
}

/// A single downloadable update component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub version: String,
    pub url: String,
    pub filename: String,
    /// Expected payload size in bytes. `None` or `Some(0)` means the hash is
    /// authoritative for verification instead.
    pub expected_size: Option<u64>,
    /// Expected hex digest of the payload. Compared case-insensitively.
    pub expected_hash: Option<String>,
    /// Free-text build notes from the element body.
    pub notes: String,
}

/// One release entry from the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    pub codename: String,
    /// Release notes keyed by platform; the empty key holds general notes.
    pub notes_by_platform: HashMap<String, String>,
    /// Artifacts keyed by platform, in manifest order.
    pub updates_by_platform: HashMap<String, Vec<Artifact>>,
}

impl Release {
    /// General notes (empty platform key).
    pub fn general_notes(&self) -> &str {
        self.notes_by_platform.get("").map(String::as_str).unwrap_or("")
    }

    pub fn platform_notes(&self, platform: &str) -> &str {
        self.notes_by_platform
            .get(platform)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn artifacts_for(&self, platform: &str) -> &[Artifact] {
        self.updates_by_platform
            .get(platform)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// The full release catalog from one manifest parse. Immutable after parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseCatalog {
    pub releases: HashMap<String, Release>,
}

impl ReleaseCatalog {
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn get(&self, version: &str) -> Option<&Release> {
        self.releases.get(version)
    }

    /// Known release versions, newest first.
    pub fn versions_newest_first(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.releases.keys().cloned().collect();
        versions.sort_by(|a, b| version::compare(b, a));
        versions
    }
}

/// Where character data currently belongs while streaming.
enum TextTarget {
    None,
    /// `<notes platform="...">` body of the current release.
    ReleaseNotes { platform: String },
    /// `<update>` body: build notes of the artifact last pushed for this
    /// platform.
    ArtifactNotes { platform: String },
}

/// Parse manifest bytes into a [`ReleaseCatalog`].
pub fn parse_manifest(xml: &[u8]) -> Result<ReleaseCatalog, UpdateError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut catalog = ReleaseCatalog::default();
    let mut current: Option<Release> = None;
    let mut target = TextTarget::None;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            UpdateError::ParseError {
                reason: format!("{} at byte {}", e, reader.buffer_position()),
            }
        })?;

        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                b"release" => {
                    // A release opening inside another release is malformed
                    // enough to refuse.
                    if current.is_some() {
                        return Err(UpdateError::ParseError {
                            reason: "nested <release> element".to_string(),
                        });
                    }
                    current = Some(read_release_header(e)?);
                }
                b"notes" => {
                    if current.is_some() {
                        let platform = attr_value(e, b"platform")?.unwrap_or_default();
                        target = TextTarget::ReleaseNotes { platform };
                    }
                }
                b"update" => {
                    if let Some(release) = current.as_mut() {
                        if let Some(platform) = push_artifact(release, e)? {
                            target = TextTarget::ArtifactNotes { platform };
                        }
                    }
                }
                // Root element and anything unrecognized: ignored.
                _ => {}
            },
            Event::Empty(ref e) => {
                // Self-closing <update .../> carries no notes body.
                if e.name().as_ref() == b"update" {
                    if let Some(release) = current.as_mut() {
                        push_artifact(release, e)?;
                    }
                }
            }
            Event::Text(ref t) => {
                let text = t.unescape().map_err(|e| UpdateError::ParseError {
                    reason: e.to_string(),
                })?;
                if let Some(release) = current.as_mut() {
                    append_text(release, &target, text.trim());
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"release" => {
                    if let Some(release) = current.take() {
                        catalog.releases.insert(release.version.clone(), release);
                    }
                }
                b"notes" | b"update" => {
                    target = TextTarget::None;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if current.is_some() {
        return Err(UpdateError::ParseError {
            reason: "unterminated <release> element".to_string(),
        });
    }

    tracing::debug!(
        "[Manifest] Parsed {} release(s): {:?}",
        catalog.len(),
        catalog.versions_newest_first()
    );
    Ok(catalog)
}

fn read_release_header(e: &BytesStart<'_>) -> Result<Release, UpdateError> {
    Ok(Release {
        version: attr_value(e, b"version")?.unwrap_or_default(),
        codename: attr_value(e, b"codename")?.unwrap_or_default(),
        notes_by_platform: HashMap::new(),
        updates_by_platform: HashMap::new(),
    })
}

/// Build an artifact from an `<update>` element and append it to its
/// platform's list in manifest order. Entries with an unrecognized `type`
/// are skipped. Returns the platform key when an artifact was pushed.
fn push_artifact(
    release: &mut Release,
    e: &BytesStart<'_>,
) -> Result<Option<String>, UpdateError> {
    let platform = attr_value(e, b"platform")?.unwrap_or_default();
    let kind = match attr_value(e, b"type")?
        .as_deref()
        .and_then(ArtifactKind::from_manifest_key)
    {
        Some(kind) => kind,
        None => return Ok(None),
    };

    let expected_size = attr_value(e, b"size")?.and_then(|s| s.parse::<u64>().ok());
    let expected_hash = attr_value(e, b"hash")?.filter(|h| !h.is_empty());

    let artifact = Artifact {
        kind,
        version: attr_value(e, b"version")?.unwrap_or_default(),
        url: attr_value(e, b"url")?.unwrap_or_default(),
        filename: attr_value(e, b"filename")?.unwrap_or_default(),
        expected_size,
        expected_hash,
        notes: String::new(),
    };

    release
        .updates_by_platform
        .entry(platform.clone())
        .or_default()
        .push(artifact);
    Ok(Some(platform))
}

fn append_text(release: &mut Release, target: &TextTarget, text: &str) {
    if text.is_empty() {
        return;
    }
    match target {
        TextTarget::ReleaseNotes { platform } => {
            let notes = release
                .notes_by_platform
                .entry(platform.clone())
                .or_default();
            if !notes.is_empty() {
                notes.push(' ');
            }
            notes.push_str(text);
        }
        TextTarget::ArtifactNotes { platform } => {
            if let Some(artifact) = release
                .updates_by_platform
                .get_mut(platform)
                .and_then(|v| v.last_mut())
            {
                if !artifact.notes.is_empty() {
                    artifact.notes.push(' ');
                }
                artifact.notes.push_str(text);
            }
        }
        TextTarget::None => {}
    }
}

fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, UpdateError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| UpdateError::ParseError {
            reason: err.to_string(),
        })?;
        if attr.key.as_ref() == name {
            let value = attr.unescape_value().map_err(|err| UpdateError::ParseError {
                reason: err.to_string(),
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<updates>
  <release version="1.1.0" codename="Dormouse">
    <notes platform="">Bug fixes all around.</notes>
    <notes platform="linux">Switched to system tray notifications.</notes>
    <update platform="linux" type="application" version="1.1.0"
            url="http://updates.example.com/somno-1.1.0-linux.zip"
            filename="somno-1.1.0-linux.zip" size="10485760" hash="">
      Session graphs load faster.
    </update>
    <update platform="linux" type="qtlibs" version="5.1"
            url="http://updates.example.com/qtlibs-5.1-linux.zip"
            filename="qtlibs-5.1-linux.zip" size="0"
            hash="da39a3ee5e6b4b0d3255bfef95601890afd80709"/>
    <update platform="mac" type="application" version="1.1.0"
            url="http://updates.example.com/somno-1.1.0-mac.zip"
            filename="somno-1.1.0-mac.zip" size="11534336" hash=""/>
  </release>
  <release version="1.0.0" codename="Catnap">
    <update platform="linux" type="application" version="1.0.0"
            url="http://updates.example.com/somno-1.0.0-linux.zip"
            filename="somno-1.0.0-linux.zip" size="9437184" hash=""/>
  </release>
</updates>"#;

    #[test]
    fn parses_releases_and_platform_artifacts() {
        let catalog = parse_manifest(SAMPLE.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 2);

        let release = catalog.get("1.1.0").unwrap();
        assert_eq!(release.codename, "Dormouse");
        assert_eq!(release.general_notes(), "Bug fixes all around.");
        assert_eq!(
            release.platform_notes("linux"),
            "Switched to system tray notifications."
        );

        let linux = release.artifacts_for("linux");
        assert_eq!(linux.len(), 2);
        assert_eq!(linux[0].kind, ArtifactKind::Application);
        assert_eq!(linux[0].expected_size, Some(10_485_760));
        assert!(linux[0].expected_hash.is_none(), "empty hash attr drops out");
        assert_eq!(linux[0].notes, "Session graphs load faster.");

        assert_eq!(linux[1].kind, ArtifactKind::RuntimeLibs);
        assert_eq!(linux[1].version, "5.1");
        assert_eq!(linux[1].expected_size, Some(0));
        assert_eq!(
            linux[1].expected_hash.as_deref(),
            Some("da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );

        assert_eq!(release.artifacts_for("mac").len(), 1);
        assert!(release.artifacts_for("windows").is_empty());
    }

    #[test]
    fn versions_sort_newest_first() {
        let catalog = parse_manifest(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            catalog.versions_newest_first(),
            vec!["1.1.0".to_string(), "1.0.0".to_string()]
        );
    }

    #[test]
    fn unknown_elements_and_attributes_ignored() {
        let xml = r#"<updates>
            <banner>Upgrade today!</banner>
            <release version="2.0.0" codename="Nocturne" channel="stable">
              <signature algo="dsa">AAAA</signature>
              <update platform="linux" type="application" version="2.0.0"
                      url="http://u.example.com/a.zip" filename="a.zip"
                      size="1" hash="" mirror="http://m.example.com/a.zip"/>
              <update platform="linux" type="installer" version="2.0.0"
                      url="http://u.example.com/i.bin" filename="i.bin"/>
            </release>
        </updates>"#;
        let catalog = parse_manifest(xml.as_bytes()).unwrap();
        let release = catalog.get("2.0.0").unwrap();
        // The unknown-typed entry is skipped, the known one survives.
        assert_eq!(release.artifacts_for("linux").len(), 1);
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let result = parse_manifest(b"<updates><release version=\"1.0\">");
        match result {
            Err(UpdateError::ParseError { .. }) => {}
            other => panic!("expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn mismatched_tags_are_a_parse_error() {
        let result = parse_manifest(b"<updates><release version=\"1.0\"></updates>");
        assert!(matches!(result, Err(UpdateError::ParseError { .. })));
    }

    #[test]
    fn artifact_kind_round_trip() {
        assert_eq!(
            ArtifactKind::from_manifest_key("application"),
            Some(ArtifactKind::Application)
        );
        assert_eq!(
            ArtifactKind::from_manifest_key("qtlibs"),
            Some(ArtifactKind::RuntimeLibs)
        );
        assert_eq!(ArtifactKind::from_manifest_key("installer"), None);
        assert_eq!(ArtifactKind::Application.manifest_key(), "application");
    }
}
