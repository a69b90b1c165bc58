//! Updater configuration.
//!
//! Loaded from a TOML file when present; every field has a default so a
//! bare installation works without one. The platform string, current
//! application version and current runtime version are host-supplied; the
//! defaults only cover the common case of the updater shipping inside the
//! application bundle it updates.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Base URL the manifest and (typically) artifacts are served from.
    pub base_url: String,
    /// Well-known manifest filename under `base_url`.
    pub manifest_name: String,
    /// Platform key used to select artifacts ("linux", "mac", "windows").
    pub platform: String,
    /// Version of the installed application.
    pub current_app_version: String,
    /// Version of the installed runtime libraries.
    pub current_runtime_version: String,
    /// Application root; the manifest cache lives here and artifacts are
    /// staged under `<root_dir>/Download`.
    pub root_dir: PathBuf,
    /// A cached manifest younger than this is reused without a fetch.
    pub cache_max_age_secs: u64,
    /// Redirect hop limit per download.
    pub max_redirects: u32,
    /// HTTP client identifier.
    pub user_agent: String,
    /// Transport timeout for all requests.
    pub request_timeout_secs: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            base_url: "http://updates.somno.example.com".to_string(),
            manifest_name: "update.xml".to_string(),
            platform: default_platform().to_string(),
            current_app_version: env!("CARGO_PKG_VERSION").to_string(),
            current_runtime_version: "0".to_string(),
            root_dir: default_root_dir(),
            cache_max_age_secs: 7200,
            max_redirects: 10,
            user_agent: concat!("somno-updater/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl UpdateConfig {
    /// Load from a TOML file; missing keys fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                tracing::info!("[Config] Loaded {}", path.display());
                config
            }
            Err(e) => {
                if path.exists() {
                    tracing::warn!("[Config] Failed to load {}: {}, using defaults", path.display(), e);
                }
                Self::default()
            }
        }
    }

    /// Full manifest URL.
    pub fn manifest_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.manifest_name
        )
    }

    /// On-disk location of the cached manifest.
    pub fn manifest_cache_path(&self) -> PathBuf {
        self.root_dir.join(&self.manifest_name)
    }

    /// Staging directory for downloads and extraction.
    pub fn download_dir(&self) -> PathBuf {
        self.root_dir.join("Download")
    }
}

/// Platform key for the running host, matching the manifest's keys.
fn default_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "mac",
        other => other,
    }
}

/// Directory of the running executable, falling back to the working
/// directory.
fn default_root_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = UpdateConfig::default();
        assert_eq!(config.manifest_name, "update.xml");
        assert_eq!(config.cache_max_age_secs, 7200);
        assert_eq!(config.max_redirects, 10);
        assert!(config.user_agent.starts_with("somno-updater/"));
    }

    #[test]
    fn manifest_url_joins_without_double_slash() {
        let config = UpdateConfig {
            base_url: "http://updates.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.manifest_url(), "http://updates.example.com/update.xml");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("updater.toml");
        std::fs::write(
            &path,
            r#"
base_url = "http://mirror.example.org/somno"
platform = "windows"
"#,
        )
        .unwrap();

        let config = UpdateConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "http://mirror.example.org/somno");
        assert_eq!(config.platform, "windows");
        assert_eq!(config.manifest_name, "update.xml");
        assert_eq!(config.cache_max_age_secs, 7200);
    }

    #[test]
    fn load_or_default_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = UpdateConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config.manifest_name, "update.xml");
    }

    #[test]
    fn download_dir_is_under_root() {
        let config = UpdateConfig {
            root_dir: PathBuf::from("/opt/somno"),
            ..Default::default()
        };
        assert_eq!(config.download_dir(), PathBuf::from("/opt/somno/Download"));
        assert_eq!(
            config.manifest_cache_path(),
            PathBuf::from("/opt/somno/update.xml")
        );
    }
}
