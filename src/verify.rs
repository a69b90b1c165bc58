//! Staged-file integrity verification.
//!
//! A known nonzero expected size is authoritative and compared on exact
//! bytes (the MB figure in logs is display-only). Without a usable size the
//! SHA-1 digest of the full file is compared case-insensitively against the
//! manifest hash. When the manifest carries neither, the check passes with a
//! warning; older manifests in the field omit both fields.

use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::UpdateError;
use crate::manifest::Artifact;

/// Validate a completed download against the artifact's expectations.
pub fn verify(artifact: &Artifact, path: &Path) -> Result<(), UpdateError> {
    match artifact.expected_size {
        Some(expected) if expected > 0 => verify_size(artifact, path, expected),
        _ => match artifact.expected_hash.as_deref() {
            Some(expected) => verify_hash(artifact, path, expected),
            None => {
                tracing::warn!(
                    "[Verify] {} has neither expected size nor hash, accepting as-is",
                    artifact.filename
                );
                Ok(())
            }
        },
    }
}

fn verify_size(artifact: &Artifact, path: &Path, expected: u64) -> Result<(), UpdateError> {
    let actual = std::fs::metadata(path)
        .map_err(|e| UpdateError::io("stat", path, e))?
        .len();

    if actual != expected {
        tracing::warn!(
            "[Verify] Size mismatch for {}: expected {:.3}MB, got {:.3}MB",
            artifact.filename,
            expected as f64 / 1_048_576.0,
            actual as f64 / 1_048_576.0
        );
        return Err(UpdateError::SizeMismatch {
            filename: artifact.filename.clone(),
            expected,
            actual,
        });
    }

    tracing::info!(
        "[Verify] {} size ok ({:.3}MB)",
        artifact.filename,
        actual as f64 / 1_048_576.0
    );
    Ok(())
}

fn verify_hash(artifact: &Artifact, path: &Path, expected: &str) -> Result<(), UpdateError> {
    let mut file = std::fs::File::open(path).map_err(|e| UpdateError::io("open", path, e))?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| UpdateError::io("read", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let actual = hex::encode(hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected) {
        tracing::warn!(
            "[Verify] Integrity check failed for {}",
            artifact.filename
        );
        return Err(UpdateError::HashMismatch {
            filename: artifact.filename.clone(),
            expected: expected.to_string(),
            actual,
        });
    }

    tracing::info!("[Verify] {} digest ok", artifact.filename);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ArtifactKind;

    fn artifact(size: Option<u64>, hash: Option<&str>) -> Artifact {
        Artifact {
            kind: ArtifactKind::Application,
            version: "1.0.0".into(),
            url: "http://u.example.com/a.zip".into(),
            filename: "a.zip".into(),
            expected_size: size,
            expected_hash: hash.map(str::to_string),
            notes: String::new(),
        }
    }

    // SHA-1 of the empty input.
    const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    #[test]
    fn exact_size_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        std::fs::write(&path, vec![0u8; 1_048_576]).unwrap();

        verify(&artifact(Some(1_048_576), None), &path).unwrap();
    }

    #[test]
    fn off_by_one_size_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        std::fs::write(&path, vec![0u8; 1_048_577]).unwrap();

        match verify(&artifact(Some(1_048_576), None), &path) {
            Err(UpdateError::SizeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 1_048_576);
                assert_eq!(actual, 1_048_577);
            }
            other => panic!("expected SizeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn hash_comparison_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        std::fs::write(&path, b"").unwrap();

        let upper = EMPTY_SHA1.to_ascii_uppercase();
        verify(&artifact(None, Some(&upper)), &path).unwrap();
        verify(&artifact(Some(0), Some(EMPTY_SHA1)), &path).unwrap();
    }

    #[test]
    fn wrong_hash_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        std::fs::write(&path, b"payload").unwrap();

        match verify(&artifact(None, Some(EMPTY_SHA1)), &path) {
            Err(UpdateError::HashMismatch { .. }) => {}
            other => panic!("expected HashMismatch, got {:?}", other),
        }
    }

    #[test]
    fn nonzero_size_takes_precedence_over_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        std::fs::write(&path, b"1234").unwrap();

        // Hash is wrong for this content, but the authoritative size check
        // passes and wins.
        verify(&artifact(Some(4), Some(EMPTY_SHA1)), &path).unwrap();
    }

    #[test]
    fn no_expectations_pass_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        std::fs::write(&path, b"anything").unwrap();

        verify(&artifact(None, None), &path).unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.zip");
        assert!(matches!(
            verify(&artifact(Some(10), None), &path),
            Err(UpdateError::Io { .. })
        ));
    }
}
