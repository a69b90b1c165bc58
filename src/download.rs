//! Single-artifact HTTP download with explicit redirect handling.
//!
//! The client is built with redirects disabled so the hop sequence stays an
//! explicit, bounded loop here: a redirect to a different URL reopens the
//! staging file and re-issues the request; a redirect to the same URL is
//! terminal and never loops. 404 and transport failures are terminal with no
//! automatic retry; the orchestrator decides what happens to the queue.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::header::LOCATION;
use reqwest::{StatusCode, Url};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::UpdateError;
use crate::manifest::Artifact;

/// Outcome of a completed (HTTP-level successful) download.
#[derive(Debug)]
pub struct DownloadOutcome {
    /// Where the payload was staged.
    pub path: PathBuf,
    pub bytes_received: u64,
    /// URL the payload was actually served from, after redirects.
    pub effective_url: String,
}

pub struct DownloadController {
    client: reqwest::Client,
    max_redirects: u32,
}

impl DownloadController {
    /// `client` must have automatic redirects disabled
    /// (`redirect::Policy::none()`); hops are counted and bounded here.
    pub fn new(client: reqwest::Client, max_redirects: u32) -> Self {
        Self {
            client,
            max_redirects,
        }
    }

    /// Fetch one artifact into `dest_dir`, reporting `(bytes_received,
    /// bytes_total)` after every chunk. `bytes_total` is 0 when the server
    /// does not announce a length (indeterminate progress).
    ///
    /// Cancellation closes the staging file and removes the partial payload.
    pub async fn download<F>(
        &self,
        artifact: &Artifact,
        dest_dir: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<DownloadOutcome, UpdateError>
    where
        F: FnMut(u64, u64),
    {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| UpdateError::io("create dir", dest_dir, e))?;
        let path = dest_dir.join(&artifact.filename);

        let mut url = artifact.url.clone();
        let mut hops = 0u32;

        loop {
            // Open (and truncate any prior partial file) before the first
            // byte arrives; a redirect reopens it on the next pass.
            let mut file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| UpdateError::io("create", &path, e))?;

            tracing::info!("[Download] Requesting {}", url);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| UpdateError::from_reqwest(e, &url))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(UpdateError::FileNotFound { url });
            }

            if status.is_redirection() {
                match redirect_target(&response, &url) {
                    Some(target) if target != url => {
                        hops += 1;
                        if hops > self.max_redirects {
                            drop(file);
                            let _ = tokio::fs::remove_file(&path).await;
                            return Err(UpdateError::TooManyRedirects { hops, url: target });
                        }
                        tracing::info!("[Download] Redirected to {}", target);
                        url = target;
                        continue;
                    }
                    _ => {
                        // Self-redirect or unusable Location: terminal. The
                        // empty staging file will fail verification.
                        tracing::warn!(
                            "[Download] Redirect without a new target from {}, stopping",
                            url
                        );
                        return Ok(DownloadOutcome {
                            path,
                            bytes_received: 0,
                            effective_url: url,
                        });
                    }
                }
            }

            if !status.is_success() {
                return Err(UpdateError::TransportError {
                    message: format!("unexpected HTTP status {} for {}", status, url),
                });
            }

            let total = response.content_length().unwrap_or(0);
            let mut received = 0u64;
            let mut stream = response.bytes_stream();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("[Download] Cancelled, discarding {}", path.display());
                        drop(file);
                        let _ = tokio::fs::remove_file(&path).await;
                        return Err(UpdateError::Cancelled);
                    }
                    chunk = stream.next() => match chunk {
                        Some(Ok(bytes)) => {
                            file.write_all(&bytes)
                                .await
                                .map_err(|e| UpdateError::io("write", &path, e))?;
                            received += bytes.len() as u64;
                            on_progress(received, total);
                        }
                        Some(Err(e)) => {
                            return Err(UpdateError::TransportError {
                                message: format!("body stream failed for {}: {}", url, e),
                            });
                        }
                        None => break,
                    }
                }
            }

            file.flush()
                .await
                .map_err(|e| UpdateError::io("flush", &path, e))?;
            tracing::info!(
                "[Download] Received {} bytes into {}",
                received,
                path.display()
            );

            return Ok(DownloadOutcome {
                path,
                bytes_received: received,
                effective_url: url,
            });
        }
    }
}

/// Absolute redirect target from a 3xx response, resolved against the
/// request URL when the Location header is relative.
pub(crate) fn redirect_target(response: &reqwest::Response, current: &str) -> Option<String> {
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    match Url::parse(location) {
        Ok(url) => Some(url.to_string()),
        Err(_) => {
            let base = Url::parse(current).ok()?;
            Some(base.join(location).ok()?.to_string())
        }
    }
}
