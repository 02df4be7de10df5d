//! Delivery pipeline
//!
//! Takes a completed capture and runs validate -> persist -> upload ->
//! cleanup. Each step is a hard gate; a failed gate short-circuits the
//! rest. The pipeline never retries an upload on its own; the operator
//! re-triggers a new recording instead.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{NetworkConfig, StorageConfig};
use crate::error::{Error, Result, TransportError, ValidationError};
use crate::net::{HealthClient, SharedEndpoint};
use crate::session::CompletedCapture;

/// Terminal outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Pending,
    Uploaded,
    Failed,
    SkippedTooSmall,
    SkippedTooShort,
}

/// Record of one delivery attempt; immutable once the outcome is set
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub source_file: PathBuf,
    pub size_bytes: u64,
    pub duration_ms: u64,
    pub outcome: DeliveryOutcome,
}

impl DeliveryJob {
    /// Terminal record for a capture the session rejected as too short;
    /// no artifact ever reaches the pipeline for these.
    pub fn skipped_too_short(duration: Duration) -> Self {
        Self {
            source_file: PathBuf::new(),
            size_bytes: 0,
            duration_ms: duration.as_millis() as u64,
            outcome: DeliveryOutcome::SkippedTooShort,
        }
    }
}

/// Uploads completed captures to the discovered device
pub struct DeliveryPipeline {
    http: reqwest::Client,
    health: HealthClient,
    endpoint: SharedEndpoint,
    port: u16,
    upload_path: String,
    request_timeout: Duration,
    save_recordings: bool,
    recordings_dir: PathBuf,
    min_upload_bytes: u64,
}

impl DeliveryPipeline {
    pub fn new(
        network: &NetworkConfig,
        storage: &StorageConfig,
        endpoint: SharedEndpoint,
        health: HealthClient,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            health,
            endpoint,
            port: network.device_port,
            upload_path: network.upload_path.clone(),
            request_timeout: network.request_timeout(),
            save_recordings: storage.save_recordings,
            recordings_dir: storage.recordings_dir.clone(),
            min_upload_bytes: storage.min_upload_bytes,
        })
    }

    /// Run the full validate -> persist -> upload -> cleanup sequence
    pub async fn deliver(&self, capture: CompletedCapture) -> DeliveryJob {
        let source = capture.artifact;
        let duration_ms = capture.duration.as_millis() as u64;

        // Gate 1: the artifact handle must point at a real file
        let size_bytes = match tokio::fs::metadata(&source).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::error!(
                    path = %source.display(),
                    "{}: {}",
                    ValidationError::NoArtifact,
                    e
                );
                return DeliveryJob {
                    source_file: source,
                    size_bytes: 0,
                    duration_ms,
                    outcome: DeliveryOutcome::Failed,
                };
            }
        };

        let mut job = DeliveryJob {
            source_file: source.clone(),
            size_bytes,
            duration_ms,
            outcome: DeliveryOutcome::Pending,
        };

        // Gate 2: size threshold; no upload attempted below it
        if size_bytes < self.min_upload_bytes {
            let rejection = ValidationError::TooSmall {
                actual: size_bytes,
                min: self.min_upload_bytes,
            };
            tracing::warn!("{}, skipping upload", rejection);
            job.outcome = DeliveryOutcome::SkippedTooSmall;
            self.cleanup(&source).await;
            return job;
        }

        // Gate 3: persist a durable copy before risking the upload
        if self.save_recordings {
            if let Some(name) = source.file_name() {
                let saved = self.recordings_dir.join(name);
                match tokio::fs::copy(&source, &saved).await {
                    Ok(_) => tracing::info!(path = %saved.display(), "Saved recording"),
                    Err(e) => tracing::warn!("Could not persist recording: {}", e),
                }
            }
        }

        // Gate 4: an endpoint marked unhealthy needs a fresh health
        // check before it is used for upload
        let snapshot = self.endpoint.snapshot();
        if !snapshot.healthy {
            let check = self.health.check(snapshot.address).await;
            self.endpoint.mark(check.reachable);
            if !check.reachable {
                tracing::warn!(address = %snapshot.address, "Device still unreachable, not uploading");
                job.outcome = DeliveryOutcome::Failed;
                self.cleanup(&source).await;
                return job;
            }
        }

        job.outcome = match self.upload(snapshot.address, &source).await {
            Ok(()) => {
                tracing::info!("Upload successful");
                self.endpoint.mark(true);
                DeliveryOutcome::Uploaded
            }
            Err(TransportError::Refused) | Err(TransportError::ConnectFailed(_)) => {
                tracing::error!("Upload connection failed; marking device unreachable");
                self.endpoint.mark(false);
                DeliveryOutcome::Failed
            }
            Err(e) => {
                tracing::error!("Upload failed: {}", e);
                DeliveryOutcome::Failed
            }
        };

        // The transient copy goes away on every outcome; the persisted
        // copy (if any) stays.
        self.cleanup(&source).await;
        job
    }

    async fn upload(&self, address: Ipv4Addr, path: &Path) -> std::result::Result<(), TransportError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let url = format!("http://{}:{}{}", address, self.port, self.upload_path);
        tracing::debug!(%url, "Uploading artifact");

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TransportError::Refused
                } else if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::BadStatus(status.as_u16()));
        }
        Ok(())
    }

    async fn cleanup(&self, source: &Path) {
        if let Err(e) = tokio::fs::remove_file(source).await {
            tracing::warn!(path = %source.display(), "Could not remove transient artifact: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_too_short_job_is_terminal_with_no_artifact() {
        let job = DeliveryJob::skipped_too_short(Duration::from_millis(300));
        assert_eq!(job.outcome, DeliveryOutcome::SkippedTooShort);
        assert_eq!(job.duration_ms, 300);
        assert_eq!(job.size_bytes, 0);
        assert_eq!(job.source_file, PathBuf::new());
    }
}
