// ABOUTME: Image provisioning: inspect, then build or pull as needed.
// ABOUTME: Build output is scanned for the id of the freshly built image.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::error::{Result, ServiceError};
use crate::progress::{ProgressSink, StreamError, stream_output};
use crate::runtime::{ApiError, BuildRequest, DaemonApi, ImageRecord};
use crate::spec::split_repository_tag;
use crate::types::ImageId;

use super::Service;

static BUILD_SUCCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Successfully built ([0-9a-f]+)").expect("valid build success pattern")
});

impl Service {
    /// Inspect the service's image. A 404 for a missing image is benign
    /// absence; any other failure propagates. The result is cached for the
    /// duration of the convergence pass so the fingerprint stays stable.
    pub(crate) async fn image(&self, daemon: &dyn DaemonApi) -> Result<Option<ImageRecord>> {
        if let Some(cached) = self.cached_image() {
            return Ok(Some(cached));
        }

        match daemon.inspect_image(&self.image_name()).await {
            Ok(record) => {
                self.cache_image(record.clone());
                Ok(Some(record))
            }
            Err(e) if e.is_no_such_image() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn require_image(&self, daemon: &dyn DaemonApi) -> Result<ImageRecord> {
        self.image(daemon).await?.ok_or_else(|| {
            ApiError::Response {
                status_code: 404,
                message: format!("No such image: {}", self.image_name()),
            }
            .into()
        })
    }

    /// Make sure the image this service runs exists on the daemon:
    /// inspect, then build (when permitted) or pull.
    pub async fn ensure_image_exists(
        &self,
        daemon: &dyn DaemonApi,
        do_build: bool,
        insecure_registry: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        if self.image(daemon).await?.is_some() {
            return Ok(());
        }

        if self.can_be_built() {
            if do_build {
                self.build(daemon, false, progress).await?;
                Ok(())
            } else {
                Err(ServiceError::NeedsBuild {
                    service: self.name().to_string(),
                })
            }
        } else {
            self.pull(daemon, insecure_registry, progress).await
        }
    }

    /// Build the service's image, tagged with its image name, and return the
    /// id the daemon reports in its final `Successfully built` line.
    pub async fn build(
        &self,
        daemon: &dyn DaemonApi,
        no_cache: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<ImageId> {
        let Some(path) = self.options().build.clone() else {
            return Err(ServiceError::Build {
                service: self.name().to_string(),
                reason: "service has no build directory".to_string(),
                last_event: None,
            });
        };

        info!("Building {}...", self.name());

        let request = BuildRequest {
            path,
            tag: self.image_name(),
            rm: true,
            nocache: no_cache,
            dockerfile: self.options().dockerfile.clone(),
        };

        let stream = daemon.build_image(&request).await?;
        let events = stream_output(stream, progress)
            .await
            .map_err(|e| ServiceError::build_failed(self.name(), e))?;

        // The daemon complains when a streaming connection is reused for the
        // next request, so hand it back now.
        daemon.close().await;
        self.invalidate_image_cache();

        let mut image_id = None;
        for event in &events {
            if let Some(line) = event.get("stream").and_then(Value::as_str)
                && let Some(captures) = BUILD_SUCCESS.captures(line)
            {
                image_id = captures.get(1).map(|m| m.as_str().to_string());
            }
        }

        match image_id {
            Some(id) => Ok(ImageId::new(id)),
            None => Err(ServiceError::Build {
                service: self.name().to_string(),
                reason: if events.is_empty() {
                    "Unknown".to_string()
                } else {
                    "build stream ended without reporting an image id".to_string()
                },
                last_event: events.last().cloned(),
            }),
        }
    }

    /// Pull the declared image. A no-op for build-only services.
    pub async fn pull(
        &self,
        daemon: &dyn DaemonApi,
        insecure_registry: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let Some(image) = self.options().image.clone() else {
            return Ok(());
        };

        let (repo, tag) = split_repository_tag(&image);
        let tag = tag.unwrap_or_else(|| "latest".to_string());
        info!("Pulling {} ({}:{})...", self.name(), repo, tag);

        let stream = daemon.pull_image(&repo, &tag, insecure_registry).await?;
        stream_output(stream, progress).await.map_err(|e| match e {
            StreamError::Api(api) => ServiceError::from(api),
            StreamError::Event(message) => {
                ApiError::Transport(format!("pull of {repo}:{tag} failed: {message}")).into()
            }
        })?;

        self.invalidate_image_cache();
        Ok(())
    }
}
