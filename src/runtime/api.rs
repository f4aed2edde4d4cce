// ABOUTME: The daemon-facing contract: payload records, event streams, errors.
// ABOUTME: Everything the engine needs from a runtime, nothing more.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

use crate::container::Container;
use crate::spec::{HostBinding, RestartSpec};
use crate::types::{ContainerId, ImageId};

/// Errors from daemon requests. `Response` preserves the HTTP status and the
/// daemon's explanation so callers can recognize specific conditions.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("daemon responded with status {status_code}: {message}")]
    Response { status_code: u16, message: String },

    #[error("could not talk to the daemon: {0}")]
    Transport(String),
}

impl ApiError {
    /// A 404 that means the inspected image simply is not there.
    pub fn is_no_such_image(&self) -> bool {
        matches!(
            self,
            ApiError::Response { status_code: 404, message } if message.contains("No such image")
        )
    }

    /// The daemon's "no such process" complaint when stopping a container
    /// whose process already exited.
    pub fn is_no_such_process(&self) -> bool {
        matches!(
            self,
            ApiError::Response { status_code: 500, message }
                if message.to_lowercase().contains("no such process")
        )
    }
}

/// An exposed container port, `port` plus an optional protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExposedPort {
    pub port: String,
    pub protocol: Option<String>,
}

impl fmt::Display for ExposedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.protocol {
            Some(proto) => write!(f, "{}/{}", self.port, proto),
            None => write!(f, "{}", self.port),
        }
    }
}

/// Log driver configuration forwarded to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogConfigSpec {
    pub driver: String,
    pub options: BTreeMap<String, String>,
}

impl Default for LogConfigSpec {
    fn default() -> Self {
        Self {
            driver: "json-file".to_string(),
            options: BTreeMap::new(),
        }
    }
}

/// The host-configuration half of a create call, shaped like the daemon's
/// payload. Everything here is start-time configuration; the create record
/// itself carries only create-time keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostConfigSpec {
    pub binds: Vec<String>,
    /// `(container name, alias)` pairs.
    pub links: Vec<(String, String)>,
    /// Container port to the host bindings published for it.
    pub port_bindings: BTreeMap<String, Vec<Option<HostBinding>>>,
    pub volumes_from: Vec<String>,
    pub network_mode: Option<String>,
    pub privileged: bool,
    pub devices: Vec<String>,
    pub dns: Vec<String>,
    pub dns_search: Vec<String>,
    pub restart_policy: Option<RestartSpec>,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub log_config: LogConfigSpec,
    pub extra_hosts: BTreeMap<String, String>,
    pub read_only: bool,
    pub pid_mode: Option<String>,
    pub security_opt: Vec<String>,
    pub memory: Option<i64>,
    pub cpu_shares: Option<i64>,
}

/// The full create-call payload for one container.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateOptions {
    pub name: String,
    pub image: String,
    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    pub hostname: Option<String>,
    pub domainname: Option<String>,
    pub user: Option<String>,
    pub working_dir: Option<String>,
    pub detach: bool,
    pub stdin_open: bool,
    pub tty: bool,
    pub environment: BTreeMap<String, String>,
    /// Ports the container exposes (the daemon's exposed-ports set).
    pub ports: Vec<ExposedPort>,
    /// Internal paths declared as data volumes (the daemon's volume set).
    pub volumes: BTreeSet<String>,
    pub labels: BTreeMap<String, String>,
    pub host_config: HostConfigSpec,
}

/// What the engine needs to know about an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: ImageId,
    /// Internal paths the image declares as data volumes.
    pub volumes: Vec<String>,
}

/// A build invocation: context path, target tag and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub path: PathBuf,
    pub tag: String,
    pub rm: bool,
    pub nocache: bool,
    pub dockerfile: Option<String>,
}

/// A stream of progress event dicts as the daemon emits them during build
/// and pull.
pub type EventStream =
    Pin<Box<dyn Stream<Item = Result<serde_json::Value, ApiError>> + Send>>;

/// The runtime operations the engine consumes. Implemented over the daemon's
/// HTTP API in production and in memory in tests.
#[async_trait]
pub trait DaemonApi: Send + Sync {
    /// List containers, optionally including stopped ones, filtered by
    /// `key=value` label selectors.
    async fn containers(
        &self,
        all: bool,
        label_filters: Option<&[String]>,
    ) -> Result<Vec<Container>, ApiError>;

    async fn inspect_image(&self, name: &str) -> Result<ImageRecord, ApiError>;

    /// Create a container and return its id. The caller already knows the
    /// name and labels it asked for.
    async fn create_container(&self, options: &CreateOptions) -> Result<ContainerId, ApiError>;

    async fn start_container(&self, id: &ContainerId) -> Result<(), ApiError>;

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Option<Duration>,
    ) -> Result<(), ApiError>;

    async fn kill_container(&self, id: &ContainerId) -> Result<(), ApiError>;

    async fn restart_container(
        &self,
        id: &ContainerId,
        timeout: Option<Duration>,
    ) -> Result<(), ApiError>;

    async fn remove_container(&self, id: &ContainerId) -> Result<(), ApiError>;

    async fn rename_container(&self, id: &ContainerId, new_name: &str) -> Result<(), ApiError>;

    async fn build_image(&self, request: &BuildRequest) -> Result<EventStream, ApiError>;

    async fn pull_image(
        &self,
        repo: &str,
        tag: &str,
        insecure_registry: bool,
    ) -> Result<EventStream, ApiError>;

    /// Release the HTTP client's connections. Called after streaming
    /// operations so the next request starts on a fresh connection.
    async fn close(&self);
}
