// ABOUTME: Bollard-backed implementation of the daemon API.
// ABOUTME: Translates engine payload records onto the Docker Engine HTTP API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, DeviceMapping, HostConfig, HostConfigLogConfig, PortBinding,
    RestartPolicy, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    BuildImageOptions, CreateContainerOptions, CreateImageOptions, KillContainerOptions,
    ListContainersOptions, RemoveContainerOptions, RenameContainerOptions,
    RestartContainerOptions, StartContainerOptions, StopContainerOptions,
};
use futures::StreamExt;

use crate::container::Container;
use crate::spec::HostBinding;
use crate::types::{ContainerId, ImageId};

use super::api::{
    ApiError, BuildRequest, CreateOptions, DaemonApi, EventStream, HostConfigSpec, ImageRecord,
};

fn build_info_to_value(info: &bollard::models::BuildInfo) -> Result<serde_json::Value, serde_json::Error> {
    let mut value = serde_json::Map::new();
    if let Some(id) = &info.id {
        value.insert("id".to_string(), serde_json::to_value(id)?);
    }
    if let Some(stream) = &info.stream {
        value.insert("stream".to_string(), serde_json::to_value(stream)?);
    }
    if let Some(error_detail) = &info.error_detail {
        value.insert("errorDetail".to_string(), serde_json::to_value(error_detail)?);
    }
    if let Some(status) = &info.status {
        value.insert("status".to_string(), serde_json::to_value(status)?);
    }
    if let Some(progress_detail) = &info.progress_detail {
        value.insert("progressDetail".to_string(), serde_json::to_value(progress_detail)?);
    }
    if let Some(aux) = &info.aux {
        value.insert("aux".to_string(), serde_json::to_value(aux)?);
    }
    Ok(serde_json::Value::Object(value))
}

fn map_api_error(e: bollard::errors::Error) -> ApiError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => ApiError::Response {
            status_code,
            message,
        },
        other => ApiError::Transport(other.to_string()),
    }
}

/// Append `/tcp` when a port key has no protocol, as the daemon requires.
fn port_key(port: &str) -> String {
    if port.contains('/') {
        port.to_string()
    } else {
        format!("{port}/tcp")
    }
}

fn to_port_binding(binding: &Option<HostBinding>) -> PortBinding {
    match binding {
        None => PortBinding {
            host_ip: None,
            host_port: None,
        },
        Some(HostBinding::Port(port)) => PortBinding {
            host_ip: None,
            host_port: Some(port.clone()),
        },
        Some(HostBinding::Address { ip, port }) => PortBinding {
            host_ip: Some(ip.clone()),
            host_port: port.clone(),
        },
    }
}

fn to_device_mapping(device: &str) -> DeviceMapping {
    let mut parts = device.splitn(3, ':');
    let host = parts.next().unwrap_or_default().to_string();
    let container = parts.next().map(str::to_string).unwrap_or_else(|| host.clone());
    let permissions = parts.next().unwrap_or("rwm").to_string();
    DeviceMapping {
        path_on_host: Some(host),
        path_in_container: Some(container),
        cgroup_permissions: Some(permissions),
    }
}

fn to_restart_policy_name(name: &str) -> RestartPolicyNameEnum {
    match name {
        "no" => RestartPolicyNameEnum::NO,
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => RestartPolicyNameEnum::EMPTY,
    }
}

fn to_host_config(spec: &HostConfigSpec) -> HostConfig {
    let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
        .port_bindings
        .iter()
        .map(|(port, bindings)| {
            (
                port_key(port),
                Some(bindings.iter().map(to_port_binding).collect()),
            )
        })
        .collect();

    HostConfig {
        binds: if spec.binds.is_empty() {
            None
        } else {
            Some(spec.binds.clone())
        },
        links: if spec.links.is_empty() {
            None
        } else {
            Some(
                spec.links
                    .iter()
                    .map(|(name, alias)| format!("{name}:{alias}"))
                    .collect(),
            )
        },
        port_bindings: if port_bindings.is_empty() {
            None
        } else {
            Some(port_bindings)
        },
        volumes_from: if spec.volumes_from.is_empty() {
            None
        } else {
            Some(spec.volumes_from.clone())
        },
        network_mode: spec.network_mode.clone(),
        privileged: Some(spec.privileged),
        devices: if spec.devices.is_empty() {
            None
        } else {
            Some(spec.devices.iter().map(|d| to_device_mapping(d)).collect())
        },
        dns: if spec.dns.is_empty() {
            None
        } else {
            Some(spec.dns.clone())
        },
        dns_search: if spec.dns_search.is_empty() {
            None
        } else {
            Some(spec.dns_search.clone())
        },
        restart_policy: spec.restart_policy.as_ref().map(|policy| RestartPolicy {
            name: Some(to_restart_policy_name(&policy.name)),
            maximum_retry_count: Some(policy.maximum_retry_count as i64),
        }),
        cap_add: if spec.cap_add.is_empty() {
            None
        } else {
            Some(spec.cap_add.clone())
        },
        cap_drop: if spec.cap_drop.is_empty() {
            None
        } else {
            Some(spec.cap_drop.clone())
        },
        log_config: Some(HostConfigLogConfig {
            typ: Some(spec.log_config.driver.clone()),
            config: if spec.log_config.options.is_empty() {
                None
            } else {
                Some(spec.log_config.options.clone().into_iter().collect())
            },
        }),
        extra_hosts: if spec.extra_hosts.is_empty() {
            None
        } else {
            Some(
                spec.extra_hosts
                    .iter()
                    .map(|(host, ip)| format!("{host}:{ip}"))
                    .collect(),
            )
        },
        readonly_rootfs: Some(spec.read_only),
        pid_mode: spec.pid_mode.clone(),
        security_opt: if spec.security_opt.is_empty() {
            None
        } else {
            Some(spec.security_opt.clone())
        },
        memory: spec.memory,
        cpu_shares: spec.cpu_shares,
        ..Default::default()
    }
}

fn to_create_body(options: &CreateOptions) -> ContainerCreateBody {
    let env: Vec<String> = options
        .environment
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let exposed_ports: Vec<String> = options.ports.iter().map(|p| port_key(&p.to_string())).collect();

    ContainerCreateBody {
        image: Some(options.image.clone()),
        hostname: options.hostname.clone(),
        domainname: options.domainname.clone(),
        user: options.user.clone(),
        working_dir: options.working_dir.clone(),
        cmd: options.command.clone(),
        entrypoint: options.entrypoint.clone(),
        env: if env.is_empty() { None } else { Some(env) },
        labels: if options.labels.is_empty() {
            None
        } else {
            Some(options.labels.clone().into_iter().collect())
        },
        exposed_ports: if exposed_ports.is_empty() {
            None
        } else {
            Some(exposed_ports)
        },
        volumes: if options.volumes.is_empty() {
            None
        } else {
            Some(options.volumes.iter().cloned().collect())
        },
        open_stdin: Some(options.stdin_open),
        tty: Some(options.tty),
        attach_stdin: Some(!options.detach),
        attach_stdout: Some(!options.detach),
        attach_stderr: Some(!options.detach),
        host_config: Some(to_host_config(&options.host_config)),
        ..Default::default()
    }
}

/// The Docker Engine HTTP API, reached over the local socket.
pub struct BollardDaemon {
    client: Docker,
}

impl BollardDaemon {
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    /// Connect using the environment's defaults (DOCKER_HOST or the standard
    /// local socket).
    pub fn local() -> Result<Self, ApiError> {
        let client = Docker::connect_with_local_defaults().map_err(map_api_error)?;
        Ok(Self::new(client))
    }

    /// Connect to an explicit Unix socket path.
    pub fn unix(socket_path: &str) -> Result<Self, ApiError> {
        let client = Docker::connect_with_unix(socket_path, 120, bollard::API_DEFAULT_VERSION)
            .map_err(map_api_error)?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl DaemonApi for BollardDaemon {
    async fn containers(
        &self,
        all: bool,
        label_filters: Option<&[String]>,
    ) -> Result<Vec<Container>, ApiError> {
        let filters = label_filters.map(|labels| {
            HashMap::from([("label".to_string(), labels.to_vec())])
        });

        let opts = ListContainersOptions {
            all,
            filters,
            ..Default::default()
        };

        let summaries = self
            .client
            .list_containers(Some(opts))
            .await
            .map_err(map_api_error)?;

        Ok(summaries
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();

                let running = c
                    .state
                    .map(|s| format!("{s:?}").to_lowercase() == "running")
                    .unwrap_or(false);

                let volumes = c
                    .mounts
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| Some((m.destination?, m.source?)))
                    .collect();

                Container {
                    id: ContainerId::new(c.id.unwrap_or_default()),
                    name,
                    image: c.image.unwrap_or_default(),
                    running,
                    labels: c.labels.unwrap_or_default(),
                    volumes,
                }
            })
            .collect())
    }

    async fn inspect_image(&self, name: &str) -> Result<ImageRecord, ApiError> {
        let inspect = self
            .client
            .inspect_image(name)
            .await
            .map_err(map_api_error)?;

        Ok(ImageRecord {
            id: ImageId::new(inspect.id.unwrap_or_default()),
            volumes: inspect
                .config
                .and_then(|c| c.volumes)
                .unwrap_or_default(),
        })
    }

    async fn create_container(&self, options: &CreateOptions) -> Result<ContainerId, ApiError> {
        let opts = CreateContainerOptions {
            name: Some(options.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), to_create_body(options))
            .await
            .map_err(map_api_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ApiError> {
        self.client
            .start_container(id.as_str(), None::<StartContainerOptions>)
            .await
            .map_err(map_api_error)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Option<Duration>,
    ) -> Result<(), ApiError> {
        let opts = StopContainerOptions {
            t: timeout.map(|t| t.as_secs() as i32),
            signal: None,
        };

        self.client
            .stop_container(id.as_str(), Some(opts))
            .await
            .map_err(map_api_error)
    }

    async fn kill_container(&self, id: &ContainerId) -> Result<(), ApiError> {
        self.client
            .kill_container(id.as_str(), None::<KillContainerOptions>)
            .await
            .map_err(map_api_error)
    }

    async fn restart_container(
        &self,
        id: &ContainerId,
        timeout: Option<Duration>,
    ) -> Result<(), ApiError> {
        let opts = RestartContainerOptions {
            t: timeout.map(|t| t.as_secs() as i32),
            signal: None,
        };

        self.client
            .restart_container(id.as_str(), Some(opts))
            .await
            .map_err(map_api_error)
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<(), ApiError> {
        self.client
            .remove_container(id.as_str(), None::<RemoveContainerOptions>)
            .await
            .map_err(map_api_error)
    }

    async fn rename_container(&self, id: &ContainerId, new_name: &str) -> Result<(), ApiError> {
        self.client
            .rename_container(
                id.as_str(),
                RenameContainerOptions {
                    name: new_name.to_string(),
                },
            )
            .await
            .map_err(map_api_error)
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<EventStream, ApiError> {
        // The daemon's build endpoint takes the context as a tar stream.
        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_dir_all(".", &request.path)
            .map_err(|e| ApiError::Transport(format!("failed to tar build context: {e}")))?;
        let context = builder
            .into_inner()
            .map_err(|e| ApiError::Transport(format!("failed to tar build context: {e}")))?;

        let opts = BuildImageOptions {
            t: Some(request.tag.clone()),
            rm: request.rm,
            nocache: request.nocache,
            dockerfile: request.dockerfile.clone().unwrap_or_default(),
            ..Default::default()
        };

        let client = self.client.clone();
        let (tx, rx) = futures::channel::mpsc::unbounded();
        tokio::spawn(async move {
            let mut stream = client.build_image(
                opts,
                None,
                Some(bollard::body_full(bytes::Bytes::from(context))),
            );
            while let Some(item) = stream.next().await {
                let mapped = item.map_err(map_api_error).and_then(|info| {
                    build_info_to_value(&info).map_err(|e| ApiError::Transport(e.to_string()))
                });
                if tx.unbounded_send(mapped).is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(rx))
    }

    async fn pull_image(
        &self,
        repo: &str,
        tag: &str,
        insecure_registry: bool,
    ) -> Result<EventStream, ApiError> {
        if insecure_registry {
            // Registry trust is daemon-side configuration on this API version.
            tracing::debug!("insecure registry requested; deferring to daemon configuration");
        }

        let opts = CreateImageOptions {
            from_image: Some(repo.to_string()),
            tag: Some(tag.to_string()),
            ..Default::default()
        };

        let client = self.client.clone();
        let (tx, rx) = futures::channel::mpsc::unbounded();
        tokio::spawn(async move {
            let mut stream = client.create_image(Some(opts), None, None);
            while let Some(item) = stream.next().await {
                let mapped = item.map_err(map_api_error).and_then(|info| {
                    serde_json::to_value(&info).map_err(|e| ApiError::Transport(e.to_string()))
                });
                if tx.unbounded_send(mapped).is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(rx))
    }

    async fn close(&self) {
        // The underlying client pools connections per request; dropping the
        // stream above already released the build/pull connection.
        tracing::debug!("daemon client close requested");
    }
}
