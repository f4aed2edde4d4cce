// ABOUTME: Container creation: assembling the create payload from declared
// ABOUTME: options, per-call overrides, links, volumes-from and net sources.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info, warn};

use crate::container::Container;
use crate::error::Result;
use crate::labels::{self, LABEL_CONFIG_HASH};
use crate::progress::ProgressSink;
use crate::runtime::{CreateOptions, DaemonApi, ExposedPort, HostConfigSpec, LogConfigSpec};
use crate::spec::{ConfigError, build_port_bindings, parse_restart_spec};

use super::options::{CreateOverrides, merge_environment};
use super::{NetRef, Service, VolumesFromRef, volumes};

/// Per-call settings for creating one container.
#[derive(Debug, Clone)]
pub struct CreateConfig {
    /// One-off containers get `_run_` names, their own number namespace and
    /// no config-hash label.
    pub one_off: bool,
    pub insecure_registry: bool,
    /// Whether a missing image may be built; when false a buildable service
    /// with no image fails instead.
    pub do_build: bool,
    /// Reuse a specific container number instead of allocating the next one.
    pub number: Option<u32>,
    /// The container being replaced; enables volume carry-over and the
    /// scheduling affinity hint.
    pub previous_container: Option<Container>,
    pub overrides: CreateOverrides,
}

impl Default for CreateConfig {
    fn default() -> Self {
        Self {
            one_off: false,
            insecure_registry: false,
            do_build: true,
            number: None,
            previous_container: None,
            overrides: CreateOverrides::default(),
        }
    }
}

impl Service {
    /// Create a container for this service, provisioning the image first.
    /// The returned snapshot reflects the payload sent; the container is not
    /// started.
    pub async fn create_container(
        &self,
        daemon: &dyn DaemonApi,
        config: CreateConfig,
        progress: &mut dyn ProgressSink,
    ) -> Result<Container> {
        self.ensure_image_exists(daemon, config.do_build, config.insecure_registry, progress)
            .await?;

        let number = match config.number {
            Some(number) => number,
            None => self.next_container_number(daemon, config.one_off).await?,
        };

        let options = self
            .container_create_options(daemon, &config, number, progress)
            .await?;

        info!("Creating {}...", options.name);
        let id = daemon.create_container(&options).await?;

        let volumes = volumes_from_binds(&options.host_config.binds);
        Ok(Container {
            id,
            name: options.name,
            image: options.image,
            running: false,
            labels: options.labels.into_iter().collect(),
            volumes,
        })
    }

    /// Assemble the create payload: declared options layered with overrides,
    /// normalized for the daemon, plus identity labels and the host config.
    async fn container_create_options(
        &self,
        daemon: &dyn DaemonApi,
        config: &CreateConfig,
        number: u32,
        progress: &mut dyn ProgressSink,
    ) -> Result<CreateOptions> {
        let opts = self.options();
        let over = &config.overrides;
        let add_config_hash = !config.one_off && over.is_empty();

        // A qualified hostname splits into hostname and domainname unless a
        // domainname was given explicitly, matching the runtime CLI.
        let mut hostname = opts.hostname.clone();
        let mut domainname = opts.domainname.clone();
        if domainname.is_none()
            && let Some(qualified) = hostname.as_deref()
            && let Some((host, domain)) = qualified.split_once('.')
        {
            let (host, domain) = (host.to_string(), domain.to_string());
            hostname = Some(host);
            domainname = Some(domain);
        }

        // Exposed ports: published ports plus bare exposes, reduced to the
        // container side.
        let declared_ports = over.ports.as_ref().unwrap_or(&opts.ports);
        let mut ports = Vec::new();
        for entry in declared_ports.iter().chain(opts.expose.iter()) {
            let container_side = entry.rsplit(':').next().unwrap_or(entry);
            ports.push(match container_side.split_once('/') {
                Some((port, proto)) => ExposedPort {
                    port: port.to_string(),
                    protocol: Some(proto.to_string()),
                },
                None => ExposedPort {
                    port: container_side.to_string(),
                    protocol: None,
                },
            });
        }

        // Volume bindings, with carry-over from the replaced container.
        let declared_volumes = volumes::parse_declared_volumes(&opts.volumes)?;
        let previous_image_volumes = match &config.previous_container {
            Some(previous) => daemon.inspect_image(&previous.image).await?.volumes,
            None => Vec::new(),
        };
        let binds = volumes::merge_volume_bindings(
            &declared_volumes,
            config
                .previous_container
                .as_ref()
                .map(|previous| (previous, previous_image_volumes.as_slice())),
        );
        let volume_set: BTreeSet<String> = declared_volumes
            .iter()
            .map(|v| v.internal.clone())
            .collect();

        let mut environment = match &over.environment {
            Some(extra) => merge_environment(&opts.environment, extra),
            None => opts.environment.clone(),
        };
        if let Some(previous) = &config.previous_container {
            // Keep the replacement on the same node as the data it inherits.
            environment.insert("affinity:container".to_string(), format!("={}", previous.id));
        }

        let mut user_labels = opts.labels.clone();
        if add_config_hash {
            let config_hash = self.config_hash(daemon).await?;
            debug!("Added config hash: {config_hash}");
            user_labels.insert(LABEL_CONFIG_HASH.to_string(), config_hash);
        }
        let container_labels = labels::build_container_labels(
            user_labels,
            self.project(),
            self.name(),
            config.one_off,
            number,
        );

        let host_config = self
            .container_host_config(daemon, config, binds, progress)
            .await?;

        Ok(CreateOptions {
            name: self.get_container_name(number, config.one_off),
            image: self.image_name(),
            command: over.command.clone().or_else(|| opts.command.clone()),
            entrypoint: over.entrypoint.clone().or_else(|| opts.entrypoint.clone()),
            hostname,
            domainname,
            user: over.user.clone().or_else(|| opts.user.clone()),
            working_dir: over.working_dir.clone().or_else(|| opts.working_dir.clone()),
            detach: over.detach.or(opts.detach).unwrap_or(true),
            stdin_open: over.stdin_open.unwrap_or(opts.stdin_open),
            tty: over.tty.unwrap_or(opts.tty),
            environment,
            ports,
            volumes: volume_set,
            labels: container_labels,
            host_config,
        })
    }

    async fn container_host_config(
        &self,
        daemon: &dyn DaemonApi,
        config: &CreateConfig,
        binds: Vec<String>,
        progress: &mut dyn ProgressSink,
    ) -> Result<HostConfigSpec> {
        let opts = self.options();
        let effective_ports = config.overrides.ports.as_ref().unwrap_or(&opts.ports);

        Ok(HostConfigSpec {
            binds,
            links: self.get_links(daemon, config.one_off).await?,
            port_bindings: build_port_bindings(effective_ports)?,
            volumes_from: self.get_volumes_from(daemon, progress).await?,
            network_mode: self.get_net(daemon).await?,
            privileged: opts.privileged,
            devices: opts.devices.clone(),
            dns: opts.dns.as_ref().map(|d| d.to_vec()).unwrap_or_default(),
            dns_search: opts
                .dns_search
                .as_ref()
                .map(|d| d.to_vec())
                .unwrap_or_default(),
            restart_policy: parse_restart_spec(opts.restart.as_deref())?,
            cap_add: opts.cap_add.clone(),
            cap_drop: opts.cap_drop.clone(),
            log_config: LogConfigSpec {
                driver: opts
                    .log_driver
                    .clone()
                    .unwrap_or_else(|| "json-file".to_string()),
                options: BTreeMap::new(),
            },
            extra_hosts: opts
                .extra_hosts
                .as_ref()
                .map(|h| h.to_map())
                .transpose()?
                .unwrap_or_default(),
            read_only: opts.read_only,
            pid_mode: opts.pid.clone(),
            security_opt: opts.security_opt.clone(),
            memory: opts.mem_limit,
            cpu_shares: opts.cpu_shares,
        })
    }

    /// Link entries for the host config: for every container of each linked
    /// service, the alias, the full name and the project-less name. One-off
    /// runs also link back to the service's own containers.
    async fn get_links(
        &self,
        daemon: &dyn DaemonApi,
        link_to_self: bool,
    ) -> Result<Vec<(String, String)>> {
        let mut links = Vec::new();

        let entries: Vec<_> = self
            .links
            .read()
            .iter()
            .map(|l| (l.name.clone(), l.service.clone(), l.alias.clone()))
            .collect();

        for (name, weak, alias) in entries {
            let service = weak
                .upgrade()
                .ok_or(ConfigError::DanglingReference(name))?;
            for container in service.containers(daemon, false, false).await? {
                links.push((
                    container.name.clone(),
                    alias.clone().unwrap_or_else(|| service.name().to_string()),
                ));
                links.push((container.name.clone(), container.name.clone()));
                links.push((
                    container.name.clone(),
                    container.name_without_project().to_string(),
                ));
            }
        }

        if link_to_self {
            for container in self.containers(daemon, false, false).await? {
                links.push((container.name.clone(), self.name().to_string()));
                links.push((container.name.clone(), container.name.clone()));
                links.push((
                    container.name.clone(),
                    container.name_without_project().to_string(),
                ));
            }
        }

        let externals: Vec<String> = self.external_links.read().clone();
        for external in externals {
            match external.split_once(':') {
                Some((name, alias)) => links.push((name.to_string(), alias.to_string())),
                None => links.push((external.clone(), external)),
            }
        }

        Ok(links)
    }

    /// Container ids to mount volumes from. A source service with no
    /// containers gets one created eagerly so there is something to inherit.
    async fn get_volumes_from(
        &self,
        daemon: &dyn DaemonApi,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<String>> {
        let sources: Vec<VolumesFromRef> = self.volumes_from.read().clone();
        let mut ids = Vec::new();

        for source in sources {
            match source {
                VolumesFromRef::Service { name, service } => {
                    let service = service
                        .upgrade()
                        .ok_or(ConfigError::DanglingReference(name))?;
                    let containers = service.containers(daemon, true, false).await?;
                    if containers.is_empty() {
                        // Boxed: creating the source container re-enters the
                        // create path for another service.
                        let created: Pin<Box<dyn Future<Output = Result<Container>> + '_>> =
                            Box::pin(service.create_container(
                                daemon,
                                CreateConfig::default(),
                                progress,
                            ));
                        ids.push(created.await?.id.to_string());
                    } else {
                        ids.extend(containers.iter().map(|c| c.id.to_string()));
                    }
                }
                VolumesFromRef::Container(container) => ids.push(container.id.to_string()),
            }
        }

        Ok(ids)
    }

    /// The network mode string for the host config. Unset means the default
    /// bridge; a service source borrows its first container's stack.
    async fn get_net(&self, daemon: &dyn DaemonApi) -> Result<Option<String>> {
        let net = self.net.read().clone();
        match net {
            NetRef::Default => Ok(Some("bridge".to_string())),
            NetRef::Mode(mode) => Ok(Some(mode)),
            NetRef::Container(container) => Ok(Some(format!("container:{}", container.id))),
            NetRef::Service { name, service } => {
                let service = service
                    .upgrade()
                    .ok_or(ConfigError::DanglingReference(name))?;
                let containers = service.containers(daemon, false, false).await?;
                match containers.first() {
                    Some(first) => Ok(Some(format!("container:{}", first.id))),
                    None => {
                        warn!(
                            "Service {} is trying to reuse the network stack of another \
                             service that is not running.",
                            service.name()
                        );
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// Reconstruct the internal-to-host volume map from bind strings, for the
/// snapshot of a container we just asked the daemon to create.
fn volumes_from_binds(binds: &[String]) -> HashMap<String, String> {
    binds
        .iter()
        .filter_map(|bind| {
            let mut parts = bind.rsplitn(3, ':');
            let _mode = parts.next()?;
            let internal = parts.next()?;
            let external = parts.next()?;
            Some((internal.to_string(), external.to_string()))
        })
        .collect()
}
