// ABOUTME: The Service type: a named declaration the engine converges on.
// ABOUTME: Discovery, lifecycle operations, scaling and identity live here.

mod convergence;
mod create;
mod image;
mod legacy;
mod options;
mod volumes;

pub use convergence::{ConvergeOptions, ConvergencePlan};
pub use create::CreateConfig;
pub use options::{CreateOverrides, ServiceOptions, StringOrList, merge_environment};

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::container::Container;
use crate::error::{Result, ServiceError};
use crate::fingerprint;
use crate::labels::{self, LABEL_CONTAINER_NUMBER};
use crate::progress::ProgressSink;
use crate::runtime::{DaemonApi, ImageRecord};
use crate::spec::ConfigError;
use crate::types::Name;

/// A link to another service, held by name with a weak handle resolved at
/// call time. Service graphs may be cyclic; weak references keep them from
/// leaking or forcing eager construction.
#[derive(Debug)]
struct ServiceLink {
    name: String,
    service: Weak<Service>,
    alias: Option<String>,
}

/// A `volumes_from` source: another service, or a concrete container.
#[derive(Clone, Debug)]
enum VolumesFromRef {
    Service { name: String, service: Weak<Service> },
    Container(Container),
}

/// The `net` option: unset, a literal mode string, another service, or a
/// concrete container.
#[derive(Clone, Debug)]
enum NetRef {
    Default,
    Mode(String),
    Service { name: String, service: Weak<Service> },
    Container(Container),
}

/// A named service declaration under a project. All durable state lives on
/// the daemon; a `Service` is pure declaration plus a per-pass image cache.
#[derive(Debug)]
pub struct Service {
    name: Name,
    project: Name,
    options: ServiceOptions,
    links: RwLock<Vec<ServiceLink>>,
    external_links: RwLock<Vec<String>>,
    volumes_from: RwLock<Vec<VolumesFromRef>>,
    net: RwLock<NetRef>,
    /// Image inspection cached for the duration of one convergence pass so
    /// the fingerprint stays stable within it.
    image_cache: Mutex<Option<ImageRecord>>,
}

impl Service {
    /// Validate and build a service declaration. The name and project must be
    /// alphanumeric, and exactly one of `image` or `build` must be set.
    pub fn new(name: &str, project: &str, options: ServiceOptions) -> Result<Self> {
        let name = Name::new("service", name)?;
        let project = Name::new("project", project)?;

        if options.image.is_some() && options.build.is_some() {
            return Err(ConfigError::ImageAndBuild(name.to_string()).into());
        }
        if options.image.is_none() && options.build.is_none() {
            return Err(ConfigError::NeitherImageNorBuild(name.to_string()).into());
        }

        Ok(Self {
            name,
            project,
            options,
            links: RwLock::new(Vec::new()),
            external_links: RwLock::new(Vec::new()),
            volumes_from: RwLock::new(Vec::new()),
            net: RwLock::new(NetRef::Default),
            image_cache: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn project(&self) -> &str {
        self.project.as_str()
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    // ---- graph wiring -------------------------------------------------

    /// Link to another service, optionally under an alias.
    pub fn add_link(&self, service: &Arc<Service>, alias: Option<&str>) {
        self.links.write().push(ServiceLink {
            name: service.name().to_string(),
            service: Arc::downgrade(service),
            alias: alias.map(str::to_string),
        });
    }

    /// Link to a container outside the project: `name` or `name:alias`.
    pub fn add_external_link(&self, spec: &str) {
        self.external_links.write().push(spec.to_string());
    }

    pub fn add_volumes_from_service(&self, service: &Arc<Service>) {
        self.volumes_from.write().push(VolumesFromRef::Service {
            name: service.name().to_string(),
            service: Arc::downgrade(service),
        });
    }

    pub fn add_volumes_from_container(&self, container: Container) {
        self.volumes_from
            .write()
            .push(VolumesFromRef::Container(container));
    }

    pub fn set_net_mode(&self, mode: &str) {
        *self.net.write() = NetRef::Mode(mode.to_string());
    }

    pub fn set_net_service(&self, service: &Arc<Service>) {
        *self.net.write() = NetRef::Service {
            name: service.name().to_string(),
            service: Arc::downgrade(service),
        };
    }

    pub fn set_net_container(&self, container: Container) {
        *self.net.write() = NetRef::Container(container);
    }

    // ---- dependency introspection ------------------------------------

    pub fn get_linked_names(&self) -> Vec<String> {
        self.links.read().iter().map(|l| l.name.clone()).collect()
    }

    pub fn get_volumes_from_names(&self) -> Vec<String> {
        self.volumes_from
            .read()
            .iter()
            .filter_map(|source| match source {
                VolumesFromRef::Service { name, .. } => Some(name.clone()),
                VolumesFromRef::Container(_) => None,
            })
            .collect()
    }

    pub fn get_net_name(&self) -> Option<String> {
        match &*self.net.read() {
            NetRef::Service { name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    /// Services this one must be brought up after.
    pub fn get_dependency_names(&self) -> Vec<String> {
        let mut names = self.get_linked_names();
        names.extend(self.get_volumes_from_names());
        names.extend(self.get_net_name());
        names
    }

    // ---- identity -----------------------------------------------------

    /// The tag given to images built for this service.
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.project, self.name)
    }

    pub fn can_be_built(&self) -> bool {
        self.options.build.is_some()
    }

    /// The image this service runs: the local build tag for buildable
    /// services, otherwise the declared image reference.
    pub fn image_name(&self) -> String {
        if self.can_be_built() {
            self.full_name()
        } else {
            self.options.image.clone().unwrap_or_default()
        }
    }

    /// The `key=value` label selectors scoping this service's containers.
    pub fn labels(&self, one_off: bool) -> Vec<String> {
        labels::service_label_filters(self.project.as_str(), self.name.as_str(), one_off)
    }

    pub fn get_container_name(&self, number: u32, one_off: bool) -> String {
        labels::build_container_name(self.project.as_str(), self.name.as_str(), number, one_off)
    }

    /// `1 + max(existing numbers)`, or `1` when no containers match.
    pub(crate) async fn next_container_number(
        &self,
        daemon: &dyn DaemonApi,
        one_off: bool,
    ) -> Result<u32> {
        let containers = daemon.containers(true, Some(&self.labels(one_off))).await?;
        let highest = containers.iter().filter_map(Container::number).max();
        Ok(highest.map_or(1, |n| n + 1))
    }

    /// The current config fingerprint: declared options plus the identity of
    /// the image that would run.
    pub async fn config_hash(&self, daemon: &dyn DaemonApi) -> Result<String> {
        let image = self.require_image(daemon).await?;
        Ok(fingerprint::config_hash(
            &self.options.to_json(),
            image.id.as_str(),
        ))
    }

    // ---- discovery ----------------------------------------------------

    /// The containers this service owns, identified by labels. When none are
    /// found, unlabeled containers matching the naming convention trigger an
    /// advisory warning.
    pub async fn containers(
        &self,
        daemon: &dyn DaemonApi,
        stopped: bool,
        one_off: bool,
    ) -> Result<Vec<Container>> {
        let containers = daemon
            .containers(stopped, Some(&self.labels(one_off)))
            .await?;

        if containers.is_empty() {
            legacy::check_for_legacy_containers(
                daemon,
                self.project.as_str(),
                &[self.name.as_str()],
                stopped,
                one_off,
            )
            .await?;
        }

        Ok(containers)
    }

    /// The active container with the given number, if any.
    pub async fn get_container(
        &self,
        daemon: &dyn DaemonApi,
        number: u32,
    ) -> Result<Option<Container>> {
        let mut filters = self.labels(false);
        filters.push(format!("{LABEL_CONTAINER_NUMBER}={number}"));
        let containers = daemon.containers(false, Some(&filters)).await?;
        Ok(containers.into_iter().next())
    }

    // ---- lifecycle ----------------------------------------------------

    /// Start every stopped container.
    pub async fn start(&self, daemon: &dyn DaemonApi) -> Result<Vec<Container>> {
        let mut started = Vec::new();
        for container in self.containers(daemon, true, false).await? {
            started.push(self.start_container_if_stopped(daemon, container).await?);
        }
        Ok(started)
    }

    pub async fn stop(&self, daemon: &dyn DaemonApi, timeout: Option<Duration>) -> Result<()> {
        for container in self.containers(daemon, false, false).await? {
            info!("Stopping {}...", container.name);
            daemon.stop_container(&container.id, timeout).await?;
        }
        Ok(())
    }

    pub async fn kill(&self, daemon: &dyn DaemonApi) -> Result<()> {
        for container in self.containers(daemon, false, false).await? {
            info!("Killing {}...", container.name);
            daemon.kill_container(&container.id).await?;
        }
        Ok(())
    }

    pub async fn restart(&self, daemon: &dyn DaemonApi, timeout: Option<Duration>) -> Result<()> {
        for container in self.containers(daemon, false, false).await? {
            info!("Restarting {}...", container.name);
            daemon.restart_container(&container.id, timeout).await?;
        }
        Ok(())
    }

    /// Remove every container that is not running.
    pub async fn remove_stopped(&self, daemon: &dyn DaemonApi) -> Result<()> {
        for container in self.containers(daemon, true, false).await? {
            if !container.running {
                info!("Removing {}...", container.name);
                daemon.remove_container(&container.id).await?;
            }
        }
        Ok(())
    }

    // ---- scaling ------------------------------------------------------

    /// A service is scalable only when no port mapping claims a host port;
    /// two containers cannot share one.
    pub fn can_be_scaled(&self) -> bool {
        self.options.ports.iter().all(|port| !port.contains(':'))
    }

    /// Drive the running set to `desired` containers: create until enough
    /// exist, stop the highest-numbered extras, start the lowest-numbered
    /// stopped ones, then clear out everything still stopped.
    pub async fn scale(
        &self,
        daemon: &dyn DaemonApi,
        desired: usize,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<Container>> {
        if !self.can_be_scaled() {
            return Err(ServiceError::CannotBeScaled {
                service: self.name.to_string(),
            });
        }

        self.invalidate_image_cache();

        let mut containers = self.containers(daemon, true, false).await?;
        while containers.len() < desired {
            containers.push(
                self.create_container(daemon, CreateConfig::default(), progress)
                    .await?,
            );
        }

        let (mut running, mut stopped): (Vec<Container>, Vec<Container>) =
            containers.into_iter().partition(|c| c.running);
        running.sort_by_key(|c| c.number().unwrap_or(0));
        stopped.sort_by_key(|c| c.number().unwrap_or(0));

        while running.len() > desired {
            let Some(mut container) = running.pop() else {
                break;
            };
            info!("Stopping {}...", container.name);
            daemon
                .stop_container(&container.id, Some(Duration::from_secs(1)))
                .await?;
            container.running = false;
            stopped.push(container);
        }

        while running.len() < desired {
            if stopped.is_empty() {
                break;
            }
            let mut container = stopped.remove(0);
            info!("Starting {}...", container.name);
            daemon.start_container(&container.id).await?;
            container.running = true;
            running.push(container);
        }

        self.remove_stopped(daemon).await?;
        Ok(running)
    }

    // ---- image cache --------------------------------------------------

    pub(crate) fn invalidate_image_cache(&self) {
        *self.image_cache.lock() = None;
    }

    pub(crate) fn cached_image(&self) -> Option<ImageRecord> {
        self.image_cache.lock().clone()
    }

    pub(crate) fn cache_image(&self, image: ImageRecord) {
        *self.image_cache.lock() = Some(image);
    }
}
