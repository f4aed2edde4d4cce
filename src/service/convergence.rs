// ABOUTME: Convergence planning and execution: create, recreate, start, noop.
// ABOUTME: Divergence is detected by comparing config-hash labels.

use tracing::{debug, info};

use crate::container::Container;
use crate::error::Result;
use crate::labels::LABEL_CONFIG_HASH;
use crate::progress::ProgressSink;
use crate::runtime::DaemonApi;

use super::{CreateConfig, Service};

/// What a convergence pass decided to do with the service's containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergencePlan {
    /// No containers exist; create and start one.
    Create,
    /// Replace each container, carrying over numbers and data volumes.
    Recreate(Vec<Container>),
    /// Start the listed containers where stopped.
    Start(Vec<Container>),
    /// Everything matches the declaration; leave it alone.
    Noop(Vec<Container>),
}

impl ConvergencePlan {
    pub fn action(&self) -> &'static str {
        match self {
            ConvergencePlan::Create => "create",
            ConvergencePlan::Recreate(_) => "recreate",
            ConvergencePlan::Start(_) => "start",
            ConvergencePlan::Noop(_) => "noop",
        }
    }
}

/// Flags for a convergence pass.
#[derive(Debug, Clone, Copy)]
pub struct ConvergeOptions {
    /// Permit replacing existing containers.
    pub allow_recreate: bool,
    /// Only recreate containers whose config hash has diverged.
    pub smart_recreate: bool,
    pub insecure_registry: bool,
    pub do_build: bool,
}

impl Default for ConvergeOptions {
    fn default() -> Self {
        Self {
            allow_recreate: true,
            smart_recreate: false,
            insecure_registry: false,
            do_build: true,
        }
    }
}

impl Service {
    /// Bring the observed container set into agreement with the declaration:
    /// plan, then execute.
    pub async fn converge(
        &self,
        daemon: &dyn DaemonApi,
        options: ConvergeOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<Container>> {
        self.invalidate_image_cache();

        let plan = self
            .convergence_plan(daemon, options.allow_recreate, options.smart_recreate)
            .await?;

        self.execute_convergence_plan(
            daemon,
            plan,
            options.insecure_registry,
            options.do_build,
            progress,
        )
        .await
    }

    /// Choose among create, recreate, start and noop from the containers
    /// currently present.
    pub async fn convergence_plan(
        &self,
        daemon: &dyn DaemonApi,
        allow_recreate: bool,
        smart_recreate: bool,
    ) -> Result<ConvergencePlan> {
        let containers = self.containers(daemon, true, false).await?;

        if containers.is_empty() {
            return Ok(ConvergencePlan::Create);
        }

        if smart_recreate && !self.containers_have_diverged(daemon, &containers).await? {
            let stopped: Vec<Container> =
                containers.iter().filter(|c| !c.running).cloned().collect();

            if !stopped.is_empty() {
                return Ok(ConvergencePlan::Start(stopped));
            }

            return Ok(ConvergencePlan::Noop(containers));
        }

        if !allow_recreate {
            return Ok(ConvergencePlan::Start(containers));
        }

        Ok(ConvergencePlan::Recreate(containers))
    }

    /// An unconditional recreate plan over all containers, stopped included.
    pub async fn recreate_plan(&self, daemon: &dyn DaemonApi) -> Result<ConvergencePlan> {
        Ok(ConvergencePlan::Recreate(
            self.containers(daemon, true, false).await?,
        ))
    }

    async fn containers_have_diverged(
        &self,
        daemon: &dyn DaemonApi,
        containers: &[Container],
    ) -> Result<bool> {
        let config_hash = self.config_hash(daemon).await?;
        let mut has_diverged = false;

        for container in containers {
            let container_hash = container.labels.get(LABEL_CONFIG_HASH);
            if container_hash.map(String::as_str) != Some(config_hash.as_str()) {
                debug!(
                    "{} has diverged: {:?} != {}",
                    container.name, container_hash, config_hash
                );
                has_diverged = true;
            }
        }

        Ok(has_diverged)
    }

    /// Apply a plan and return the resulting containers.
    pub async fn execute_convergence_plan(
        &self,
        daemon: &dyn DaemonApi,
        plan: ConvergencePlan,
        insecure_registry: bool,
        do_build: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<Container>> {
        match plan {
            ConvergencePlan::Create => {
                let mut container = self
                    .create_container(
                        daemon,
                        CreateConfig {
                            insecure_registry,
                            do_build,
                            ..Default::default()
                        },
                        progress,
                    )
                    .await?;
                daemon.start_container(&container.id).await?;
                container.running = true;
                Ok(vec![container])
            }

            ConvergencePlan::Recreate(containers) => {
                let mut recreated = Vec::new();
                for container in containers {
                    recreated.push(
                        self.recreate_container(daemon, container, insecure_registry, progress)
                            .await?,
                    );
                }
                Ok(recreated)
            }

            ConvergencePlan::Start(containers) => {
                let mut started = Vec::new();
                for container in containers {
                    started.push(self.start_container_if_stopped(daemon, container).await?);
                }
                Ok(started)
            }

            ConvergencePlan::Noop(containers) => {
                for container in &containers {
                    info!("{} is up-to-date", container.name);
                }
                Ok(containers)
            }
        }
    }

    /// Replace one container: stop it, rename it aside so its name frees up,
    /// create the replacement under the same number with volume carry-over,
    /// start the replacement, then remove the original.
    pub async fn recreate_container(
        &self,
        daemon: &dyn DaemonApi,
        container: Container,
        insecure_registry: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<Container> {
        info!("Recreating {}...", container.name);

        match daemon.stop_container(&container.id, None).await {
            Ok(()) => {}
            // The process already exited; the container counts as stopped.
            Err(e) if e.is_no_such_process() => {}
            Err(e) => return Err(e.into()),
        }

        daemon
            .rename_container(
                &container.id,
                &format!("{}_{}", container.short_id(), container.name),
            )
            .await?;

        let mut new_container = self
            .create_container(
                daemon,
                CreateConfig {
                    insecure_registry,
                    do_build: false,
                    previous_container: Some(container.clone()),
                    number: container.number(),
                    ..Default::default()
                },
                progress,
            )
            .await?;

        daemon.start_container(&new_container.id).await?;
        new_container.running = true;

        daemon.remove_container(&container.id).await?;

        Ok(new_container)
    }

    /// Start a container unless it is already running.
    pub async fn start_container_if_stopped(
        &self,
        daemon: &dyn DaemonApi,
        container: Container,
    ) -> Result<Container> {
        if container.running {
            return Ok(container);
        }

        info!("Starting {}...", container.name);
        daemon.start_container(&container.id).await?;

        let mut container = container;
        container.running = true;
        Ok(container)
    }

    /// Create and start a container when none exist, otherwise start the
    /// stopped ones. The "bring it up without recreating" primitive.
    pub async fn start_or_create_containers(
        &self,
        daemon: &dyn DaemonApi,
        insecure_registry: bool,
        do_build: bool,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<Container>> {
        let containers = self.containers(daemon, true, false).await?;

        if containers.is_empty() {
            let mut container = self
                .create_container(
                    daemon,
                    CreateConfig {
                        insecure_registry,
                        do_build,
                        ..Default::default()
                    },
                    progress,
                )
                .await?;
            daemon.start_container(&container.id).await?;
            container.running = true;
            return Ok(vec![container]);
        }

        let mut started = Vec::new();
        for container in containers {
            started.push(self.start_container_if_stopped(daemon, container).await?);
        }
        Ok(started)
    }
}
