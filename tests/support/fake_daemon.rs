// ABOUTME: In-memory DaemonApi implementation for engine tests.
// ABOUTME: Tracks containers, images, build/pull scripts and a call log.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use serde_json::{Value, json};

use convoy::Container;
use convoy::runtime::{
    ApiError, BuildRequest, CreateOptions, DaemonApi, EventStream, ImageRecord,
};
use convoy::types::{ContainerId, ImageId};

#[derive(Clone)]
struct FakeContainer {
    id: String,
    name: String,
    image: String,
    running: bool,
    labels: HashMap<String, String>,
    volumes: HashMap<String, String>,
}

#[derive(Default)]
struct State {
    containers: Vec<FakeContainer>,
    images: HashMap<String, ImageRecord>,
    pullable: HashMap<String, ImageRecord>,
    build_events: Vec<Value>,
    build_registers_id: Option<String>,
    creates: Vec<CreateOptions>,
    calls: Vec<String>,
    next_id: u64,
    closed: bool,
}

/// A daemon whose entire state lives in memory. Mutations go through the
/// same API surface the engine uses, so tests observe exactly what a real
/// daemon would have been asked to do.
#[derive(Default)]
pub struct FakeDaemon {
    state: Mutex<State>,
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- seeding ------------------------------------------------------

    pub fn seed_image(&self, name: &str, id: &str, volumes: &[&str]) {
        self.state.lock().images.insert(
            name.to_string(),
            ImageRecord {
                id: ImageId::new(id),
                volumes: volumes.iter().map(|v| v.to_string()).collect(),
            },
        );
    }

    /// Make `repo:tag` pullable; pulling registers it as an image.
    pub fn seed_pullable(&self, repo: &str, tag: &str, id: &str) {
        self.state.lock().pullable.insert(
            format!("{repo}:{tag}"),
            ImageRecord {
                id: ImageId::new(id),
                volumes: Vec::new(),
            },
        );
    }

    /// Script the next build: the events to stream, and the image id to
    /// register under the requested tag (None to leave the image missing).
    pub fn set_build(&self, events: Vec<Value>, registers_id: Option<&str>) {
        let mut state = self.state.lock();
        state.build_events = events;
        state.build_registers_id = registers_id.map(str::to_string);
    }

    /// Plant a container directly, bypassing the engine.
    pub fn seed_container(
        &self,
        name: &str,
        image: &str,
        running: bool,
        labels: &[(&str, &str)],
    ) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            image: image.to_string(),
            running,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            volumes: HashMap::new(),
        });
        id
    }

    // ---- observation --------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .containers
            .iter()
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn running_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .containers
            .iter()
            .filter(|c| c.running)
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn container_by_name(&self, name: &str) -> Option<Container> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(to_container)
    }

    pub fn creates(&self) -> Vec<CreateOptions> {
        self.state.lock().creates.clone()
    }

    pub fn last_create(&self) -> Option<CreateOptions> {
        self.state.lock().creates.last().cloned()
    }

    pub fn was_closed(&self) -> bool {
        self.state.lock().closed
    }
}

fn to_container(c: &FakeContainer) -> Container {
    Container {
        id: ContainerId::new(c.id.clone()),
        name: c.name.clone(),
        image: c.image.clone(),
        running: c.running,
        labels: c.labels.clone(),
        volumes: c.volumes.clone(),
    }
}

fn not_found(what: impl std::fmt::Display) -> ApiError {
    ApiError::Response {
        status_code: 404,
        message: format!("No such container: {what}"),
    }
}

fn matches_filters(container: &FakeContainer, filters: Option<&[String]>) -> bool {
    let Some(filters) = filters else {
        return true;
    };
    filters.iter().all(|filter| match filter.split_once('=') {
        Some((key, value)) => container.labels.get(key).map(String::as_str) == Some(value),
        None => false,
    })
}

fn events_stream(events: Vec<Value>) -> EventStream {
    Box::pin(stream::iter(events.into_iter().map(Ok)))
}

#[async_trait]
impl DaemonApi for FakeDaemon {
    async fn containers(
        &self,
        all: bool,
        label_filters: Option<&[String]>,
    ) -> Result<Vec<Container>, ApiError> {
        let state = self.state.lock();
        Ok(state
            .containers
            .iter()
            .filter(|c| (all || c.running) && matches_filters(c, label_filters))
            .map(to_container)
            .collect())
    }

    async fn inspect_image(&self, name: &str) -> Result<ImageRecord, ApiError> {
        let state = self.state.lock();
        // A bare repository resolves like repository:latest, as on a real
        // daemon.
        if let Some(record) = state
            .images
            .get(name)
            .or_else(|| state.images.get(&format!("{name}:latest")))
        {
            return Ok(record.clone());
        }
        Err(ApiError::Response {
            status_code: 404,
            message: format!("No such image: {name}"),
        })
    }

    async fn create_container(&self, options: &CreateOptions) -> Result<ContainerId, ApiError> {
        let mut state = self.state.lock();

        if state.containers.iter().any(|c| c.name == options.name) {
            return Err(ApiError::Response {
                status_code: 409,
                message: format!("Conflict. The name {} is already in use", options.name),
            });
        }

        let image_known = state.images.contains_key(&options.image)
            || state.images.contains_key(&format!("{}:latest", options.image));
        if !image_known {
            return Err(ApiError::Response {
                status_code: 404,
                message: format!("No such image: {}", options.image),
            });
        }

        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);

        // Host binds declared in the payload, plus generated paths for
        // anonymous data volumes, exactly like the daemon materializes them.
        let mut volumes: HashMap<String, String> = options
            .host_config
            .binds
            .iter()
            .filter_map(|bind| {
                let mut parts = bind.rsplitn(3, ':');
                let _mode = parts.next()?;
                let internal = parts.next()?;
                let external = parts.next()?;
                Some((internal.to_string(), external.to_string()))
            })
            .collect();

        let image_volumes = state
            .images
            .get(&options.image)
            .or_else(|| state.images.get(&format!("{}:latest", options.image)))
            .map(|record| record.volumes.clone())
            .unwrap_or_default();

        for internal in options.volumes.iter().cloned().chain(image_volumes) {
            volumes.entry(internal.clone()).or_insert_with(|| {
                format!(
                    "/var/lib/docker/volumes/{}{}/_data",
                    &id[..12],
                    internal.replace('/', "_")
                )
            });
        }

        state.containers.push(FakeContainer {
            id: id.clone(),
            name: options.name.clone(),
            image: options.image.clone(),
            running: false,
            labels: options.labels.clone().into_iter().collect(),
            volumes,
        });

        state.creates.push(options.clone());
        state.calls.push(format!("create {}", options.name));

        Ok(ContainerId::new(id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let Some(container) = state.containers.iter_mut().find(|c| c.id == id.as_str()) else {
            return Err(not_found(id));
        };
        container.running = true;
        let name = container.name.clone();
        state.calls.push(format!("start {name}"));
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Option<Duration>,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let Some(container) = state.containers.iter_mut().find(|c| c.id == id.as_str()) else {
            return Err(not_found(id));
        };
        container.running = false;
        let name = container.name.clone();
        let timeout = timeout
            .map(|t| t.as_secs().to_string())
            .unwrap_or_else(|| "default".to_string());
        state.calls.push(format!("stop {name} timeout={timeout}"));
        Ok(())
    }

    async fn kill_container(&self, id: &ContainerId) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let Some(container) = state.containers.iter_mut().find(|c| c.id == id.as_str()) else {
            return Err(not_found(id));
        };
        container.running = false;
        let name = container.name.clone();
        state.calls.push(format!("kill {name}"));
        Ok(())
    }

    async fn restart_container(
        &self,
        id: &ContainerId,
        _timeout: Option<Duration>,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let Some(container) = state.containers.iter_mut().find(|c| c.id == id.as_str()) else {
            return Err(not_found(id));
        };
        container.running = true;
        let name = container.name.clone();
        state.calls.push(format!("restart {name}"));
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        let Some(index) = state.containers.iter().position(|c| c.id == id.as_str()) else {
            return Err(not_found(id));
        };
        if state.containers[index].running {
            return Err(ApiError::Response {
                status_code: 409,
                message: format!(
                    "You cannot remove a running container {}",
                    state.containers[index].name
                ),
            });
        }
        let removed = state.containers.remove(index);
        state.calls.push(format!("remove {}", removed.name));
        Ok(())
    }

    async fn rename_container(&self, id: &ContainerId, new_name: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        if state.containers.iter().any(|c| c.name == new_name) {
            return Err(ApiError::Response {
                status_code: 409,
                message: format!("Conflict. The name {new_name} is already in use"),
            });
        }
        let Some(container) = state.containers.iter_mut().find(|c| c.id == id.as_str()) else {
            return Err(not_found(id));
        };
        let old_name = container.name.clone();
        container.name = new_name.to_string();
        state.calls.push(format!("rename {old_name} -> {new_name}"));
        Ok(())
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<EventStream, ApiError> {
        let mut state = self.state.lock();
        state.calls.push(format!("build {}", request.tag));

        if let Some(id) = state.build_registers_id.clone() {
            state.images.insert(
                request.tag.clone(),
                ImageRecord {
                    id: ImageId::new(id),
                    volumes: Vec::new(),
                },
            );
        }

        Ok(events_stream(state.build_events.clone()))
    }

    async fn pull_image(
        &self,
        repo: &str,
        tag: &str,
        _insecure_registry: bool,
    ) -> Result<EventStream, ApiError> {
        let mut state = self.state.lock();
        let reference = format!("{repo}:{tag}");
        state.calls.push(format!("pull {reference}"));

        match state.pullable.get(&reference).cloned() {
            Some(record) => {
                state.images.insert(reference.clone(), record);
                Ok(events_stream(vec![
                    json!({"status": format!("Pulling from {repo}"), "id": tag}),
                    json!({"status": "Download complete"}),
                ]))
            }
            None => Ok(events_stream(vec![
                json!({"error": format!("image {reference} not found")}),
            ])),
        }
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.calls.push("close".to_string());
    }
}
