//! Controller registry
//!
//! Owns every running controller, keyed by a stable unique id. Controllers
//! declared in YAML are authoritative: once YAML has been loaded, an entry
//! set up later under a unique id YAML already claimed is ignored.

use crate::actor::ControllerHandle;
use crate::controllers::build_controller;
use crate::error::{ControllerError, ControllerResult};
use crate::host::Host;
use crate::listeners::ControllerView;
use indexmap::IndexMap;
use smartify_config::{ControllerConfig, ControllerType, SmartifyConfig, Value, DOMAIN};
use std::collections::HashSet;
use tracing::{debug, error, info, instrument, warn};

/// Lowercase `text`, replacing every run of other characters with `_`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// Stable unique id of a configured controller
pub fn unique_id(config: &ControllerConfig) -> String {
    match config.controller_type {
        ControllerType::Occupancy => occupancy_id(config.sensor_name.as_deref().unwrap_or_default()),
        _ => entity_id(
            &config
                .controlled_entity
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        ),
    }
}

fn entity_id(controlled_entity: &str) -> String {
    format!("{}__{}", DOMAIN, slugify(controlled_entity))
}

fn occupancy_id(sensor_name: &str) -> String {
    format!("{}__{}__{}", DOMAIN, ControllerType::Occupancy, slugify(sensor_name))
}

/// Unique id of a raw YAML entry, even one that fails to parse
fn raw_unique_id(value: &Value) -> Option<String> {
    let controller_type = value
        .get("type")
        .or_else(|| value.get("controller_type"))
        .and_then(Value::as_str)?;

    if controller_type == ControllerType::Occupancy.as_str() {
        value.get("sensor_name").and_then(Value::as_str).map(occupancy_id)
    } else {
        value.get("controlled_entity").and_then(Value::as_str).map(entity_id)
    }
}

/// Every running controller, in start order
pub struct ControllerRegistry {
    host: Host,
    controllers: IndexMap<String, ControllerHandle>,
    yaml_mode: bool,
    yaml_unique_ids: HashSet<String>,
}

impl ControllerRegistry {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            controllers: IndexMap::new(),
            yaml_mode: false,
            yaml_unique_ids: HashSet::new(),
        }
    }

    /// Start every controller declared in the `smartify:` section
    ///
    /// A controller that fails to parse or build is logged and skipped; its
    /// unique id stays claimed by YAML. Returns the number started.
    #[instrument(skip(self, config), fields(controllers = config.controllers.len()))]
    pub async fn load_yaml(&mut self, config: &SmartifyConfig) -> usize {
        self.yaml_mode = true;
        let mut started = 0;

        for (index, value) in config.controllers.iter().enumerate() {
            if let Some(id) = raw_unique_id(value) {
                self.yaml_unique_ids.insert(id);
            }

            let controller_config = match ControllerConfig::from_yaml(value.clone()) {
                Ok(controller_config) => controller_config,
                Err(err) => {
                    error!(index, error = %err, "Invalid controller configuration");
                    continue;
                }
            };

            match self.start(controller_config).await {
                Ok(_) => started += 1,
                Err(err) => error!(index, error = %err, "Failed to start controller"),
            }
        }

        info!("Started {} of {} YAML controllers", started, config.controllers.len());
        started
    }

    /// Start a controller from a config entry
    ///
    /// Returns the unique id, or `None` if YAML already claims it.
    #[instrument(skip(self, config), fields(controller_type = %config.controller_type))]
    pub async fn setup_entry(&mut self, config: ControllerConfig) -> ControllerResult<Option<String>> {
        let id = unique_id(&config);
        if self.yaml_mode && self.yaml_unique_ids.contains(&id) {
            warn!(unique_id = %id, "Ignoring config entry already configured in YAML");
            return Ok(None);
        }
        self.start(config).await.map(Some)
    }

    async fn start(&mut self, config: ControllerConfig) -> ControllerResult<String> {
        let id = unique_id(&config);
        if self.controllers.contains_key(&id) {
            return Err(ControllerError::AlreadyRegistered(id));
        }

        let controller = build_controller(&self.host, &config)?;
        let handle = controller.start().await;
        debug!(unique_id = %id, controller = %handle.name(), "Registered controller");

        self.controllers.insert(id.clone(), handle);
        Ok(id)
    }

    /// Stop a controller and forget it
    #[instrument(skip(self))]
    pub async fn unload(&mut self, unique_id: &str) -> ControllerResult<()> {
        let handle = self
            .controllers
            .shift_remove(unique_id)
            .ok_or_else(|| ControllerError::NotFound(unique_id.to_string()))?;
        handle.shutdown().await
    }

    /// Tear a controller down and set it up again
    #[instrument(skip(self))]
    pub async fn reload(&self, unique_id: &str) -> ControllerResult<()> {
        self.get(unique_id)
            .ok_or_else(|| ControllerError::NotFound(unique_id.to_string()))?
            .reload()
            .await
    }

    /// Stop every controller, most recently started first
    pub async fn shutdown_all(&mut self) {
        while let Some((id, handle)) = self.controllers.pop() {
            if let Err(err) = handle.shutdown().await {
                warn!(unique_id = %id, error = %err, "Controller already stopped");
            }
        }
        info!("All controllers stopped");
    }

    pub fn get(&self, unique_id: &str) -> Option<&ControllerHandle> {
        self.controllers.get(unique_id)
    }

    pub fn view(&self, unique_id: &str) -> Option<ControllerView> {
        self.get(unique_id).map(ControllerHandle::view)
    }

    pub fn unique_ids(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }

    pub fn views(&self) -> impl Iterator<Item = (&str, ControllerView)> {
        self.controllers
            .iter()
            .map(|(id, handle)| (id.as_str(), handle.view()))
    }

    pub fn is_yaml_mode(&self) -> bool {
        self.yaml_mode
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}
