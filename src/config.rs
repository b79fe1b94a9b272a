use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ir::NodeType;

/// Geometry policy for a single node type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeLayout {
    pub min_width: f32,
    pub min_height: f32,
    pub padding: f32,
    pub autoresize: bool,
}

impl Default for TypeLayout {
    fn default() -> Self {
        Self {
            min_width: 100.0,
            min_height: 60.0,
            padding: 8.0,
            autoresize: false,
        }
    }
}

/// Per-type geometry table. Deliberately decoupled from the containment
/// rules: a type can hold children without auto-resizing around them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    pub site: TypeLayout,
    pub building: TypeLayout,
    pub room: TypeLayout,
    pub rack: TypeLayout,
    pub fallback: TypeLayout,
    /// Footprint substituted for children that carry no explicit size.
    pub child_fallback_width: f32,
    pub child_fallback_height: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            site: TypeLayout {
                min_width: 300.0,
                min_height: 220.0,
                padding: 16.0,
                autoresize: true,
            },
            building: TypeLayout {
                min_width: 260.0,
                min_height: 180.0,
                padding: 14.0,
                autoresize: true,
            },
            room: TypeLayout {
                min_width: 220.0,
                min_height: 150.0,
                padding: 12.0,
                autoresize: true,
            },
            rack: TypeLayout {
                min_width: 180.0,
                min_height: 320.0,
                padding: 10.0,
                autoresize: true,
            },
            fallback: TypeLayout::default(),
            child_fallback_width: 100.0,
            child_fallback_height: 60.0,
        }
    }
}

impl LayoutConfig {
    pub fn type_layout(&self, node_type: NodeType) -> &TypeLayout {
        match node_type {
            NodeType::Site => &self.site,
            NodeType::Building => &self.building,
            NodeType::Room => &self.room,
            NodeType::Rack => &self.rack,
            _ => &self.fallback,
        }
    }

    pub fn is_auto_resizing_container(&self, node_type: NodeType) -> bool {
        self.type_layout(node_type).autoresize
    }
}

/// Opt-in background worker toggles. Passed explicitly at startup instead of
/// being read from ambient environment state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    pub validate_in_background: bool,
    pub offload_layout: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub layout: LayoutConfig,
    pub workers: WorkerConfig,
    /// Base URL of the persistence backend. `None` means local-only mode.
    pub backend_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TypeLayoutFile {
    min_width: Option<f32>,
    min_height: Option<f32>,
    padding: Option<f32>,
    autoresize: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    site: Option<TypeLayoutFile>,
    building: Option<TypeLayoutFile>,
    room: Option<TypeLayoutFile>,
    rack: Option<TypeLayoutFile>,
    fallback: Option<TypeLayoutFile>,
    child_fallback_width: Option<f32>,
    child_fallback_height: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WorkerConfigFile {
    validate_in_background: Option<bool>,
    offload_layout: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    layout: Option<LayoutConfigFile>,
    workers: Option<WorkerConfigFile>,
    backend_url: Option<String>,
}

fn apply_type_layout(target: &mut TypeLayout, file: TypeLayoutFile) {
    if let Some(v) = file.min_width {
        target.min_width = v;
    }
    if let Some(v) = file.min_height {
        target.min_height = v;
    }
    if let Some(v) = file.padding {
        target.padding = v;
    }
    if let Some(v) = file.autoresize {
        target.autoresize = v;
    }
}

/// Load a config overlay from a JSON file; missing file path or missing keys
/// fall back to defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    let parsed: ConfigFile = serde_json::from_str(&contents)?;

    if let Some(layout) = parsed.layout {
        if let Some(file) = layout.site {
            apply_type_layout(&mut config.layout.site, file);
        }
        if let Some(file) = layout.building {
            apply_type_layout(&mut config.layout.building, file);
        }
        if let Some(file) = layout.room {
            apply_type_layout(&mut config.layout.room, file);
        }
        if let Some(file) = layout.rack {
            apply_type_layout(&mut config.layout.rack, file);
        }
        if let Some(file) = layout.fallback {
            apply_type_layout(&mut config.layout.fallback, file);
        }
        if let Some(v) = layout.child_fallback_width {
            config.layout.child_fallback_width = v;
        }
        if let Some(v) = layout.child_fallback_height {
            config.layout.child_fallback_height = v;
        }
    }
    if let Some(workers) = parsed.workers {
        if let Some(v) = workers.validate_in_background {
            config.workers.validate_in_background = v;
        }
        if let Some(v) = workers.offload_layout {
            config.workers.offload_layout = v;
        }
    }
    if parsed.backend_url.is_some() {
        config.backend_url = parsed.backend_url;
    }

    Ok(config)
}
