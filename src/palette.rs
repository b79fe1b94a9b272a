//! Creatable-type descriptors for the editor palette. A backend may serve
//! its own palette; the core list below is always guaranteed present so the
//! hierarchy can be built even against an empty or partial backend.

use serde::{Deserialize, Serialize};

use crate::ir::{Node, NodeType};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaletteDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_index: Option<u16>,
}

impl PaletteDefaults {
    fn is_empty(&self) -> bool {
        self.suggested_index.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteItem {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    #[serde(default, skip_serializing_if = "PaletteDefaults::is_empty")]
    pub defaults: PaletteDefaults,
}

impl PaletteItem {
    fn new(node_type: NodeType, label: &str) -> Self {
        Self {
            node_type,
            label: label.to_string(),
            defaults: PaletteDefaults::default(),
        }
    }

    fn with_suggested_index(mut self, index: u16) -> Self {
        self.defaults.suggested_index = Some(index);
        self
    }
}

/// The guaranteed palette, in hierarchy order. Indexed rack children suggest
/// index 1 as a starting point.
pub fn core_palette() -> Vec<PaletteItem> {
    vec![
        PaletteItem::new(NodeType::Site, "Site"),
        PaletteItem::new(NodeType::Building, "Building"),
        PaletteItem::new(NodeType::Room, "Room"),
        PaletteItem::new(NodeType::Rack, "Rack"),
        PaletteItem::new(NodeType::RackPosition, "Rack Position").with_suggested_index(1),
        PaletteItem::new(NodeType::Slot, "Slot").with_suggested_index(1),
        PaletteItem::new(NodeType::Router, "Router"),
        PaletteItem::new(NodeType::Switch, "Switch"),
        PaletteItem::new(NodeType::Interface, "Interface"),
        PaletteItem::new(NodeType::Port, "Port"),
    ]
}

/// Payload carried by a palette drag, as it arrives from the drop event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DropPayload {
    #[serde(rename = "type")]
    pub type_token: String,
    pub label: Option<String>,
    pub defaults: PaletteDefaults,
}

/// Build the node a palette drop would create. `None` means the payload was
/// malformed or carried no recognizable type: the drop is ignored before any
/// state changes, with nothing to report.
pub fn node_from_drop(payload: &str, id: impl Into<String>) -> Option<Node> {
    let payload: DropPayload = serde_json::from_str(payload).ok()?;
    let node_type = NodeType::from_token(&payload.type_token)?;
    let label = payload
        .label
        .unwrap_or_else(|| payload.type_token.trim().to_string());
    let mut node = Node::new(id, node_type, label);
    if let Some(index) = payload.defaults.suggested_index {
        node.props.index = Some(index as f64);
    }
    Some(node)
}

/// Merge a backend palette over the core list. Backend items override by
/// type, but every core type stays present; core order is preserved and
/// backend-only types append in their served order.
pub fn merge_palette(remote: Vec<PaletteItem>) -> Vec<PaletteItem> {
    let mut merged = core_palette();
    let mut extras: Vec<PaletteItem> = Vec::new();
    for item in remote {
        match merged.iter_mut().find(|m| m.node_type == item.node_type) {
            Some(slot) => *slot = item,
            None => extras.push(item),
        }
    }
    merged.extend(extras);
    merged
}
