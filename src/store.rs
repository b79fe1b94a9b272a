//! The in-memory graph store: sole owner of node and edge records. Every
//! mutation funnels through here so the containment, capacity, and bounds
//! invariants cannot be bypassed by a stray field write. The remote backend,
//! when present, is a replica kept eventually consistent by the coordinator.

use std::collections::BTreeMap;
use std::time::Instant;

use thiserror::Error;

use crate::config::LayoutConfig;
use crate::io::DesignDoc;
use crate::ir::{Edge, Node, NodePatch, NodeType, RuleType};
use crate::layout::{self, RefitBatcher};
use crate::rules::{self, PlacementError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Placement(#[from] PlacementError),
    #[error("node id {0:?} already exists")]
    DuplicateNode(String),
    #[error("edge id {0:?} already exists")]
    DuplicateEdge(String),
    #[error("unknown node {0:?}")]
    UnknownNode(String),
    #[error("unknown edge {0:?}")]
    UnknownEdge(String),
    #[error("parent {parent:?} of node {id:?} does not exist")]
    MissingParent { id: String, parent: String },
    #[error("edge {edge:?} references unknown node {node:?}")]
    DanglingEndpoint { edge: String, node: String },
}

/// Everything removed by one cascading delete, in case the caller needs to
/// restore it (rollback) or report it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemovedSubtree {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone)]
pub struct GraphStore {
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<String, Edge>,
    layout: LayoutConfig,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl GraphStore {
    pub fn new(layout: LayoutConfig) -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            layout,
        }
    }

    pub fn layout_config(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Nodes in id order (BTreeMap order, which is also export order).
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn children_of<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes
            .values()
            .filter(move |n| n.parent_id.as_deref() == Some(parent_id))
    }

    /// Create a node. Containment and capacity rules are checked before any
    /// state changes; a rejection leaves the store untouched. On success the
    /// ancestor chain is refit.
    pub fn insert_node(&mut self, node: Node) -> Result<(), StoreError> {
        if self.nodes.contains_key(&node.id) {
            return Err(StoreError::DuplicateNode(node.id));
        }
        match node.parent_id.as_deref() {
            None => {
                if !rules::is_allowed_at_top_level(node.node_type) {
                    return Err(PlacementError::TopLevel(node.node_type.rule_type()).into());
                }
            }
            Some(parent_id) => {
                let parent = self.nodes.get(parent_id).ok_or_else(|| {
                    StoreError::MissingParent {
                        id: node.id.clone(),
                        parent: parent_id.to_string(),
                    }
                })?;
                let parent_type = parent.node_type;
                let siblings: Vec<&Node> = self.children_of(parent_id).collect();
                rules::can_add_child(parent_type, node.node_type, node.props.index, &siblings)?;
            }
        }

        // Refit from the new node itself: a fresh container shrink-wraps to
        // its floor, then the chain above absorbs it.
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        layout::refit_ancestors(&mut self.nodes, &id, &self.layout);
        Ok(())
    }

    /// Apply a partial update and return the node's prior state so the caller
    /// can roll back. Geometry changes trigger bounds propagation.
    pub fn update_node(&mut self, id: &str, patch: NodePatch) -> Result<Node, StoreError> {
        let touches_geometry = patch.touches_position() || patch.touches_size();
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownNode(id.to_string()))?;
        let prior = node.clone();

        if let Some(label) = patch.label {
            node.label = label;
        }
        if let Some(x) = patch.x {
            node.x = x;
        }
        if let Some(y) = patch.y {
            node.y = y;
        }
        if let Some(width) = patch.width {
            node.width = Some(width);
        }
        if let Some(height) = patch.height {
            node.height = Some(height);
        }
        if let Some(props) = patch.props {
            node.props.merge(props);
        }

        if touches_geometry {
            layout::refit_ancestors(&mut self.nodes, id, &self.layout);
        }
        Ok(prior)
    }

    /// Reposition a node, refitting its chain immediately.
    pub fn move_node(&mut self, id: &str, x: f32, y: f32) -> Result<Node, StoreError> {
        self.update_node(
            id,
            NodePatch {
                x: Some(x),
                y: Some(y),
                ..NodePatch::default()
            },
        )
    }

    /// Reposition during a continuous drag: the position lands immediately,
    /// the refit is coalesced through the batcher.
    pub fn move_node_deferred(
        &mut self,
        id: &str,
        x: f32,
        y: f32,
        batcher: &mut RefitBatcher,
        now: Instant,
    ) -> Result<(), StoreError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownNode(id.to_string()))?;
        node.x = x;
        node.y = y;
        batcher.mark(id, now);
        Ok(())
    }

    /// Run the refits whose batching window has elapsed.
    pub fn flush_due_refits(&mut self, batcher: &mut RefitBatcher, now: Instant) -> usize {
        let mut changed = 0;
        for id in batcher.due(now) {
            changed += layout::refit_ancestors(&mut self.nodes, &id, &self.layout);
        }
        changed
    }

    /// Delete a node together with its entire descendant subtree and every
    /// edge touching any removed node. Cascading is total: dangling
    /// `parent_id` references cannot survive a delete.
    pub fn remove_node(&mut self, id: &str) -> Result<RemovedSubtree, StoreError> {
        if !self.nodes.contains_key(id) {
            return Err(StoreError::UnknownNode(id.to_string()));
        }

        let mut doomed: Vec<String> = vec![id.to_string()];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let parent = doomed[cursor].clone();
            for child in self.children_of(&parent) {
                doomed.push(child.id.clone());
            }
            cursor += 1;
        }

        let mut removed = RemovedSubtree::default();
        let former_parent = self.nodes.get(id).and_then(|n| n.parent_id.clone());
        for node_id in &doomed {
            if let Some(node) = self.nodes.remove(node_id) {
                removed.nodes.push(node);
            }
        }
        let doomed_edges: Vec<String> = self
            .edges
            .values()
            .filter(|e| doomed.contains(&e.source) || doomed.contains(&e.target))
            .map(|e| e.id.clone())
            .collect();
        for edge_id in doomed_edges {
            if let Some(edge) = self.edges.remove(&edge_id) {
                removed.edges.push(edge);
            }
        }

        if let Some(parent_id) = former_parent {
            layout::refit_ancestors(&mut self.nodes, &parent_id, &self.layout);
        }
        Ok(removed)
    }

    pub fn insert_edge(&mut self, edge: Edge) -> Result<(), StoreError> {
        if self.edges.contains_key(&edge.id) {
            return Err(StoreError::DuplicateEdge(edge.id));
        }
        for endpoint in [&edge.source, &edge.target] {
            if !self.nodes.contains_key(endpoint) {
                return Err(StoreError::DanglingEndpoint {
                    edge: edge.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }
        self.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<Edge, StoreError> {
        self.edges
            .remove(id)
            .ok_or_else(|| StoreError::UnknownEdge(id.to_string()))
    }

    /// Put a previously captured node back, bypassing placement checks (it
    /// was legal when captured), and refit its chain. Rollback path only.
    pub(crate) fn restore_node(&mut self, node: Node) {
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        layout::refit_ancestors(&mut self.nodes, &id, &self.layout);
    }

    /// Refit starting at `id` and walking the ancestor chain.
    pub fn refit_from(&mut self, id: &str) -> usize {
        layout::refit_ancestors(&mut self.nodes, id, &self.layout)
    }

    /// One bottom-up refit pass over every container.
    pub fn refit_all(&mut self) -> usize {
        layout::refit_all(&mut self.nodes, &self.layout)
    }

    /// Deterministic export snapshot: nodes and edges sorted by id.
    pub fn to_design(&self) -> DesignDoc {
        DesignDoc::latest(
            self.nodes.values().cloned().collect(),
            self.edges.values().cloned().collect(),
        )
    }

    /// Build a store from an imported document, validating the whole design:
    /// duplicate ids, parent resolution, top-level rules, containment, rack
    /// caps and index uniqueness, and edge endpoints. Violations reject the
    /// document; nothing is silently corrected.
    pub fn from_design(doc: &DesignDoc, layout: LayoutConfig) -> Result<Self, StoreError> {
        let mut store = Self::new(layout);
        for node in &doc.nodes {
            if store
                .nodes
                .insert(node.id.clone(), node.clone())
                .is_some()
            {
                return Err(StoreError::DuplicateNode(node.id.clone()));
            }
        }

        for node in store.nodes.values() {
            match node.parent_id.as_deref() {
                None => {
                    if !rules::is_allowed_at_top_level(node.node_type) {
                        return Err(PlacementError::TopLevel(node.node_type.rule_type()).into());
                    }
                }
                Some(parent_id) => {
                    let parent = store.nodes.get(parent_id).ok_or_else(|| {
                        StoreError::MissingParent {
                            id: node.id.clone(),
                            parent: parent_id.to_string(),
                        }
                    })?;
                    if !rules::can_contain_types(parent.node_type, node.node_type) {
                        return Err(PlacementError::Containment {
                            parent: parent.node_type.rule_type(),
                            child: node.node_type.rule_type(),
                        }
                        .into());
                    }
                }
            }
        }

        for rack in store
            .nodes
            .values()
            .filter(|n| n.node_type == NodeType::Rack)
        {
            store.validate_rack(rack)?;
        }

        for edge in &doc.edges {
            if store.edges.contains_key(&edge.id) {
                return Err(StoreError::DuplicateEdge(edge.id.clone()));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !store.nodes.contains_key(endpoint) {
                    return Err(StoreError::DanglingEndpoint {
                        edge: edge.id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
            store.edges.insert(edge.id.clone(), edge.clone());
        }

        Ok(store)
    }

    fn validate_rack(&self, rack: &Node) -> Result<(), StoreError> {
        let mut position_indices: Vec<f64> = Vec::new();
        let mut slot_indices: Vec<f64> = Vec::new();
        let mut positions = 0usize;
        let mut slots = 0usize;
        for child in self.children_of(&rack.id) {
            match child.node_type.rule_type() {
                RuleType::RackPosition => {
                    positions += 1;
                    if let Some(index) = child.props.index {
                        if !rules::valid_rack_position_index(index) {
                            return Err(PlacementError::RackPositionIndex.into());
                        }
                        if position_indices.contains(&index) {
                            return Err(PlacementError::RackPositionTaken(index as u16).into());
                        }
                        position_indices.push(index);
                    }
                }
                RuleType::Slot => {
                    slots += 1;
                    if let Some(index) = child.props.index {
                        if !rules::valid_slot_index(index) {
                            return Err(PlacementError::SlotIndex.into());
                        }
                        if slot_indices.contains(&index) {
                            return Err(PlacementError::SlotTaken(index as u16).into());
                        }
                        slot_indices.push(index);
                    }
                }
                _ => {}
            }
        }
        if positions > rules::RACK_POSITION_CAP {
            return Err(PlacementError::RackPositionsFull.into());
        }
        if slots > rules::SLOT_CAP {
            return Err(PlacementError::SlotsFull.into());
        }
        Ok(())
    }
}
