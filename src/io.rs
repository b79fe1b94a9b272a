//! Design-document import/export. The only wire format the engine honors:
//! `{meta: {v: 1, ...}, nodes: [...], edges: [...]}`, nodes and edges sorted
//! by id so serialization is deterministic.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::{Edge, Node};

/// Current design-document schema version.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignMeta {
    pub v: u32,
    /// Foreign metadata (export timestamps, tool tags) rides along untouched.
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty", default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for DesignMeta {
    fn default() -> Self {
        Self {
            v: SCHEMA_VERSION,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignDoc {
    pub meta: DesignMeta,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl DesignDoc {
    /// A current-version document with deterministic (id-sorted) ordering.
    pub fn latest(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut doc = Self {
            meta: DesignMeta::default(),
            nodes,
            edges,
        };
        doc.sort();
        doc
    }

    pub fn sort(&mut self) {
        self.nodes.sort_by(|a, b| a.id.cmp(&b.id));
        self.edges.sort_by(|a, b| a.id.cmp(&b.id));
    }
}

#[derive(Debug, Error)]
pub enum DesignError {
    #[error("design document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("design version {0} is newer than supported version {SCHEMA_VERSION}")]
    UnsupportedVersion(u32),
}

/// Parse and migrate a design document from JSON text. The result is sorted
/// and at the current schema version; structural validation happens when the
/// document is loaded into a store.
pub fn parse_design(text: &str) -> Result<DesignDoc, DesignError> {
    let doc: DesignDoc = serde_json::from_str(text)?;
    let mut doc = migrate_to_latest(doc)?;
    doc.sort();
    Ok(doc)
}

/// Migration pipeline. v0 documents differ only in spellings the lenient
/// type parser already absorbs, so the step is a version bump; anything newer
/// than the current version is refused rather than guessed at.
pub fn migrate_to_latest(mut doc: DesignDoc) -> Result<DesignDoc, DesignError> {
    match doc.meta.v {
        0 => {
            doc.meta.v = SCHEMA_VERSION;
            Ok(doc)
        }
        SCHEMA_VERSION => Ok(doc),
        newer => Err(DesignError::UnsupportedVersion(newer)),
    }
}

/// Deterministic pretty JSON for a document.
pub fn to_json(doc: &DesignDoc) -> String {
    let mut sorted = doc.clone();
    sorted.sort();
    // A plain struct of plain values cannot fail to serialize.
    serde_json::to_string_pretty(&sorted).unwrap_or_default()
}

/// Write a document to a file, or to stdout when no path is given.
pub fn write_design(doc: &DesignDoc, path: Option<&Path>) -> anyhow::Result<()> {
    let json = to_json(doc);
    match path {
        Some(path) => {
            std::fs::write(path, json)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(json.as_bytes())?;
            handle.write_all(b"\n")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::ir::NodeType;
    use crate::store::GraphStore;

    fn sample_store() -> GraphStore {
        let mut store = GraphStore::new(LayoutConfig::default());
        store
            .insert_node(Node::new("site-1", NodeType::Site, "HQ").at(0.0, 0.0))
            .expect("site");
        store
            .insert_node(
                Node::new("bldg-1", NodeType::Building, "North").at(16.0, 16.0).inside("site-1"),
            )
            .expect("building");
        store
            .insert_node(
                Node::new("room-1", NodeType::Room, "Core").at(14.0, 14.0).inside("bldg-1"),
            )
            .expect("room");
        store
            .insert_node(
                Node::new("rack-1", NodeType::Rack, "Rack A").at(12.0, 12.0).inside("room-1"),
            )
            .expect("rack");
        store
            .insert_node(
                Node::new("u01", NodeType::RackPosition, "U1")
                    .at(10.0, 10.0)
                    .inside("rack-1")
                    .with_index(1.0),
            )
            .expect("position");
        let mut router = Node::new("rtr-1", NodeType::Router, "Edge Router")
            .at(2.0, 2.0)
            .inside("u01");
        router.props.vendor = Some("juniper".to_string());
        router.props.model = Some("mx204".to_string());
        store.insert_node(router).expect("router");
        store
            .insert_node(Node::new("site-2", NodeType::Site, "DR").at(900.0, 0.0))
            .expect("dr site");
        let mut uplink = Edge::new("e-uplink", "rtr-1", "site-2");
        uplink.label = Some("uplink".to_string());
        uplink.directed = true;
        store.insert_edge(uplink).expect("edge");
        store
    }

    #[test]
    fn round_trip_is_identity_on_ids_and_attributes() {
        let store = sample_store();
        let exported = store.to_design();
        let json = to_json(&exported);

        let parsed = parse_design(&json).expect("parse");
        let reloaded =
            GraphStore::from_design(&parsed, LayoutConfig::default()).expect("validate");

        let before: Vec<&Node> = store.nodes().collect();
        let after: Vec<&Node> = reloaded.nodes().collect();
        assert_eq!(before, after);
        let edges_before: Vec<&Edge> = store.edges().collect();
        let edges_after: Vec<&Edge> = reloaded.edges().collect();
        assert_eq!(edges_before, edges_after);
    }

    #[test]
    fn export_is_sorted_and_stable() {
        let doc = DesignDoc::latest(
            vec![
                Node::new("z", NodeType::Site, "Z"),
                Node::new("a", NodeType::Site, "A"),
            ],
            vec![Edge::new("e2", "z", "a"), Edge::new("e1", "a", "z")],
        );
        assert_eq!(doc.nodes[0].id, "a");
        assert_eq!(doc.edges[0].id, "e1");
        assert_eq!(to_json(&doc), to_json(&doc.clone()));
        assert_eq!(doc.meta.v, SCHEMA_VERSION);
    }

    #[test]
    fn v0_documents_migrate_and_legacy_spellings_parse() {
        let text = r#"{
  "meta": { "v": 0 },
  "nodes": [
    { "id": "s1", "type": "Site", "label": "HQ", "x": 0, "y": 0 },
    { "id": "b1", "type": "building", "label": "B", "x": 16, "y": 16, "parentId": "s1" },
    { "id": "r1", "type": "room", "label": "R", "x": 14, "y": 14, "parentId": "b1" },
    { "id": "k1", "type": "rack", "label": "K", "x": 12, "y": 12, "parentId": "r1" },
    { "id": "p1", "type": "position", "label": "U1", "x": 10, "y": 10, "parentId": "k1", "props": { "index": 1 } }
  ],
  "edges": []
}"#;
        let doc = parse_design(text).expect("parse v0");
        assert_eq!(doc.meta.v, SCHEMA_VERSION);
        let p1 = doc.nodes.iter().find(|n| n.id == "p1").expect("p1");
        assert_eq!(p1.node_type, NodeType::RackPosition);
        GraphStore::from_design(&doc, LayoutConfig::default()).expect("valid design");
    }

    #[test]
    fn newer_versions_are_refused() {
        let text = r#"{ "meta": { "v": 2 }, "nodes": [], "edges": [] }"#;
        let err = parse_design(text).unwrap_err();
        assert_eq!(
            err.to_string(),
            "design version 2 is newer than supported version 1"
        );
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            parse_design("{ nodes: ["),
            Err(DesignError::Parse(_))
        ));
        let err = parse_design(r#"{ "meta": { "v": 1 }, "nodes": [ { "id": "x", "type": "gadget", "label": "", "x": 0, "y": 0 } ], "edges": [] }"#)
            .unwrap_err();
        assert!(err.to_string().contains("unrecognized node type"));
    }

    #[test]
    fn foreign_meta_fields_survive_round_trip() {
        let text = r#"{ "meta": { "v": 1, "exportedAt": "2025-11-02T10:00:00Z" }, "nodes": [], "edges": [] }"#;
        let doc = parse_design(text).expect("parse");
        assert_eq!(
            doc.meta.extra["exportedAt"],
            serde_json::json!("2025-11-02T10:00:00Z")
        );
        let json = to_json(&doc);
        assert!(json.contains("exportedAt"));
    }
}
