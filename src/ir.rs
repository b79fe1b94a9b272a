use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Domain type of a node. The variant set is fixed at compile time; the
/// containment rules in [`crate::rules`] are keyed on it.
///
/// Serialization writes canonical wire tokens; deserialization goes through
/// [`NodeType::from_token`], so legacy spellings and casing noise in imported
/// documents resolve instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Site,
    Building,
    Room,
    Rack,
    RackPosition,
    Slot,
    Router,
    Switch,
    GenericDevice,
    Interface,
    Port,
}

impl Serialize for NodeType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_token())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        NodeType::from_token(&token)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized node type {token:?}")))
    }
}

/// Normalized category used for rule lookups: the concrete device variants
/// (router, switch, generic-device) all collapse to [`RuleType::Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    Site,
    Building,
    Room,
    Rack,
    RackPosition,
    Slot,
    Device,
    Interface,
    Port,
}

static TYPE_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_\-]+").expect("static regex"));

impl NodeType {
    /// Every known type, in rule-table order. Exhaustive tests iterate this.
    pub const ALL: [NodeType; 11] = [
        NodeType::Site,
        NodeType::Building,
        NodeType::Room,
        NodeType::Rack,
        NodeType::RackPosition,
        NodeType::Slot,
        NodeType::Router,
        NodeType::Switch,
        NodeType::GenericDevice,
        NodeType::Interface,
        NodeType::Port,
    ];

    /// Parse a type string from untrusted input (drag payloads, imported
    /// files). Case, surrounding whitespace, and `-`/`_` separators are
    /// ignored, so `"Rack-Position"`, `" rackPosition "`, and `"rack_position"`
    /// all resolve. Returns `None` for empty or unrecognized input.
    pub fn from_token(token: &str) -> Option<Self> {
        let folded = TYPE_NOISE.replace_all(token.trim(), "").to_lowercase();
        match folded.as_str() {
            "site" => Some(Self::Site),
            "building" => Some(Self::Building),
            "room" => Some(Self::Room),
            "rack" => Some(Self::Rack),
            // "position" is the legacy spelling from v0 documents
            "rackposition" | "position" => Some(Self::RackPosition),
            "slot" => Some(Self::Slot),
            "router" => Some(Self::Router),
            "switch" => Some(Self::Switch),
            "genericdevice" | "device" => Some(Self::GenericDevice),
            "interface" => Some(Self::Interface),
            "port" => Some(Self::Port),
            _ => None,
        }
    }

    /// Canonical wire token, as written by the serializer.
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Building => "building",
            Self::Room => "room",
            Self::Rack => "rack",
            Self::RackPosition => "rackPosition",
            Self::Slot => "slot",
            Self::Router => "router",
            Self::Switch => "switch",
            Self::GenericDevice => "generic-device",
            Self::Interface => "interface",
            Self::Port => "port",
        }
    }

    /// Normalized category for containment-rule lookups.
    pub fn rule_type(self) -> RuleType {
        match self {
            Self::Site => RuleType::Site,
            Self::Building => RuleType::Building,
            Self::Room => RuleType::Room,
            Self::Rack => RuleType::Rack,
            Self::RackPosition => RuleType::RackPosition,
            Self::Slot => RuleType::Slot,
            Self::Router | Self::Switch | Self::GenericDevice => RuleType::Device,
            Self::Interface => RuleType::Interface,
            Self::Port => RuleType::Port,
        }
    }

    pub fn is_device(self) -> bool {
        self.rule_type() == RuleType::Device
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Site => "site",
            Self::Building => "building",
            Self::Room => "room",
            Self::Rack => "rack",
            Self::RackPosition => "rack position",
            Self::Slot => "slot",
            Self::Device => "device",
            Self::Interface => "interface",
            Self::Port => "port",
        };
        f.write_str(name)
    }
}

/// Typed property bag. The fields the invariants depend on are concrete;
/// anything else rides along in `extra`.
///
/// `index` stays a raw number: fractional values from untrusted payloads must
/// reach the validator and be rejected with its message, not die in serde.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeProps {
    pub fn is_empty(&self) -> bool {
        self.index.is_none() && self.vendor.is_none() && self.model.is_none() && self.extra.is_empty()
    }

    /// Shallow merge, PATCH-style: present fields win, `extra` keys merge.
    pub fn merge(&mut self, patch: NodeProps) {
        if patch.index.is_some() {
            self.index = patch.index;
        }
        if patch.vendor.is_some() {
            self.vendor = patch.vendor;
        }
        if patch.model.is_some() {
            self.model = patch.model;
        }
        self.extra.extend(patch.extra);
    }
}

/// A typed graph entity. `x`/`y` are relative to the parent when `parent_id`
/// is set, absolute canvas coordinates otherwise. `width`/`height` are only
/// present on nodes that have been sized (containers after a refit, or
/// explicitly sized imports).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    pub x: f32,
    pub y: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "NodeProps::is_empty")]
    pub props: NodeProps,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            label: label.into(),
            x: 0.0,
            y: 0.0,
            width: None,
            height: None,
            parent_id: None,
            props: NodeProps::default(),
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn sized(mut self, width: f32, height: f32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn inside(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_index(mut self, index: f64) -> Self {
        self.props.index = Some(index);
        self
    }
}

/// Partial update applied to an existing node. Absent fields are untouched;
/// `props` merges shallowly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<NodeProps>,
}

impl NodePatch {
    pub fn touches_position(&self) -> bool {
        self.x.is_some() || self.y.is_some()
    }

    pub fn touches_size(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }
}

/// A connection between two nodes. Carries no containment semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub directed: bool,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            label: None,
            directed: false,
        }
    }
}
