//! Containment rules: which node types may nest inside which, which types may
//! sit at the top level, and the numeric caps on rack children. This module is
//! the single source of truth for placement legality; the store funnels every
//! insertion through it.

use thiserror::Error;

use crate::ir::{Node, NodeType, RuleType};

/// A rack holds at most this many rack positions, indexed 1..=42.
pub const RACK_POSITION_CAP: usize = 42;
/// A rack holds at most this many slots, indexed 1..=16.
pub const SLOT_CAP: usize = 16;

/// Allowed child categories per parent category. Total over [`RuleType`];
/// leaf types map to the empty slice.
pub fn allowed_children(parent: RuleType) -> &'static [RuleType] {
    match parent {
        RuleType::Site => &[RuleType::Building],
        RuleType::Building => &[RuleType::Room],
        RuleType::Room => &[RuleType::Rack],
        RuleType::Rack => &[RuleType::RackPosition, RuleType::Slot],
        RuleType::RackPosition => &[RuleType::Device],
        RuleType::Slot => &[RuleType::Device],
        RuleType::Device => &[RuleType::Interface, RuleType::Port],
        RuleType::Interface | RuleType::Port => &[],
    }
}

/// Only sites may be created without a parent.
pub fn is_allowed_at_top_level(node_type: NodeType) -> bool {
    node_type.rule_type() == RuleType::Site
}

/// Raw-string variant of [`is_allowed_at_top_level`] for untrusted input.
pub fn is_token_allowed_at_top_level(token: &str) -> bool {
    NodeType::from_token(token).is_some_and(is_allowed_at_top_level)
}

/// Whether a parent of one type may contain a child of another. Both sides
/// are normalized, so device variants behave as `device`.
pub fn can_contain_types(parent: NodeType, child: NodeType) -> bool {
    allowed_children(parent.rule_type()).contains(&child.rule_type())
}

/// Raw-string variant of [`can_contain_types`]: tolerates the casing and
/// separator noise that drag payloads and imported files carry, and rejects
/// anything unrecognized. Callers never pre-sanitize.
pub fn can_contain(parent: &str, child: &str) -> bool {
    match (NodeType::from_token(parent), NodeType::from_token(child)) {
        (Some(p), Some(c)) => can_contain_types(p, c),
        _ => false,
    }
}

/// Human-readable summary of what a type may contain, for palette tooltips
/// and CLI diagnostics.
pub fn describe_containment(node_type: NodeType) -> String {
    let rule = node_type.rule_type();
    let children = allowed_children(rule);
    if children.is_empty() {
        return format!("a {rule} cannot contain any children");
    }
    let names: Vec<String> = children.iter().map(|c| c.to_string()).collect();
    format!("a {rule} may contain: {}", names.join(", "))
}

/// Placement rejection. The `Display` text is surfaced verbatim to the end
/// user and is asserted verbatim in tests; treat it as part of the contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlacementError {
    #[error("a {child} cannot be placed inside a {parent}")]
    Containment { parent: RuleType, child: RuleType },
    #[error("a {0} cannot be placed at the top level of a design")]
    TopLevel(RuleType),
    #[error("rack is full: all 42 rack positions are occupied")]
    RackPositionsFull,
    #[error("rack is full: all 16 slots are occupied")]
    SlotsFull,
    #[error("rack position index must be an integer between 1 and 42")]
    RackPositionIndex,
    #[error("slot index must be an integer between 1 and 16")]
    SlotIndex,
    #[error("rack position index {0} is already occupied")]
    RackPositionTaken(u16),
    #[error("slot index {0} is already occupied")]
    SlotTaken(u16),
}

/// True iff `value` is an integer in `1..=42`.
pub fn valid_rack_position_index(value: f64) -> bool {
    value.fract() == 0.0 && (1.0..=RACK_POSITION_CAP as f64).contains(&value)
}

/// True iff `value` is an integer in `1..=16`.
pub fn valid_slot_index(value: f64) -> bool {
    value.fract() == 0.0 && (1.0..=SLOT_CAP as f64).contains(&value)
}

/// Full placement check for adding a child under a parent: the containment
/// matrix first, then the rack capacity and index rules against the existing
/// sibling set. `index` is the explicit index from the creation payload, if
/// any. Violations are rejection results, never partial applications.
pub fn can_add_child(
    parent_type: NodeType,
    child_type: NodeType,
    index: Option<f64>,
    siblings: &[&Node],
) -> Result<(), PlacementError> {
    if !can_contain_types(parent_type, child_type) {
        return Err(PlacementError::Containment {
            parent: parent_type.rule_type(),
            child: child_type.rule_type(),
        });
    }
    if parent_type.rule_type() != RuleType::Rack {
        return Ok(());
    }
    match child_type.rule_type() {
        RuleType::RackPosition => check_rack_child(
            index,
            siblings,
            RuleType::RackPosition,
            RACK_POSITION_CAP,
            valid_rack_position_index,
            PlacementError::RackPositionsFull,
            PlacementError::RackPositionIndex,
            PlacementError::RackPositionTaken,
        ),
        RuleType::Slot => check_rack_child(
            index,
            siblings,
            RuleType::Slot,
            SLOT_CAP,
            valid_slot_index,
            PlacementError::SlotsFull,
            PlacementError::SlotIndex,
            PlacementError::SlotTaken,
        ),
        _ => Ok(()),
    }
}

#[allow(clippy::too_many_arguments)]
fn check_rack_child(
    index: Option<f64>,
    siblings: &[&Node],
    kind: RuleType,
    cap: usize,
    valid_index: fn(f64) -> bool,
    full: PlacementError,
    bad_index: PlacementError,
    taken: fn(u16) -> PlacementError,
) -> Result<(), PlacementError> {
    let occupied: Vec<&Node> = siblings
        .iter()
        .copied()
        .filter(|n| n.node_type.rule_type() == kind)
        .collect();
    if occupied.len() >= cap {
        return Err(full);
    }
    if let Some(value) = index {
        if !valid_index(value) {
            return Err(bad_index);
        }
        let wanted = value as u16;
        let clash = occupied
            .iter()
            .any(|n| n.props.index.is_some_and(|i| i == value));
        if clash {
            return Err(taken(wanted));
        }
    }
    Ok(())
}
