//! Bounds propagation: keeps every auto-resizing container shrink-wrapped
//! around its children (plus padding, never below the type's minimum size),
//! walking the ancestor chain after each structural or positional mutation.

mod debounce;

pub use debounce::{DRAG_REFIT_WINDOW, RefitBatcher};

use std::collections::{BTreeMap, HashSet};

use crate::config::LayoutConfig;
use crate::ir::Node;

/// Geometry deltas below this are treated as no change, so repeated refits
/// settle instead of chasing floating-point noise.
pub const FIT_EPSILON: f32 = 0.01;

fn child_box(node: &Node, config: &LayoutConfig) -> (f32, f32, f32, f32) {
    let width = node.width.unwrap_or(config.child_fallback_width);
    let height = node.height.unwrap_or(config.child_fallback_height);
    (node.x, node.y, width, height)
}

/// Recompute one container's box from its direct children. Returns whether
/// the node actually changed. Non-auto-resizing types are left untouched.
pub(crate) fn fit_container(
    nodes: &mut BTreeMap<String, Node>,
    id: &str,
    config: &LayoutConfig,
) -> bool {
    let Some(node) = nodes.get(id) else {
        return false;
    };
    let policy = *config.type_layout(node.node_type);
    if !policy.autoresize {
        return false;
    }

    let boxes: Vec<(f32, f32, f32, f32)> = nodes
        .values()
        .filter(|n| n.parent_id.as_deref() == Some(id))
        .map(|n| child_box(n, config))
        .collect();

    let Some(node) = nodes.get_mut(id) else {
        return false;
    };

    let (desired_x, desired_y, desired_w, desired_h) = if boxes.is_empty() {
        // Shrink-wrap to the minimum floor; position stays where it was.
        (node.x, node.y, policy.min_width, policy.min_height)
    } else {
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for (x, y, w, h) in &boxes {
            min_x = min_x.min(*x);
            min_y = min_y.min(*y);
            max_x = max_x.max(x + w);
            max_y = max_y.max(y + h);
        }
        let union_w = max_x - min_x;
        let union_h = max_y - min_y;
        let width = policy.min_width.max(union_w + 2.0 * policy.padding);
        let height = policy.min_height.max(union_h + 2.0 * policy.padding);
        // A child above/left of the padding line pushes the container out,
        // not the child: relative child coordinates are never rewritten.
        let shift_x = (policy.padding - min_x).max(0.0);
        let shift_y = (policy.padding - min_y).max(0.0);
        (node.x - shift_x, node.y - shift_y, width, height)
    };

    let changed = (node.x - desired_x).abs() > FIT_EPSILON
        || (node.y - desired_y).abs() > FIT_EPSILON
        || node.width.is_none_or(|w| (w - desired_w).abs() > FIT_EPSILON)
        || node.height.is_none_or(|h| (h - desired_h).abs() > FIT_EPSILON);
    if changed {
        node.x = desired_x;
        node.y = desired_y;
        node.width = Some(desired_w);
        node.height = Some(desired_h);
    }
    changed
}

/// Refit `start` and every ancestor above it, bottom-up. Non-container nodes
/// are skipped but the walk continues: a leaf can still be the child whose
/// ancestors must refit. The visited set terminates even a cyclic parent
/// chain, which the data model should never produce.
pub(crate) fn refit_ancestors(
    nodes: &mut BTreeMap<String, Node>,
    start: &str,
    config: &LayoutConfig,
) -> usize {
    let mut visited: HashSet<String> = HashSet::new();
    let mut next = Some(start.to_string());
    let mut changed = 0;
    while let Some(id) = next.take() {
        if !visited.insert(id.clone()) {
            break;
        }
        let Some(node) = nodes.get(&id) else {
            break;
        };
        let parent = node.parent_id.clone();
        if fit_container(nodes, &id, config) {
            changed += 1;
        }
        next = parent;
    }
    changed
}

fn depth_of(nodes: &BTreeMap<String, Node>, id: &str) -> usize {
    let mut depth = 0;
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = id;
    while let Some(node) = nodes.get(current) {
        if !seen.insert(current) {
            break;
        }
        match node.parent_id.as_deref() {
            Some(parent) => {
                depth += 1;
                current = parent;
            }
            None => break,
        }
    }
    depth
}

/// One bottom-up pass over the whole graph, deepest containers first. Used to
/// normalize imported documents where every container box may be stale.
pub(crate) fn refit_all(nodes: &mut BTreeMap<String, Node>, config: &LayoutConfig) -> usize {
    let mut order: Vec<(usize, String)> = nodes
        .keys()
        .map(|id| (depth_of(nodes, id), id.clone()))
        .collect();
    order.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut changed = 0;
    for (_, id) in order {
        if fit_container(nodes, &id, config) {
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeType;

    fn graph(nodes: Vec<Node>) -> BTreeMap<String, Node> {
        nodes.into_iter().map(|n| (n.id.clone(), n)).collect()
    }

    #[test]
    fn minimum_floor_dominates_small_unions() {
        // One default-footprint child at (190, 130) inside a site: the union
        // box is smaller than the site floor, so the floor wins.
        let mut nodes = graph(vec![
            Node::new("p1", NodeType::Site, "Site").at(50.0, 50.0).sized(200.0, 150.0),
            Node::new("c1", NodeType::Building, "Building").at(190.0, 130.0).inside("p1"),
        ]);
        let config = LayoutConfig::default();
        assert!(fit_container(&mut nodes, "p1", &config));

        let parent = &nodes["p1"];
        assert!(parent.width.expect("width") >= 300.0);
        assert!(parent.height.expect("height") >= 220.0);
    }

    #[test]
    fn union_plus_padding_wins_over_floor() {
        let mut nodes = graph(vec![
            Node::new("p1", NodeType::Site, "Site").at(0.0, 0.0).sized(300.0, 220.0),
            Node::new("a", NodeType::Building, "A").at(16.0, 16.0).sized(260.0, 180.0).inside("p1"),
            Node::new("b", NodeType::Building, "B").at(300.0, 16.0).sized(260.0, 180.0).inside("p1"),
        ]);
        let config = LayoutConfig::default();
        assert!(fit_container(&mut nodes, "p1", &config));

        let parent = &nodes["p1"];
        // Union spans x 16..560, so width = 544 + 2*16; the height union
        // (180 + 32) stays under the 220 floor.
        assert_eq!(parent.width, Some(576.0));
        assert_eq!(parent.height, Some(220.0));
    }

    #[test]
    fn empty_container_shrink_wraps_to_floor_in_place() {
        let mut nodes = graph(vec![
            Node::new("r1", NodeType::Room, "Room").at(40.0, 70.0).sized(500.0, 400.0),
        ]);
        let config = LayoutConfig::default();
        assert!(fit_container(&mut nodes, "r1", &config));

        let room = &nodes["r1"];
        assert_eq!((room.x, room.y), (40.0, 70.0));
        assert_eq!(room.width, Some(220.0));
        assert_eq!(room.height, Some(150.0));
    }

    #[test]
    fn child_above_padding_line_shifts_parent_not_child() {
        let mut nodes = graph(vec![
            Node::new("p1", NodeType::Site, "Site").at(100.0, 100.0).sized(300.0, 220.0),
            Node::new("c1", NodeType::Building, "B").at(-20.0, 4.0).inside("p1"),
        ]);
        let config = LayoutConfig::default();
        assert!(fit_container(&mut nodes, "p1", &config));

        let child = &nodes["c1"];
        assert_eq!((child.x, child.y), (-20.0, 4.0));
        let parent = &nodes["p1"];
        // Shortfalls: 16 - (-20) = 36 in x, 16 - 4 = 12 in y.
        assert_eq!(parent.x, 64.0);
        assert_eq!(parent.y, 88.0);
    }

    #[test]
    fn refit_is_idempotent_once_constraints_hold() {
        let mut nodes = graph(vec![
            Node::new("p1", NodeType::Site, "Site").at(50.0, 50.0).sized(200.0, 150.0),
            Node::new("c1", NodeType::Building, "B").at(40.0, 40.0).inside("p1"),
        ]);
        let config = LayoutConfig::default();
        assert!(fit_container(&mut nodes, "p1", &config));
        let settled = nodes["p1"].clone();

        assert!(!fit_container(&mut nodes, "p1", &config));
        assert_eq!(nodes["p1"], settled);
    }

    #[test]
    fn non_container_is_left_alone_but_ancestors_refit() {
        let mut nodes = graph(vec![
            Node::new("rack", NodeType::Rack, "Rack").at(10.0, 10.0).sized(180.0, 320.0),
            Node::new("u1", NodeType::RackPosition, "U1").at(10.0, 10.0).inside("rack"),
            Node::new("u2", NodeType::RackPosition, "U2").at(10.0, 500.0).inside("rack"),
        ]);
        let config = LayoutConfig::default();
        let changed = refit_ancestors(&mut nodes, "u2", &config);

        // The position itself is not auto-resizing and keeps its free
        // geometry; the rack above it grows around the 10..560 child union.
        assert_eq!(changed, 1);
        assert!(nodes["u2"].width.is_none());
        let rack = &nodes["rack"];
        assert_eq!(rack.height, Some(550.0 + 2.0 * 10.0));
        assert_eq!(rack.width, Some(180.0));
    }

    #[test]
    fn change_propagates_through_whole_ancestor_chain() {
        let mut nodes = graph(vec![
            Node::new("site", NodeType::Site, "Site").at(0.0, 0.0).sized(300.0, 220.0),
            Node::new("bldg", NodeType::Building, "B").at(16.0, 16.0).sized(260.0, 180.0).inside("site"),
            Node::new("room", NodeType::Room, "R").at(14.0, 14.0).sized(220.0, 150.0).inside("bldg"),
            Node::new("rack", NodeType::Rack, "K").at(600.0, 12.0).sized(180.0, 320.0).inside("room"),
        ]);
        let config = LayoutConfig::default();
        let changed = refit_ancestors(&mut nodes, "rack", &config);

        // The rack itself is already at its floor; room, building, and site
        // each grow in turn to absorb the taller child union below them.
        assert_eq!(changed, 3);
        assert_eq!(nodes["room"].height, Some(320.0 + 2.0 * 12.0));
        assert_eq!(nodes["bldg"].height, Some(344.0 + 2.0 * 14.0));
        assert_eq!(nodes["site"].height, Some(372.0 + 2.0 * 16.0));
        // Widths keep their floors: the unions are narrower throughout.
        assert_eq!(nodes["room"].width, Some(220.0));
    }

    #[test]
    fn cyclic_parent_chain_terminates() {
        let mut nodes = graph(vec![
            Node::new("a", NodeType::Site, "A").inside("b"),
            Node::new("b", NodeType::Site, "B").inside("a"),
        ]);
        let config = LayoutConfig::default();
        // Must not hang; each node is visited at most once.
        refit_ancestors(&mut nodes, "a", &config);
    }

    #[test]
    fn refit_all_runs_bottom_up() {
        let mut nodes = graph(vec![
            Node::new("site", NodeType::Site, "Site").at(0.0, 0.0),
            Node::new("bldg", NodeType::Building, "B").at(20.0, 20.0).inside("site"),
            Node::new("room", NodeType::Room, "R").at(20.0, 20.0).inside("bldg"),
        ]);
        let config = LayoutConfig::default();
        refit_all(&mut nodes, &config);

        // One pass suffices: the room settles before the building reads it,
        // the building before the site.
        let room_w = nodes["room"].width.expect("room width");
        let bldg_w = nodes["bldg"].width.expect("building width");
        let site_w = nodes["site"].width.expect("site width");
        assert_eq!(room_w, 220.0);
        assert_eq!(bldg_w, 260.0f32.max(room_w + 2.0 * 14.0));
        assert_eq!(site_w, 300.0f32.max(bldg_w + 2.0 * 16.0));

        assert_eq!(refit_all(&mut nodes, &config), 0);
    }

    #[test]
    fn unsized_children_use_fallback_footprint() {
        let mut nodes = graph(vec![
            Node::new("p1", NodeType::Site, "Site").at(0.0, 0.0).sized(300.0, 220.0),
            Node::new("c1", NodeType::Building, "B").at(400.0, 16.0).inside("p1"),
        ]);
        let mut config = LayoutConfig::default();
        config.child_fallback_width = 320.0;
        assert!(fit_container(&mut nodes, "p1", &config));
        // The unsized child counts as 320 wide -> union 320 + 2*16 padding.
        assert_eq!(nodes["p1"].width, Some(352.0));
    }
}
