//! # Layout Engine
//!
//! Turns a flat skill list into positioned nodes for rendering.
//!
//! ## Algorithm
//!
//! ```text
//! stored JSON ──► lenient parse (entries without a string id skipped,
//!                 non-list input gives nothing)
//!      │
//! flat nodes ──► id lookup ──► child links (dangling ids dropped)
//!                                   │
//!                     post-order from root: leaves take the next
//!                     cursor slot, parents sit between first and
//!                     last child, y = depth * level_gap
//!                                   │
//!                     invert y (root at the bottom) ──► pre-order list
//! ```
//!
//! Both traversals run on explicit stacks with a shared seen set, so a
//! cyclic input terminates and every id is emitted at most once. The engine
//! never fails: malformed input only shows up as fewer nodes and as entries in
//! [`LayoutDiagnostics`].
//!
//! A child shared by several parents is placed once, under the first parent
//! that reaches it; older renderers drew it under every parent and kept the
//! last placement.

use crate::skills::{parse_tree, SkillNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Spacing constants for the layout
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Radius of a rendered node
    pub node_radius: f64,
    /// Horizontal gap between neighbouring leaves
    pub sibling_gap: f64,
    /// Vertical distance between depth levels
    pub level_gap: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_radius: 35.0,
            sibling_gap: 70.0,
            level_gap: 140.0,
        }
    }
}

impl LayoutConfig {
    /// Horizontal distance between consecutive leaves
    pub fn leaf_spacing(&self) -> f64 {
        self.node_radius * 2.0 + self.sibling_gap
    }
}

/// Computed placement of a node
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A reachable node with its computed position.
///
/// `children` lists only the edges that were drawn: resolvable, and not
/// pointing back at a node that was already placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionedNode {
    pub id: String,
    pub name: String,
    pub unlocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub children: Vec<String>,
    pub position: Position,
}

/// An edge the engine refused to draw
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DroppedEdge {
    pub parent: String,
    pub child: String,
}

impl DroppedEdge {
    fn new(parent: &str, child: &str) -> Self {
        Self {
            parent: parent.to_string(),
            child: child.to_string(),
        }
    }
}

/// What the engine silently discarded
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LayoutDiagnostics {
    /// Nodes not reachable from the root
    pub unreachable: Vec<String>,
    /// Child references naming an id absent from the list
    pub dangling: Vec<DroppedEdge>,
    /// References to a node that was already placed (cycles, shared children)
    pub repeated: Vec<DroppedEdge>,
}

impl LayoutDiagnostics {
    pub fn dropped_count(&self) -> usize {
        self.unreachable.len() + self.dangling.len() + self.repeated.len()
    }

    pub fn is_clean(&self) -> bool {
        self.dropped_count() == 0
    }
}

/// Output of one layout run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Layout {
    /// Reachable nodes in pre-order from the root
    pub nodes: Vec<PositionedNode>,
    pub diagnostics: LayoutDiagnostics,
}

impl Layout {
    /// The root is always emitted first
    pub fn root(&self) -> Option<&PositionedNode> {
        self.nodes.first()
    }

    pub fn get(&self, id: &str) -> Option<&PositionedNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Stateless layout engine parameterised by spacing constants
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Lay out a tree as stored, reading it leniently first
    pub fn layout_tree(&self, tree: &Value, root_id: &str) -> Layout {
        self.layout(&parse_tree(tree), root_id)
    }

    /// Position every node reachable from `root_id`.
    ///
    /// Falls back to the first node when `root_id` is not in the list.
    pub fn layout(&self, nodes: &[SkillNode], root_id: &str) -> Layout {
        let Some(first) = nodes.first() else {
            return Layout::default();
        };
        let mut diagnostics = LayoutDiagnostics::default();

        // Duplicate ids collapse onto one slot: the last entry's fields win
        // and the children of every entry are appended in list order.
        let mut slot_of: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
        let mut owner: Vec<usize> = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            match slot_of.entry(node.id.as_str()) {
                Entry::Occupied(e) => owner[*e.get()] = i,
                Entry::Vacant(e) => {
                    e.insert(owner.len());
                    owner.push(i);
                }
            }
        }

        let mut links: Vec<Vec<usize>> = vec![Vec::new(); owner.len()];
        for node in nodes {
            let parent = slot_of[node.id.as_str()];
            for child in node.child_ids() {
                match slot_of.get(child) {
                    Some(&slot) => links[parent].push(slot),
                    None => diagnostics.dangling.push(DroppedEdge::new(&node.id, child)),
                }
            }
        }

        let root = slot_of
            .get(root_id)
            .or_else(|| slot_of.get(first.id.as_str()))
            .copied()
            .unwrap_or(0);
        let id_of = |slot: usize| nodes[owner[slot]].id.as_str();

        let mut seen = vec![false; owner.len()];
        let mut tree: Vec<Vec<usize>> = vec![Vec::new(); owner.len()];
        let mut positions = vec![Position::default(); owner.len()];
        let mut cursor = 0.0;

        // (slot, depth, next link to visit)
        let mut stack: Vec<(usize, usize, usize)> = vec![(root, 0, 0)];
        seen[root] = true;

        while let Some(&(slot, depth, next)) = stack.last() {
            if let Some(&child) = links[slot].get(next) {
                if let Some(frame) = stack.last_mut() {
                    frame.2 += 1;
                }
                if seen[child] {
                    diagnostics
                        .repeated
                        .push(DroppedEdge::new(id_of(slot), id_of(child)));
                    continue;
                }
                seen[child] = true;
                tree[slot].push(child);
                stack.push((child, depth + 1, 0));
                continue;
            }

            stack.pop();
            let x = match (tree[slot].first(), tree[slot].last()) {
                (Some(&first), Some(&last)) => (positions[first].x + positions[last].x) / 2.0,
                _ => {
                    let x = cursor;
                    cursor += self.config.leaf_spacing();
                    x
                }
            };
            positions[slot] = Position {
                x,
                y: depth as f64 * self.config.level_gap,
            };
        }

        let max_y = (0..owner.len())
            .filter(|&slot| seen[slot])
            .map(|slot| positions[slot].y)
            .fold(0.0, f64::max);
        for (slot, position) in positions.iter_mut().enumerate() {
            if seen[slot] {
                position.y = max_y - position.y;
            }
        }

        diagnostics.unreachable = (0..owner.len())
            .filter(|&slot| !seen[slot])
            .map(|slot| id_of(slot).to_string())
            .collect();

        let mut ordered = Vec::with_capacity(owner.len());
        let mut pending = vec![root];
        while let Some(slot) = pending.pop() {
            let node = &nodes[owner[slot]];
            ordered.push(PositionedNode {
                id: node.id.clone(),
                name: node.name.clone(),
                unlocked: node.unlocked,
                icon: node.icon.clone(),
                children: tree[slot].iter().map(|&c| id_of(c).to_string()).collect(),
                position: positions[slot],
            });
            pending.extend(tree[slot].iter().rev());
        }

        Layout {
            nodes: ordered,
            diagnostics,
        }
    }
}

/// Lay out a stored tree with the default spacing constants
pub fn layout(tree: &Value, root_id: &str) -> Vec<PositionedNode> {
    LayoutEngine::default().layout_tree(tree, root_id).nodes
}
