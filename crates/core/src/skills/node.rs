//! # Skill Nodes
//!
//! Stored trees are kept as the JSON the client submitted. `SkillNode` is the
//! lenient reading of one entry that the layout engine works on: anything it
//! cannot make sense of is skipped rather than rejected.

use serde::Serialize;
use serde_json::{Map, Value};

/// Key holding computed positions, never stored
const POSITION_KEY: &str = "position";

/// One entry in a flat skill tree
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkillNode {
    /// Identifier, unique within one tree
    pub id: String,
    /// Display label
    pub name: String,
    /// Whether the learner has unlocked this skill
    pub unlocked: bool,
    /// Ordered child references
    pub children: Vec<ChildRef>,
    /// Icon token, resolved by whoever renders the tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl SkillNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unlocked: false,
            children: Vec::new(),
            icon: None,
        }
    }

    /// Read one tree entry. Entries that are not objects with a string `id`
    /// are not nodes; every other field falls back to its default when it has
    /// the wrong type.
    pub fn from_value(value: &Value) -> Option<Self> {
        let entry = value.as_object()?;
        let id = entry.get("id")?.as_str()?;

        Some(Self {
            id: id.to_string(),
            name: entry
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            unlocked: entry
                .get("unlocked")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            children: entry
                .get("children")
                .and_then(Value::as_array)
                .map(|refs| refs.iter().map(ChildRef::from_value).collect())
                .unwrap_or_default(),
            icon: entry.get("icon").and_then(Value::as_str).map(str::to_string),
        })
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children
            .into_iter()
            .map(|id| ChildRef::Id(id.into()))
            .collect();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn unlocked(mut self) -> Self {
        self.unlocked = true;
        self
    }

    /// Child ids in declared order, skipping entries that carry no id
    pub fn child_ids(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(ChildRef::id)
    }
}

/// Read every usable node of a stored tree. Anything other than a list
/// yields no nodes.
pub fn parse_tree(tree: &Value) -> Vec<SkillNode> {
    tree.as_array()
        .map(|entries| entries.iter().filter_map(SkillNode::from_value).collect())
        .unwrap_or_default()
}

/// Drop computed `position` keys from the entries of a tree before storing it
pub fn strip_positions(tree: &mut Value) {
    if let Some(entries) = tree.as_array_mut() {
        for entry in entries.iter_mut().filter_map(Value::as_object_mut) {
            entry.remove(POSITION_KEY);
        }
    }
}

/// A reference from a parent to one of its children.
///
/// Clients send either bare ids or embedded child objects; only the id is
/// used for linking. Anything else is kept verbatim and ignored by layout.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ChildRef {
    Id(String),
    Embedded(EmbeddedChild),
    Other(Value),
}

/// Child embedded as an object instead of a bare id
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbeddedChild {
    pub id: String,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl ChildRef {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(id) => Self::Id(id.clone()),
            Value::Object(fields) => match fields.get("id") {
                Some(Value::String(id)) => {
                    let mut rest = fields.clone();
                    rest.remove("id");
                    Self::Embedded(EmbeddedChild {
                        id: id.clone(),
                        rest,
                    })
                }
                _ => Self::Other(value.clone()),
            },
            other => Self::Other(other.clone()),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            Self::Embedded(child) => Some(&child.id),
            Self::Other(_) => None,
        }
    }
}

impl From<&str> for ChildRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}
