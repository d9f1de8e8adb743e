//! # Skills
//!
//! The skill tree data model and the store holding the canonical default tree.
//!
//! - `SkillNode` - lenient reading of one entry of a flat tree, children referenced by id
//! - `DefinitionStore` - immutable default tree, loaded once and injected

pub mod definitions;
pub mod node;

pub use definitions::DefinitionStore;
pub use node::{parse_tree, strip_positions, ChildRef, EmbeddedChild, SkillNode};
