//! # Skill Tree Core
//!
//! Business logic behind the conversation skill tree: the data model, the
//! layout engine, progress persistence and the reconciliation service.
//!
//! ## Architecture
//!
//! - `skills/` - Skill nodes and the default tree definition store
//! - `layout/` - Pure tree layout (flat nodes → positioned nodes)
//! - `state/` - SQLite database and progress repositories
//! - `service/` - Persisted-or-default reconciliation
//! - `config` - Settings file
//!
//! ## Usage
//!
//! ```rust,ignore
//! use skilltree_core::layout::LayoutEngine;
//! use skilltree_core::service::ReconciliationService;
//!
//! let progress = service.get_progress(&user, Some("conv-1"))?;
//! let layout = LayoutEngine::default().layout_tree(&progress.record.skill_tree_data, "orientasi");
//! ```

pub mod config;
pub mod layout;
pub mod service;
pub mod skills;
pub mod state;
