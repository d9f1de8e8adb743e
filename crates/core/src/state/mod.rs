pub mod db;
pub mod in_memory;
pub mod progress;

pub use db::SkillTreeDb;
pub use in_memory::InMemoryProgressRepository;
pub use progress::{ProgressRecord, ProgressRepository, SqliteProgressRepository};
