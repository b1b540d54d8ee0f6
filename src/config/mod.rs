pub mod loader;
pub mod schema;

pub use loader::{load_config, resolve_database_path};
pub use schema::EngineConfig;
