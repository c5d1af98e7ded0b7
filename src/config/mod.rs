pub mod loader;
pub mod types;

pub use loader::{load_config, missing_config_file};
pub use types::AppConfig;
