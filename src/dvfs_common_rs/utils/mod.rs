pub mod config_loader;
pub mod log_config;

pub use config_loader::{ConfigLoader, EditorConfig, ExportConfig, LogConfig, ProfilesConfig};
pub use log_config::init_logging;
