//! Configuration for the oscar server
//!
//! - `schema` - Configuration data structures and validation
//! - `io` - Reading the config file and layering environment overrides
//! - `paths` - Default file locations

pub mod io;
pub mod paths;
pub mod schema;

pub use io::load_config;
pub use paths::get_log_dir;
pub use schema::{
    BuildConfig, CacheConfig, ClientConfig, LoggingConfig, MetadataConfig, OscarConfig,
    ServerConfig, StorageConfig,
};
