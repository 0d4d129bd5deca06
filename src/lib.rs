// machseq - configuration engine for packaged machine test sequences
//
// This is the library crate containing the session engine, archive services and
// data structures. The binary crate (main.rs) provides a command line host.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{EngineConfig, FeatureKey, FeatureState, FinalDescriptor, MachineIdentity};
pub use state::{ConfigurationSession, SessionChange, SessionError};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
