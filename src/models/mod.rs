//! Data models for the machine sequence engine.
//!
//! - [`EngineConfig`]: folders, member names, prefixes and limits loaded from `machseq.yaml`
//! - [`MachineIdentity`]: model name and display label resolved from the configuration member
//! - [`FeatureState`]: the four feature flags and their transition table
//! - [`FinalDescriptor`]: the record written as `config.json` into the exported archive
//!
//! Everything here is plain data. Mutation happens through
//! [`ConfigurationSession`](crate::state::ConfigurationSession).

pub mod config;
pub mod descriptor;
pub mod features;
pub mod identity;

pub use config::{EngineConfig, IdentitySettings, LogSettings, MountLimits, XML_TAG_IST, XML_TAG_SOLL};
pub use descriptor::{FeatureEntry, FeatureValue, FinalDescriptor};
pub use features::{FeatureKey, FeatureKeyError, FeatureState, FeatureTransition};
pub use identity::MachineIdentity;
